//! PEEP connection state machine.
//!
//! ```text
//!   Client                        Server
//!     |--- SYN(seq=x) ------------->|
//!     |<-- SYN-ACK(seq=y, ack=x+1) -|
//!     |--- ACK(seq=x+1, ack=y+1) -->|
//!     |==== DATA ===================|
//!     |--- RIP(seq) --------------->|
//!     |<-- RIP-ACK(ack=seq+1) ------|
//! ```
//!
//! Init -> Handshake -> Transmit -> Teardown -> Closed.

use std::fmt;

use bytes::Bytes;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::{PeepError, Result};
use crate::packet::{Deserializer, Packet, PacketType, MAX_PAYLOAD_LEN};
use crate::transport::{Application, Transport};

/// Which end of the connection this instance is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Sends SYN.
    Client,
    /// Answers SYN with SYN-ACK.
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Server => write!(f, "server"),
        }
    }
}

/// Connection state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing sent or received.
    Init,
    /// SYN or SYN-ACK sent, waiting for the peer's answer.
    Handshake,
    /// Established; DATA flows both ways.
    Transmit,
    /// RIP sent, waiting for RIP-ACK.
    Teardown,
    /// Terminal.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Init => write!(f, "Init"),
            ConnectionState::Handshake => write!(f, "Handshake"),
            ConnectionState::Transmit => write!(f, "Transmit"),
            ConnectionState::Teardown => write!(f, "Teardown"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}

/// Configuration for a connection.
#[derive(Debug, Clone)]
pub struct PeepConfig {
    /// Fixed initial sequence number; random when `None`.
    pub initial_seq: Option<u32>,
    /// Largest DATA payload this side sends; longer writes are split.
    pub max_payload: usize,
}

impl Default for PeepConfig {
    fn default() -> Self {
        Self {
            initial_seq: None,
            max_payload: 16 * 1024,
        }
    }
}

/// A PEEP connection over transport `T`, delivering to `A`.
pub struct PeepConnection<T: Transport, A: Application> {
    config: PeepConfig,
    role: Role,
    state: ConnectionState,
    transport: T,
    app: A,
    deserializer: Deserializer,
    /// Sequence number of the next packet this side sends.
    seq: u32,
    /// Last sequence number seen from the peer.
    peer_seq: u32,
}

impl<T: Transport, A: Application> PeepConnection<T, A> {
    pub fn new(config: PeepConfig, role: Role, transport: T, app: A) -> Self {
        let seq = config
            .initial_seq
            .unwrap_or_else(|| rand::thread_rng().gen_range(0..=u16::MAX as u32));
        Self {
            config,
            role,
            state: ConnectionState::Init,
            transport,
            app,
            deserializer: Deserializer::new(),
            seq,
            peer_seq: 0,
        }
    }

    /// Client only: send SYN.
    pub fn start(&mut self) -> Result<()> {
        if self.role != Role::Client || self.state != ConnectionState::Init {
            return Err(PeepError::InvalidStateTransition {
                from: self.state.to_string(),
                to: ConnectionState::Handshake.to_string(),
            });
        }
        self.emit(Packet::control(PacketType::Syn, self.seq, 0));
        self.transition(ConnectionState::Handshake);
        Ok(())
    }

    /// Feed bytes received from the lower layer.
    ///
    /// A stream that cannot be parsed, or a handshake packet that fails its
    /// checks, closes the connection and returns the error.
    pub fn on_bytes(&mut self, data: &[u8]) -> Result<()> {
        if self.state == ConnectionState::Closed {
            debug!(role = %self.role, len = data.len(), "ignoring bytes on closed connection");
            return Ok(());
        }
        self.deserializer.update(data);

        while self.state != ConnectionState::Closed {
            let packet = match self.deserializer.next_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => break,
                Err(e) => return Err(self.fail(e)),
            };
            if let Err(e) = self.handle_packet(packet) {
                return Err(self.fail(e));
            }
        }
        Ok(())
    }

    /// Send application data as one or more DATA packets.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        match self.state {
            ConnectionState::Transmit => {}
            ConnectionState::Teardown | ConnectionState::Closed => {
                return Err(PeepError::ConnectionClosed)
            }
            _ => return Err(PeepError::NotEstablished),
        }
        let chunk_len = self.config.max_payload.clamp(1, MAX_PAYLOAD_LEN);
        for chunk in data.chunks(chunk_len) {
            let packet = Packet::new(
                PacketType::Data,
                self.seq,
                self.peer_seq,
                Bytes::copy_from_slice(chunk),
            );
            self.seq = self.seq.wrapping_add(1);
            self.emit(packet);
        }
        Ok(())
    }

    /// Begin an orderly shutdown.
    ///
    /// From Transmit this sends RIP and waits for RIP-ACK; before the
    /// handshake finishes it simply closes. A no-op once tearing down.
    pub fn close(&mut self) {
        match self.state {
            ConnectionState::Transmit => {
                self.emit(Packet::control(PacketType::Rip, self.seq, self.peer_seq));
                self.transition(ConnectionState::Teardown);
            }
            ConnectionState::Init | ConnectionState::Handshake => self.shutdown(None),
            ConnectionState::Teardown | ConnectionState::Closed => {}
        }
    }

    /// Close on an error raised outside the packet path, such as a failed
    /// read or write on the underlying stream. Hands the error back.
    pub fn abort(&mut self, error: PeepError) -> PeepError {
        if self.state == ConnectionState::Closed {
            return error;
        }
        self.fail(error)
    }

    /// The lower layer went away without a teardown.
    pub fn on_transport_closed(&mut self) {
        if self.state != ConnectionState::Closed {
            info!(role = %self.role, state = %self.state, "peep transport closed under us");
            self.shutdown(None);
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Sequence number the next outgoing packet will carry.
    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn app(&self) -> &A {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut A {
        &mut self.app
    }

    pub fn into_parts(self) -> (T, A) {
        (self.transport, self.app)
    }

    // ── Packet handling ─────────────────────────────────────────────────

    fn handle_packet(&mut self, packet: Packet) -> Result<()> {
        use ConnectionState::*;
        use PacketType::*;

        match (self.role, self.state, packet.packet_type) {
            (Role::Server, Init, Syn) => {
                packet.check()?;
                self.peer_seq = packet.seq;
                self.emit(Packet::control(SynAck, self.seq, packet.seq.wrapping_add(1)));
                self.transition(Handshake);
            }
            (Role::Client, Handshake, SynAck) => {
                packet.check()?;
                expect_ack(&packet, self.seq.wrapping_add(1))?;
                self.seq = packet.ack;
                self.peer_seq = packet.seq.wrapping_add(1);
                self.emit(Packet::control(Ack, self.seq, self.peer_seq));
                self.established();
            }
            (Role::Server, Handshake, Ack) => {
                packet.check()?;
                expect_ack(&packet, self.seq.wrapping_add(1))?;
                self.seq = packet.ack;
                self.peer_seq = packet.seq;
                self.established();
            }
            (_, Transmit | Teardown, Data) => {
                if let Err(e) = packet.check() {
                    warn!(role = %self.role, seq = packet.seq, error = %e, "dropping corrupt DATA");
                    return Ok(());
                }
                self.peer_seq = packet.seq;
                self.app.on_data_received(packet.data);
            }
            (_, Transmit | Teardown, Rip) => {
                if let Err(e) = packet.check() {
                    warn!(role = %self.role, error = %e, "dropping corrupt RIP");
                    return Ok(());
                }
                self.emit(Packet::control(RipAck, self.seq, packet.seq.wrapping_add(1)));
                info!(role = %self.role, "peer requested teardown");
                self.shutdown(None);
            }
            (_, Teardown, RipAck) => {
                if let Err(e) = packet.check() {
                    warn!(role = %self.role, error = %e, "corrupt RIP-ACK, closing anyway");
                }
                info!(role = %self.role, "teardown acknowledged");
                self.shutdown(None);
            }
            (role, state, packet_type) => {
                debug!(%role, %state, %packet_type, "dropping out-of-state packet");
            }
        }
        Ok(())
    }

    fn established(&mut self) {
        self.transition(ConnectionState::Transmit);
        info!(role = %self.role, seq = self.seq, "peep connection established");
        self.app.on_connection_made();
    }

    fn emit(&mut self, packet: Packet) {
        debug!(
            role = %self.role,
            packet = %packet.packet_type,
            seq = packet.seq,
            ack = packet.ack,
            len = packet.data.len(),
            "peep send"
        );
        self.transport.write(packet.encode());
    }

    fn transition(&mut self, next: ConnectionState) {
        debug!(role = %self.role, from = %self.state, to = %next, "peep state transition");
        self.state = next;
    }

    fn fail(&mut self, error: PeepError) -> PeepError {
        warn!(role = %self.role, state = %self.state, %error, "closing peep connection");
        self.shutdown(Some(&error));
        error
    }

    fn shutdown(&mut self, error: Option<&PeepError>) {
        self.transition(ConnectionState::Closed);
        self.transport.close();
        self.app.on_connection_lost(error);
    }
}

fn expect_ack(packet: &Packet, expected: u32) -> Result<()> {
    if packet.ack == expected {
        Ok(())
    } else {
        Err(PeepError::BadAcknowledgement {
            packet: packet.packet_type.name(),
            expected,
            actual: packet.ack,
        })
    }
}
