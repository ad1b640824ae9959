//! PLS connection: handshake state machine plus the secure data channel.
//!
//! ```text
//!   Client                                   Server
//!     |--- Hello(nonce_c, chain) ----------->|            m1
//!     |<-- Hello(nonce_s, chain) ------------|            m2
//!     |<-- KeyExchange(seal(pk_s), nc+1) ----|            m4
//!     |--- KeyExchange(seal(pk_c), ns+1) --->|            m3
//!     |--- HandshakeDone(H(m1..m4)) -------->|
//!     |<-- HandshakeDone(H(m1..m4)) ---------|
//!     |==== Data(ct || hmac) ================|
//! ```
//!
//! A connection is driven from outside: bytes from the lower layer go into
//! [`Connection::on_bytes`], application writes go into [`Connection::send`].
//! Everything it emits goes through its [`Transport`], everything it delivers
//! goes to its [`Application`].

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::cert::validator::validate_chain;
use crate::channel::SecureChannel;
use crate::config::PlsConfig;
use crate::crypto::hash::HASH_LEN;
use crate::crypto::kdf::{derive_session_keys, SessionKeys};
use crate::crypto::x25519::seal;
use crate::error::{PlsError, Result};
use crate::handshake::{HandshakeState, Role, Transcript};
use crate::message::{Deserializer, Message, MAX_DATA_LEN};
use crate::transport::{Application, Transport};

/// Length of the random pre-key each side contributes.
pub const PRE_KEY_LEN: usize = 32;

/// Largest plaintext carried by one Data message; longer writes are split.
pub const MAX_PLAINTEXT_LEN: usize = MAX_DATA_LEN - crate::channel::TAG_LEN;

/// One end of a PLS session over transport `T`, delivering to `A`.
pub struct Connection<T: Transport, A: Application> {
    config: Arc<PlsConfig>,
    role: Role,
    state: HandshakeState,
    transport: T,
    app: A,
    deserializer: Deserializer,
    transcript: Transcript,
    local_nonce: u64,
    peer_nonce: Option<u64>,
    local_pre_key: Option<Zeroizing<[u8; PRE_KEY_LEN]>>,
    sealed_pre_key: Option<Bytes>,
    peer_pre_key: Option<Zeroizing<[u8; PRE_KEY_LEN]>>,
    validation_hash: Option<[u8; HASH_LEN]>,
    session_keys: Option<SessionKeys>,
    channel: Option<SecureChannel>,
}

impl<T: Transport, A: Application> Connection<T, A> {
    /// Create a connection in state `Init` with a fresh random nonce.
    pub fn new(config: Arc<PlsConfig>, role: Role, transport: T, app: A) -> Self {
        Self {
            config,
            role,
            state: HandshakeState::Init,
            transport,
            app,
            deserializer: Deserializer::new(),
            transcript: Transcript::new(),
            local_nonce: OsRng.next_u64(),
            peer_nonce: None,
            local_pre_key: None,
            sealed_pre_key: None,
            peer_pre_key: None,
            validation_hash: None,
            session_keys: None,
            channel: None,
        }
    }

    /// Replace the random handshake nonce. Only meaningful before `start`
    /// (client) or before the first Hello arrives (server).
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.local_nonce = nonce;
        self
    }

    /// Client only: send the opening Hello.
    pub fn start(&mut self) -> Result<()> {
        if self.role != Role::Client || self.state != HandshakeState::Init {
            return Err(PlsError::ProtocolStateViolation {
                state: self.state.label(),
                message: "start",
            });
        }
        let raw = self.hello().encode();
        self.transcript.record_hello(Role::Client, raw.clone());
        self.transport.write(raw);
        self.transition(HandshakeState::Hello);
        Ok(())
    }

    /// Feed bytes received from the lower layer.
    ///
    /// Any failure closes the connection (Close is sent, the transport is
    /// closed and the application is notified) and is returned here too.
    /// Input arriving after close is ignored.
    pub fn on_bytes(&mut self, data: &[u8]) -> Result<()> {
        if self.state == HandshakeState::Closed {
            debug!(role = %self.role, len = data.len(), "ignoring bytes on closed connection");
            return Ok(());
        }
        self.deserializer.update(data);

        while self.state != HandshakeState::Closed {
            let (message, raw) = match self.deserializer.next_message() {
                Ok(Some(next)) => next,
                Ok(None) => break,
                Err(e) => return Err(self.abort(e)),
            };
            if let Err(e) = self.dispatch(message, raw) {
                return Err(self.abort(e));
            }
        }
        Ok(())
    }

    /// Encrypt and send application data. Writes larger than
    /// [`MAX_PLAINTEXT_LEN`] are split across several Data messages.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        match self.state {
            HandshakeState::Established => {}
            HandshakeState::Closed => return Err(PlsError::ConnectionClosed),
            state => {
                return Err(PlsError::ProtocolStateViolation {
                    state: state.label(),
                    message: "Data",
                })
            }
        }
        let channel = self.channel.as_mut().ok_or(PlsError::ConnectionClosed)?;

        let mut out = BytesMut::new();
        for chunk in data.chunks(MAX_PLAINTEXT_LEN) {
            let payload = channel.seal(chunk)?;
            Message::Data { payload }.encode_into(&mut out);
        }
        if !out.is_empty() {
            self.transport.write(out.freeze());
        }
        Ok(())
    }

    /// Send Close and shut the transport. A no-op once closed.
    pub fn close(&mut self) {
        if self.state == HandshakeState::Closed {
            return;
        }
        info!(role = %self.role, state = %self.state, "closing pls connection");
        self.transport.write(Message::Close.encode());
        self.shutdown(None);
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Derived session keys; present from `Done` until close.
    pub fn session_keys(&self) -> Option<&SessionKeys> {
        self.session_keys.as_ref()
    }

    pub fn is_established(&self) -> bool {
        self.state == HandshakeState::Established
    }

    pub fn config(&self) -> &Arc<PlsConfig> {
        &self.config
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

    // ── Dispatch ────────────────────────────────────────────────────────

    fn dispatch(&mut self, message: Message, raw: Bytes) -> Result<()> {
        if matches!(message, Message::Close) {
            info!(role = %self.role, state = %self.state, "peer closed pls connection");
            self.shutdown(None);
            return Ok(());
        }
        match self.role {
            Role::Client => self.client_dispatch(message, raw),
            Role::Server => self.server_dispatch(message, raw),
        }
    }

    fn client_dispatch(&mut self, message: Message, raw: Bytes) -> Result<()> {
        match (self.state, message) {
            (HandshakeState::Hello, Message::Hello { nonce, certs }) => {
                self.transcript.record_hello(Role::Server, raw);
                self.accept_peer_hello(nonce, &certs)?;
                let raw = self.key_exchange()?.encode();
                self.transcript.record_key_exchange(Role::Client, raw.clone());
                self.transport.write(raw);
                self.transition(HandshakeState::KeyExchange);
                Ok(())
            }
            (HandshakeState::KeyExchange, Message::KeyExchange { pre_key, nonce_plus_one }) => {
                self.transcript.record_key_exchange(Role::Server, raw);
                self.accept_peer_key_exchange(&pre_key, nonce_plus_one)?;
                self.finish_key_exchange()
            }
            (HandshakeState::Done, Message::HandshakeDone { validation_hash }) => {
                self.accept_handshake_done(&validation_hash)
            }
            (HandshakeState::Established, Message::Data { payload }) => self.receive_data(&payload),
            (state, message) => Err(PlsError::ProtocolStateViolation {
                state: state.label(),
                message: message.message_type().name(),
            }),
        }
    }

    fn server_dispatch(&mut self, message: Message, raw: Bytes) -> Result<()> {
        match (self.state, message) {
            (HandshakeState::Init, Message::Hello { nonce, certs }) => {
                self.transcript.record_hello(Role::Client, raw);
                self.accept_peer_hello(nonce, &certs)?;

                let hello = self.hello().encode();
                let key_exchange = self.key_exchange()?.encode();
                self.transcript.record_hello(Role::Server, hello.clone());
                self.transcript
                    .record_key_exchange(Role::Server, key_exchange.clone());

                let mut out = BytesMut::with_capacity(hello.len() + key_exchange.len());
                out.extend_from_slice(&hello);
                out.extend_from_slice(&key_exchange);
                self.transport.write(out.freeze());
                self.transition(HandshakeState::KeyExchange);
                Ok(())
            }
            (HandshakeState::KeyExchange, Message::KeyExchange { pre_key, nonce_plus_one }) => {
                self.transcript.record_key_exchange(Role::Client, raw);
                self.accept_peer_key_exchange(&pre_key, nonce_plus_one)?;
                self.finish_key_exchange()
            }
            (HandshakeState::Done, Message::HandshakeDone { validation_hash }) => {
                self.accept_handshake_done(&validation_hash)
            }
            (HandshakeState::Established, Message::Data { payload }) => self.receive_data(&payload),
            (state, message) => {
                warn!(
                    role = %self.role,
                    %state,
                    message = message.message_type().name(),
                    "dropping out-of-state message"
                );
                Ok(())
            }
        }
    }

    // ── Handshake steps ─────────────────────────────────────────────────

    fn hello(&self) -> Message {
        Message::Hello {
            nonce: self.local_nonce,
            certs: self.config.encoded_chain().to_vec(),
        }
    }

    /// Validate the peer's chain, remember its nonce, and seal a fresh
    /// pre-key to its leaf encryption key.
    fn accept_peer_hello(&mut self, nonce: u64, certs: &[Bytes]) -> Result<()> {
        let leaf_key = validate_chain(certs, self.config.trusted_root(), self.config.now())?;
        debug!(role = %self.role, peer_nonce = nonce, "peer certificate chain accepted");
        self.peer_nonce = Some(nonce);

        let mut pre_key = Zeroizing::new([0u8; PRE_KEY_LEN]);
        OsRng.fill_bytes(pre_key.as_mut_slice());
        let sealed = seal(&leaf_key, pre_key.as_slice())
            .map_err(|e| PlsError::KeyExchangeFailure(format!("sealing pre-key: {e}")))?;
        self.local_pre_key = Some(pre_key);
        self.sealed_pre_key = Some(Bytes::from(sealed));
        Ok(())
    }

    fn key_exchange(&mut self) -> Result<Message> {
        let peer_nonce = self.peer_nonce.ok_or_else(|| {
            PlsError::KeyExchangeFailure("peer nonce not yet known".into())
        })?;
        let pre_key = self.sealed_pre_key.take().ok_or_else(|| {
            PlsError::KeyExchangeFailure("pre-key not yet sealed".into())
        })?;
        Ok(Message::KeyExchange {
            pre_key,
            nonce_plus_one: peer_nonce.wrapping_add(1),
        })
    }

    fn accept_peer_key_exchange(&mut self, sealed: &[u8], nonce_plus_one: u64) -> Result<()> {
        let expected = self.local_nonce.wrapping_add(1);
        if nonce_plus_one != expected {
            return Err(PlsError::KeyExchangeFailure(format!(
                "nonce check failed: expected {expected}, got {nonce_plus_one}"
            )));
        }

        let opened = Zeroizing::new(self.config.private_key().open(sealed)?);
        if opened.len() != PRE_KEY_LEN {
            return Err(PlsError::KeyExchangeFailure(format!(
                "pre-key must be {PRE_KEY_LEN} bytes, got {}",
                opened.len()
            )));
        }
        let mut pre_key = Zeroizing::new([0u8; PRE_KEY_LEN]);
        pre_key.copy_from_slice(&opened);
        self.peer_pre_key = Some(pre_key);
        Ok(())
    }

    /// All four messages are known: send HandshakeDone and derive keys.
    fn finish_key_exchange(&mut self) -> Result<()> {
        let hash = self.transcript.validation_hash()?;
        self.transport
            .write(Message::HandshakeDone { validation_hash: hash }.encode());
        self.validation_hash = Some(hash);

        let (Some(local), Some(peer), Some(peer_nonce)) =
            (&self.local_pre_key, &self.peer_pre_key, self.peer_nonce)
        else {
            return Err(PlsError::KeyExchangeFailure("missing pre-key material".into()));
        };
        let keys = match self.role {
            Role::Client => {
                derive_session_keys(local.as_slice(), peer.as_slice(), self.local_nonce, peer_nonce)?
            }
            Role::Server => {
                derive_session_keys(peer.as_slice(), local.as_slice(), peer_nonce, self.local_nonce)?
            }
        };
        self.session_keys = Some(keys);
        self.local_pre_key = None;
        self.peer_pre_key = None;
        self.transition(HandshakeState::Done);
        Ok(())
    }

    fn accept_handshake_done(&mut self, peer_hash: &[u8; HASH_LEN]) -> Result<()> {
        if self.validation_hash.as_ref() != Some(peer_hash) {
            return Err(PlsError::TranscriptMismatch);
        }
        let keys = self
            .session_keys
            .as_ref()
            .ok_or_else(|| PlsError::KeyExchangeFailure("session keys not derived".into()))?;
        self.channel = Some(SecureChannel::new(self.role, keys)?);
        self.transition(HandshakeState::Established);
        info!(role = %self.role, "pls secure channel established");
        self.app.on_secure_channel_ready();
        Ok(())
    }

    fn receive_data(&mut self, payload: &[u8]) -> Result<()> {
        let channel = self.channel.as_mut().ok_or(PlsError::ConnectionClosed)?;
        let plaintext = channel.open(payload)?;
        self.app.on_plaintext_received(plaintext);
        Ok(())
    }

    // ── Teardown ────────────────────────────────────────────────────────

    fn transition(&mut self, next: HandshakeState) {
        debug!(role = %self.role, from = %self.state, to = %next, "pls state transition");
        self.state = next;
    }

    /// Terminal failure: tell the peer, close, notify, hand the error back.
    fn abort(&mut self, error: PlsError) -> PlsError {
        warn!(role = %self.role, state = %self.state, %error, "aborting pls connection");
        self.transport.write(Message::Close.encode());
        self.shutdown(Some(&error));
        error
    }

    fn shutdown(&mut self, error: Option<&PlsError>) {
        self.transition(HandshakeState::Closed);
        self.local_pre_key = None;
        self.peer_pre_key = None;
        self.sealed_pre_key = None;
        self.session_keys = None;
        self.channel = None;
        self.transport.close();
        self.app.on_connection_lost(error);
    }
}
