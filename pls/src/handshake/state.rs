// Handshake state machine states and connection roles.

use std::fmt;

/// Which end of the connection this instance is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Sends the first Hello.
    Client,
    /// Answers a Hello with its own Hello and KeyExchange.
    Server,
}

impl Role {
    /// The opposite role.
    pub fn peer(self) -> Role {
        match self {
            Role::Client => Role::Server,
            Role::Server => Role::Client,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Server => write!(f, "server"),
        }
    }
}

/// The current state of a PLS connection.
///
/// States only ever move forward; `Closed` is terminal and reachable from
/// every other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HandshakeState {
    /// Nothing sent or received yet.
    Init,
    /// Client has sent its Hello and waits for the server's.
    Hello,
    /// Waiting for the peer's KeyExchange.
    KeyExchange,
    /// Own HandshakeDone sent and session keys derived; waiting for the
    /// peer's HandshakeDone.
    Done,
    /// Secure channel is up.
    Established,
    /// Terminal.
    Closed,
}

impl HandshakeState {
    /// Human-readable label for the current state (used in error messages).
    pub fn label(&self) -> &'static str {
        match self {
            HandshakeState::Init => "Init",
            HandshakeState::Hello => "Hello",
            HandshakeState::KeyExchange => "KeyExchange",
            HandshakeState::Done => "Done",
            HandshakeState::Established => "Established",
            HandshakeState::Closed => "Closed",
        }
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
