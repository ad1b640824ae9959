// PLS: certificate-authenticated secure channel over a stacked byte stream.
//
// Crate root: module declarations and public re-exports.

pub mod cert;
pub mod channel;
pub mod config;
pub mod connection;
pub mod crypto;
pub mod error;
pub mod handshake;
pub mod message;
pub mod transport;

use std::time::{SystemTime, UNIX_EPOCH};

// Re-export key types at crate root for convenience.
pub use cert::builder::CertificateBuilder;
pub use cert::Certificate;
pub use config::PlsConfig;
pub use connection::Connection;
pub use crypto::keys::IdentityKeyPair;
pub use crypto::x25519::X25519KeyPair;
pub use error::{PlsError, Result};
pub use handshake::{HandshakeState, Role};
pub use message::{Deserializer, Message, MessageType};
pub use transport::{Application, Transport};

/// Current wall-clock time in unix seconds. A clock before the epoch reads as 0.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
