// Running record of the four handshake messages.
//
// Canonical order, identical on both ends:
//   m1 = client Hello, m2 = server Hello,
//   m3 = client KeyExchange, m4 = server KeyExchange.

use bytes::Bytes;

use crate::crypto::hash::{hash_sha256_parts, HASH_LEN};
use crate::error::{PlsError, Result};
use crate::handshake::Role;

/// The exact serialized bytes of each handshake message, by slot.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    messages: [Option<Bytes>; 4],
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the Hello sent by `sender`.
    pub fn record_hello(&mut self, sender: Role, raw: Bytes) {
        let slot = match sender {
            Role::Client => 0,
            Role::Server => 1,
        };
        self.messages[slot] = Some(raw);
    }

    /// Record the KeyExchange sent by `sender`.
    pub fn record_key_exchange(&mut self, sender: Role, raw: Bytes) {
        let slot = match sender {
            Role::Client => 2,
            Role::Server => 3,
        };
        self.messages[slot] = Some(raw);
    }

    /// Whether all four messages are present.
    pub fn is_complete(&self) -> bool {
        self.messages.iter().all(Option::is_some)
    }

    /// SHA-256 over m1..m4.
    pub fn validation_hash(&self) -> Result<[u8; HASH_LEN]> {
        if !self.is_complete() {
            return Err(PlsError::Crypto("transcript is incomplete".into()));
        }
        Ok(hash_sha256_parts(
            self.messages.iter().flatten().map(|m| &m[..]),
        ))
    }
}
