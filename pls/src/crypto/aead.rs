// AES-256-GCM authenticated encryption, the symmetric half of the pre-key sealed box.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{PlsError, Result};

/// Length of the GCM authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// AES-256-GCM authenticated encryption with associated data.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Aes256GcmCipher {
    key: [u8; 32],
}

impl Aes256GcmCipher {
    /// Create a new AES-256-GCM cipher from a 32-byte key.
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Encrypt `plaintext` with the given 12-byte `nonce` and associated data `aad`.
    ///
    /// Returns ciphertext || 16-byte GCM tag.
    pub fn encrypt(&self, nonce: &[u8; 12], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| PlsError::Crypto(format!("aes-gcm init: {e}")))?;
        let payload = Payload { msg: plaintext, aad };
        cipher
            .encrypt(Nonce::from_slice(nonce), payload)
            .map_err(|e| PlsError::Crypto(format!("aes-gcm encrypt: {e}")))
    }

    /// Decrypt `ciphertext` (which includes the appended 16-byte tag) with the given
    /// 12-byte `nonce` and the same `aad` used during encryption.
    pub fn decrypt(&self, nonce: &[u8; 12], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| PlsError::Crypto(format!("aes-gcm init: {e}")))?;
        let payload = Payload {
            msg: ciphertext,
            aad,
        };
        cipher
            .decrypt(Nonce::from_slice(nonce), payload)
            .map_err(|e| PlsError::Crypto(format!("aes-gcm decrypt: {e}")))
    }
}
