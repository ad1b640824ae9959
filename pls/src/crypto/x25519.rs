// X25519 encryption keys and the sealed box used to carry pre-keys.
//
// A sealed message is:
//
//   ephemeral_pub (32B) || AES-256-GCM(key, nonce=0, plaintext, aad=ephemeral_pub)
//
// where key = HKDF-SHA256(salt = ephemeral_pub || recipient_pub,
//                         ikm  = X25519(ephemeral, recipient),
//                         info = "pls pre-key seal").
// Every seal uses a fresh ephemeral key, so the fixed nonce is never reused
// under the same key.

use std::fmt;

use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::crypto::aead::{Aes256GcmCipher, TAG_LEN};
use crate::error::{PlsError, Result};

/// Bytes a sealed box adds on top of its plaintext.
pub const SEAL_OVERHEAD: usize = 32 + TAG_LEN;

const SEAL_NONCE: [u8; 12] = [0u8; 12];
const SEAL_INFO: &[u8] = b"pls pre-key seal";

/// An X25519 keypair. The public half is published as a certificate's
/// encryption key; the private half opens pre-keys sealed to it.
pub struct X25519KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl X25519KeyPair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// The 32-byte public key.
    pub fn public_key_bytes(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }

    /// Perform Diffie-Hellman with a peer's public key, returning the 32-byte
    /// shared secret. Low-order peer keys are rejected.
    pub fn diffie_hellman(&self, peer_public: &[u8; 32]) -> Result<Zeroizing<[u8; 32]>> {
        let shared = self.secret.diffie_hellman(&PublicKey::from(*peer_public));
        if !shared.was_contributory() {
            return Err(PlsError::Crypto("non-contributory X25519 public key".into()));
        }
        Ok(Zeroizing::new(*shared.as_bytes()))
    }

    /// Open a box produced by [`seal`] for this keypair.
    ///
    /// Any failure (short input, bad point, authentication failure) is a
    /// [`PlsError::KeyExchangeFailure`].
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < SEAL_OVERHEAD {
            return Err(PlsError::KeyExchangeFailure(format!(
                "sealed pre-key too short: {} bytes",
                sealed.len()
            )));
        }
        let mut ephemeral_pub = [0u8; 32];
        ephemeral_pub.copy_from_slice(&sealed[..32]);

        let shared = self
            .diffie_hellman(&ephemeral_pub)
            .map_err(|e| PlsError::KeyExchangeFailure(e.to_string()))?;
        let key = seal_key(&shared, &ephemeral_pub, &self.public_key_bytes())?;
        Aes256GcmCipher::new(*key)
            .decrypt(&SEAL_NONCE, &sealed[32..], &ephemeral_pub)
            .map_err(|_| PlsError::KeyExchangeFailure("pre-key authentication failed".into()))
    }
}

impl fmt::Debug for X25519KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X25519KeyPair")
            .field("public", self.public.as_bytes())
            .finish_non_exhaustive()
    }
}

/// Encrypt `plaintext` so that only the holder of `recipient_public`'s
/// private key can read it.
pub fn seal(recipient_public: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
    let ephemeral = X25519KeyPair::generate();
    let ephemeral_pub = ephemeral.public_key_bytes();
    let shared = ephemeral.diffie_hellman(recipient_public)?;
    let key = seal_key(&shared, &ephemeral_pub, recipient_public)?;

    let ciphertext = Aes256GcmCipher::new(*key).encrypt(&SEAL_NONCE, plaintext, &ephemeral_pub)?;
    let mut out = Vec::with_capacity(32 + ciphertext.len());
    out.extend_from_slice(&ephemeral_pub);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn seal_key(
    shared: &[u8; 32],
    ephemeral_pub: &[u8; 32],
    recipient_pub: &[u8; 32],
) -> Result<Zeroizing<[u8; 32]>> {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(ephemeral_pub);
    salt[32..].copy_from_slice(recipient_pub);

    let hk = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut key = Zeroizing::new([0u8; 32]);
    hk.expand(SEAL_INFO, key.as_mut_slice())
        .map_err(|e| PlsError::Crypto(format!("HKDF expand error: {e}")))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dh_shared_secret_matches() {
        let alice = X25519KeyPair::generate();
        let bob = X25519KeyPair::generate();
        let a = alice.diffie_hellman(&bob.public_key_bytes()).unwrap();
        let b = bob.diffie_hellman(&alice.public_key_bytes()).unwrap();
        assert_eq!(*a, *b);
    }

    #[test]
    fn low_order_point_rejected() {
        let kp = X25519KeyPair::generate();
        assert!(kp.diffie_hellman(&[0u8; 32]).is_err());
    }

    #[test]
    fn seal_open_roundtrip() {
        let recipient = X25519KeyPair::generate();
        let sealed = seal(&recipient.public_key_bytes(), b"client pre key").unwrap();
        assert_eq!(sealed.len(), 14 + SEAL_OVERHEAD);
        assert_eq!(recipient.open(&sealed).unwrap(), b"client pre key");
    }

    #[test]
    fn open_with_wrong_key_fails() {
        let recipient = X25519KeyPair::generate();
        let other = X25519KeyPair::generate();
        let sealed = seal(&recipient.public_key_bytes(), b"secret").unwrap();
        let err = other.open(&sealed).unwrap_err();
        assert!(matches!(err, PlsError::KeyExchangeFailure(_)));
    }

    #[test]
    fn open_truncated_fails() {
        let recipient = X25519KeyPair::generate();
        let err = recipient.open(&[7u8; 40]).unwrap_err();
        assert!(matches!(err, PlsError::KeyExchangeFailure(_)));
    }

    #[test]
    fn seals_are_randomized() {
        let recipient = X25519KeyPair::generate();
        let a = seal(&recipient.public_key_bytes(), b"same").unwrap();
        let b = seal(&recipient.public_key_bytes(), b"same").unwrap();
        assert_ne!(a, b);
    }
}
