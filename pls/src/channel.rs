//! Post-handshake data protection: AES-256-CTR then HMAC-SHA256.
//!
//! Each direction keeps one continuous CTR keystream for the life of the
//! connection. The tag covers a per-direction message counter followed by
//! the ciphertext, so a replayed or reordered message fails verification:
//!
//! ```text
//! payload = ciphertext || HMAC-SHA256(mac_key, be64(counter) || ciphertext)
//! ```

use aes::Aes256;
use bytes::{Bytes, BytesMut};
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::crypto::kdf::{SessionKeys, MAC_KEY_LEN};
use crate::error::{PlsError, Result};
use crate::handshake::Role;

type Aes256Ctr = ctr::Ctr128BE<Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Length of the HMAC-SHA256 tag appended to every Data payload.
pub const TAG_LEN: usize = 32;

/// Encryptor/decryptor pair owned by an established connection.
pub struct SecureChannel {
    encryptor: Aes256Ctr,
    decryptor: Aes256Ctr,
    local_mac_key: Zeroizing<[u8; MAC_KEY_LEN]>,
    peer_mac_key: Zeroizing<[u8; MAC_KEY_LEN]>,
    sent: u64,
    received: u64,
}

impl SecureChannel {
    /// Build the channel for `role` from the derived session keys.
    pub fn new(role: Role, keys: &SessionKeys) -> Result<Self> {
        let local = keys.local(role);
        let peer = keys.peer(role);
        let encryptor = Aes256Ctr::new_from_slices(local.enc_key, local.iv)
            .map_err(|e| PlsError::Crypto(format!("aes-ctr init: {e}")))?;
        let decryptor = Aes256Ctr::new_from_slices(peer.enc_key, peer.iv)
            .map_err(|e| PlsError::Crypto(format!("aes-ctr init: {e}")))?;
        Ok(Self {
            encryptor,
            decryptor,
            local_mac_key: Zeroizing::new(*local.mac_key),
            peer_mac_key: Zeroizing::new(*peer.mac_key),
            sent: 0,
            received: 0,
        })
    }

    /// Encrypt and tag one outgoing message.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(plaintext.len() + TAG_LEN);
        buf.extend_from_slice(plaintext);
        self.encryptor
            .try_apply_keystream(&mut buf[..])
            .map_err(|_| PlsError::Crypto("send keystream exhausted".into()))?;

        let tag = compute_tag(&self.local_mac_key, self.sent, &buf)?;
        buf.extend_from_slice(&tag);
        self.sent += 1;
        Ok(buf.freeze())
    }

    /// Verify and decrypt one incoming message.
    ///
    /// The tag is checked before any keystream is consumed; a mismatch is
    /// [`PlsError::IntegrityFailure`] and leaves no plaintext behind.
    pub fn open(&mut self, payload: &[u8]) -> Result<Bytes> {
        if payload.len() < TAG_LEN {
            return Err(PlsError::IntegrityFailure);
        }
        let (ciphertext, tag) = payload.split_at(payload.len() - TAG_LEN);

        let mut mac = HmacSha256::new_from_slice(self.peer_mac_key.as_slice())
            .map_err(|e| PlsError::Crypto(format!("hmac init: {e}")))?;
        mac.update(&self.received.to_be_bytes());
        mac.update(ciphertext);
        mac.verify_slice(tag)
            .map_err(|_| PlsError::IntegrityFailure)?;

        let mut plaintext = ciphertext.to_vec();
        self.decryptor
            .try_apply_keystream(&mut plaintext)
            .map_err(|_| PlsError::Crypto("receive keystream exhausted".into()))?;
        self.received += 1;
        Ok(Bytes::from(plaintext))
    }

    /// Messages sealed so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Messages opened so far.
    pub fn received(&self) -> u64 {
        self.received
    }
}

fn compute_tag(key: &[u8; MAC_KEY_LEN], counter: u64, ciphertext: &[u8]) -> Result<[u8; TAG_LEN]> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| PlsError::Crypto(format!("hmac init: {e}")))?;
    mac.update(&counter.to_be_bytes());
    mac.update(ciphertext);
    Ok(mac.finalize().into_bytes().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::kdf::derive_session_keys;

    fn pair() -> (SecureChannel, SecureChannel) {
        let keys = derive_session_keys(b"client pre key", b"server pre key", 42, 99).unwrap();
        (
            SecureChannel::new(Role::Client, &keys).unwrap(),
            SecureChannel::new(Role::Server, &keys).unwrap(),
        )
    }

    #[test]
    fn client_to_server_and_back() {
        let (mut client, mut server) = pair();
        let sealed = client.seal(b"GET / HTTP/1.0").unwrap();
        assert_eq!(sealed.len(), 14 + TAG_LEN);
        assert_ne!(&sealed[..14], b"GET / HTTP/1.0");
        assert_eq!(&server.open(&sealed).unwrap()[..], b"GET / HTTP/1.0");

        let reply = server.seal(b"200 OK").unwrap();
        assert_eq!(&client.open(&reply).unwrap()[..], b"200 OK");
    }

    #[test]
    fn keystream_continues_across_messages() {
        let (mut client, mut server) = pair();
        let a = client.seal(b"same").unwrap();
        let b = client.seal(b"same").unwrap();
        assert_ne!(a, b);
        assert_eq!(&server.open(&a).unwrap()[..], b"same");
        assert_eq!(&server.open(&b).unwrap()[..], b"same");
        assert_eq!(client.sent(), 2);
        assert_eq!(server.received(), 2);
    }

    #[test]
    fn flipped_bit_is_integrity_failure() {
        let (mut client, mut server) = pair();
        let mut sealed = client.seal(b"attack at dawn").unwrap().to_vec();
        sealed[3] ^= 0x01;
        assert!(matches!(server.open(&sealed), Err(PlsError::IntegrityFailure)));
    }

    #[test]
    fn replay_is_integrity_failure() {
        let (mut client, mut server) = pair();
        let sealed = client.seal(b"once").unwrap();
        server.open(&sealed).unwrap();
        assert!(matches!(server.open(&sealed), Err(PlsError::IntegrityFailure)));
    }

    #[test]
    fn own_direction_does_not_verify() {
        let (mut client, _) = pair();
        let (_, mut other_client) = {
            let keys = derive_session_keys(b"client pre key", b"server pre key", 42, 99).unwrap();
            (
                SecureChannel::new(Role::Server, &keys).unwrap(),
                SecureChannel::new(Role::Client, &keys).unwrap(),
            )
        };
        let sealed = client.seal(b"loopback").unwrap();
        assert!(other_client.open(&sealed).is_err());
    }

    #[test]
    fn key_schedules_wiped_on_drop() {
        fn wiped_on_drop<T: zeroize::ZeroizeOnDrop>() {}
        wiped_on_drop::<Aes256Ctr>();
    }

    #[test]
    fn short_payload_rejected() {
        let (_, mut server) = pair();
        assert!(matches!(server.open(&[0u8; 5]), Err(PlsError::IntegrityFailure)));
    }
}
