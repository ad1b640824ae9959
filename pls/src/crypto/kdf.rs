// Session key derivation from the two pre-keys and the two handshake nonces.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{PlsError, Result};
use crate::handshake::Role;

/// AES-256 key length.
pub const KEY_LEN: usize = 32;
/// AES-CTR initial counter block length.
pub const IV_LEN: usize = 16;
/// HMAC-SHA256 key length.
pub const MAC_KEY_LEN: usize = 32;

/// The six session values derived once per connection.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    pub client_write_key: [u8; KEY_LEN],
    pub server_write_key: [u8; KEY_LEN],
    pub client_write_iv: [u8; IV_LEN],
    pub server_write_iv: [u8; IV_LEN],
    pub client_mac_key: [u8; MAC_KEY_LEN],
    pub server_mac_key: [u8; MAC_KEY_LEN],
}

/// Key material protecting one direction of the data channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectionKeys<'a> {
    pub enc_key: &'a [u8; KEY_LEN],
    pub iv: &'a [u8; IV_LEN],
    pub mac_key: &'a [u8; MAC_KEY_LEN],
}

impl SessionKeys {
    /// Keys `role` uses for what it sends.
    pub fn local(&self, role: Role) -> DirectionKeys<'_> {
        match role {
            Role::Client => self.client_direction(),
            Role::Server => self.server_direction(),
        }
    }

    /// Keys `role` uses to verify and decrypt what it receives.
    pub fn peer(&self, role: Role) -> DirectionKeys<'_> {
        self.local(role.peer())
    }

    fn client_direction(&self) -> DirectionKeys<'_> {
        DirectionKeys {
            enc_key: &self.client_write_key,
            iv: &self.client_write_iv,
            mac_key: &self.client_mac_key,
        }
    }

    fn server_direction(&self) -> DirectionKeys<'_> {
        DirectionKeys {
            enc_key: &self.server_write_key,
            iv: &self.server_write_iv,
            mac_key: &self.server_mac_key,
        }
    }
}

/// Derive the session keys.
///
/// ```text
/// ikm              = u16(len pkc) || pkc || u16(len pks) || pks
/// salt             = be64(client_nonce) || be64(server_nonce)
/// master_secret    = HKDF-Expand(HKDF-Extract(salt, ikm), "pls master secret", 32)
/// client_write_key = HKDF-Expand(master_secret, "pls client write key", 32)
/// server_write_key = HKDF-Expand(master_secret, "pls server write key", 32)
/// client_write_iv  = HKDF-Expand(master_secret, "pls client write iv",  16)
/// server_write_iv  = HKDF-Expand(master_secret, "pls server write iv",  16)
/// client_mac_key   = HKDF-Expand(master_secret, "pls client mac key",   32)
/// server_mac_key   = HKDF-Expand(master_secret, "pls server mac key",   32)
/// ```
pub fn derive_session_keys(
    pre_key_client: &[u8],
    pre_key_server: &[u8],
    client_nonce: u64,
    server_nonce: u64,
) -> Result<SessionKeys> {
    let ikm = Zeroizing::new(input_key_material(pre_key_client, pre_key_server)?);

    let mut salt = [0u8; 16];
    salt[..8].copy_from_slice(&client_nonce.to_be_bytes());
    salt[8..].copy_from_slice(&server_nonce.to_be_bytes());

    let hk = Hkdf::<Sha256>::new(Some(&salt), &ikm);
    let mut master_secret = Zeroizing::new([0u8; 32]);
    expand(&hk, b"pls master secret", master_secret.as_mut_slice())?;

    // Second stage keyed by the master secret (extract with no salt).
    let hk2 = Hkdf::<Sha256>::new(None, master_secret.as_slice());

    let mut keys = SessionKeys {
        client_write_key: [0u8; KEY_LEN],
        server_write_key: [0u8; KEY_LEN],
        client_write_iv: [0u8; IV_LEN],
        server_write_iv: [0u8; IV_LEN],
        client_mac_key: [0u8; MAC_KEY_LEN],
        server_mac_key: [0u8; MAC_KEY_LEN],
    };
    expand(&hk2, b"pls client write key", &mut keys.client_write_key)?;
    expand(&hk2, b"pls server write key", &mut keys.server_write_key)?;
    expand(&hk2, b"pls client write iv", &mut keys.client_write_iv)?;
    expand(&hk2, b"pls server write iv", &mut keys.server_write_iv)?;
    expand(&hk2, b"pls client mac key", &mut keys.client_mac_key)?;
    expand(&hk2, b"pls server mac key", &mut keys.server_mac_key)?;
    Ok(keys)
}

fn input_key_material(pre_key_client: &[u8], pre_key_server: &[u8]) -> Result<Vec<u8>> {
    let mut ikm = Vec::with_capacity(4 + pre_key_client.len() + pre_key_server.len());
    for pre_key in [pre_key_client, pre_key_server] {
        let len = u16::try_from(pre_key.len())
            .map_err(|_| PlsError::Crypto(format!("pre-key too long: {} bytes", pre_key.len())))?;
        ikm.extend_from_slice(&len.to_be_bytes());
        ikm.extend_from_slice(pre_key);
    }
    Ok(ikm)
}

fn expand(hk: &Hkdf<Sha256>, label: &[u8], out: &mut [u8]) -> Result<()> {
    hk.expand(label, out)
        .map_err(|e| PlsError::Crypto(format!("HKDF expand error: {e}")))
}
