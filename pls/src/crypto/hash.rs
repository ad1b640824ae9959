// SHA-256 hashing for handshake transcripts.

use sha2::{Digest, Sha256};

/// Length of a validation hash in bytes.
pub const HASH_LEN: usize = 32;

/// SHA-256 hash of `data`, returning a 32-byte digest.
pub fn hash_sha256(data: &[u8]) -> [u8; HASH_LEN] {
    Sha256::digest(data).into()
}

/// SHA-256 over the concatenation of `parts`, without building the
/// concatenated buffer.
pub fn hash_sha256_parts<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> [u8; HASH_LEN] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}
