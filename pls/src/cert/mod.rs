// Certificates: a signed binding of a subject name to its signing and
// encryption keys, issued by the next certificate up the chain.

pub mod builder;
pub mod serializer;
pub mod validator;

use bytes::Bytes;

/// A PLS certificate.
///
/// `subject_public_key` verifies certificates this subject issues.
/// `encryption_key` is the X25519 key peers seal pre-keys to; it is required
/// on leaf certificates and usually absent on authorities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// Subject common name.
    pub subject: String,
    /// Subject's Ed25519 public key (32 bytes).
    pub subject_public_key: [u8; 32],
    /// Subject's X25519 encryption key, if any.
    pub encryption_key: Option<[u8; 32]>,
    /// Issuer common name (equal to `subject` when self-signed).
    pub issuer: String,
    /// Issuer's Ed25519 public key (32 bytes).
    pub issuer_public_key: [u8; 32],
    /// Start of validity, unix seconds.
    pub valid_from: u64,
    /// End of validity, unix seconds.
    pub valid_until: u64,
    /// Ed25519 signature by the issuer over [`Certificate::signable_bytes`].
    pub signature: [u8; 64],
}

impl Certificate {
    /// The canonical certificate format version.
    pub const VERSION: u8 = 1;

    /// Produce the byte content that is signed (everything except the signature field).
    /// This MUST match the order used by the serializer for the signed portion.
    pub fn signable_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);
        serializer::write_signable(self, &mut buf);
        buf
    }

    /// Whether the certificate names itself as issuer.
    pub fn is_self_signed(&self) -> bool {
        self.issuer == self.subject && self.issuer_public_key == self.subject_public_key
    }

    /// Encode into the opaque blob carried in a Hello message.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(serializer::serialize(self))
    }
}
