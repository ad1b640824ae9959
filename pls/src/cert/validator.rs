// Certificate chain validation against a locally trusted root.

use bytes::Bytes;

use crate::cert::serializer::deserialize;
use crate::cert::Certificate;
use crate::crypto::keys::verify_signature;
use crate::error::{PlsError, Result};

/// Number of certificates a peer presents: leaf, intermediate, root.
pub const CHAIN_LEN: usize = 3;

fn untrusted(reason: impl Into<String>) -> PlsError {
    PlsError::UntrustedCertificateChain(reason.into())
}

/// Check one certificate's signature under `issuer_key` and its validity
/// window at `now`.
pub fn validate(cert: &Certificate, issuer_key: &[u8; 32], now: u64) -> Result<()> {
    verify_signature(issuer_key, &cert.signable_bytes(), &cert.signature)
        .map_err(|_| untrusted(format!("bad signature on '{}'", cert.subject)))?;

    if now < cert.valid_from {
        return Err(untrusted(format!(
            "'{}' not yet valid: not_before={}, now={now}",
            cert.subject, cert.valid_from
        )));
    }
    if now > cert.valid_until {
        return Err(untrusted(format!(
            "'{}' expired: not_after={}, now={now}",
            cert.subject, cert.valid_until
        )));
    }
    Ok(())
}

/// Validate a peer's encoded chain `[leaf, intermediate, root]` and return
/// the leaf's encryption key.
///
/// Each certificate's issuer must be the subject of the next one and carry
/// its signature; the root must be self-signed and identical to
/// `trusted_root`.
pub fn validate_chain(certs: &[Bytes], trusted_root: &Certificate, now: u64) -> Result<[u8; 32]> {
    if certs.len() != CHAIN_LEN {
        return Err(untrusted(format!(
            "expected {CHAIN_LEN} certificates, got {}",
            certs.len()
        )));
    }

    let chain = certs
        .iter()
        .map(|blob| deserialize(blob))
        .collect::<Result<Vec<_>>>()
        .map_err(|e| untrusted(e.to_string()))?;

    for (i, cert) in chain.iter().enumerate() {
        if let Some(parent) = chain.get(i + 1) {
            if cert.issuer != parent.subject || cert.issuer_public_key != parent.subject_public_key {
                return Err(untrusted(format!(
                    "certificate at index {i} issuer does not match parent at index {}",
                    i + 1
                )));
            }
            validate(cert, &parent.subject_public_key, now)?;
        } else {
            if !cert.is_self_signed() {
                return Err(untrusted("root certificate is not self-signed"));
            }
            validate(cert, &cert.subject_public_key, now)?;
            if cert != trusted_root {
                return Err(untrusted(format!(
                    "root '{}' does not match the trusted root",
                    cert.subject
                )));
            }
        }
    }

    chain[0]
        .encryption_key
        .ok_or_else(|| untrusted("leaf certificate has no encryption key"))
}
