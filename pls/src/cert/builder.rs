// Fluent builder that fills in and signs a certificate.

use std::time::Duration;

use crate::cert::serializer::MAX_NAME_LEN;
use crate::cert::Certificate;
use crate::crypto::keys::IdentityKeyPair;
use crate::error::{PlsError, Result};

/// Builder for constructing a [`Certificate`] with a fluent API.
///
/// Without [`issued_by`](Self::issued_by) the certificate is self-signed by
/// the subject key.
///
/// # Example
/// ```ignore
/// let root = CertificateBuilder::new("root", &root_kp)
///     .valid_for(Duration::from_secs(86400 * 365))
///     .build()?;
/// let leaf = CertificateBuilder::new("server", &server_kp)
///     .encryption_key(server_enc.public_key_bytes())
///     .valid_for(Duration::from_secs(86400 * 30))
///     .issued_by("root", &root_kp)
///     .build()?;
/// ```
pub struct CertificateBuilder<'a> {
    subject: String,
    subject_key: &'a IdentityKeyPair,
    encryption_key: Option<[u8; 32]>,
    issuer: Option<(String, &'a IdentityKeyPair)>,
    valid_from: Option<u64>,
    valid_until: Option<u64>,
}

impl<'a> CertificateBuilder<'a> {
    /// Start building a certificate for `subject`, identified by `subject_key`.
    pub fn new(subject: impl Into<String>, subject_key: &'a IdentityKeyPair) -> Self {
        Self {
            subject: subject.into(),
            subject_key,
            encryption_key: None,
            issuer: None,
            valid_from: None,
            valid_until: None,
        }
    }

    /// Publish an X25519 encryption key (required for leaf certificates).
    pub fn encryption_key(mut self, key: [u8; 32]) -> Self {
        self.encryption_key = Some(key);
        self
    }

    /// Have the certificate signed by `issuer` instead of self-signed.
    pub fn issued_by(mut self, issuer: impl Into<String>, issuer_key: &'a IdentityKeyPair) -> Self {
        self.issuer = Some((issuer.into(), issuer_key));
        self
    }

    /// Set explicit validity window (unix timestamps in seconds).
    pub fn validity(mut self, from: u64, until: u64) -> Self {
        self.valid_from = Some(from);
        self.valid_until = Some(until);
        self
    }

    /// Set validity as a duration from `now` (unix epoch seconds).
    pub fn valid_for_from(mut self, now: u64, duration: Duration) -> Self {
        self.valid_from = Some(now);
        self.valid_until = Some(now.saturating_add(duration.as_secs()));
        self
    }

    /// Set validity as a duration from the current wall-clock time.
    pub fn valid_for(self, duration: Duration) -> Self {
        let now = crate::unix_now();
        self.valid_for_from(now, duration)
    }

    /// Consume the builder and produce a signed [`Certificate`].
    pub fn build(self) -> Result<Certificate> {
        let valid_from = self
            .valid_from
            .ok_or_else(|| PlsError::CertificateBuild("validity window is required".into()))?;
        let valid_until = self
            .valid_until
            .ok_or_else(|| PlsError::CertificateBuild("validity window is required".into()))?;

        if valid_until <= valid_from {
            return Err(PlsError::CertificateBuild(
                "valid_until must be after valid_from".into(),
            ));
        }

        let (issuer, issuer_key) = match self.issuer {
            Some((name, key)) => (name, key),
            None => (self.subject.clone(), self.subject_key),
        };

        for name in [&self.subject, &issuer] {
            if name.is_empty() || name.len() > MAX_NAME_LEN {
                return Err(PlsError::CertificateBuild(format!(
                    "name must be 1..={MAX_NAME_LEN} bytes, got {}",
                    name.len()
                )));
            }
        }

        // Build an unsigned certificate so we can compute signable_bytes.
        let mut cert = Certificate {
            subject: self.subject,
            subject_public_key: self.subject_key.public_key_bytes(),
            encryption_key: self.encryption_key,
            issuer,
            issuer_public_key: issuer_key.public_key_bytes(),
            valid_from,
            valid_until,
            signature: [0u8; 64],
        };

        // Sign the canonical signable bytes.
        let signable = cert.signable_bytes();
        cert.signature = issuer_key.sign(&signable);

        Ok(cert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::verify_signature;

    #[test]
    fn build_self_signed() {
        let kp = IdentityKeyPair::generate();
        let cert = CertificateBuilder::new("root", &kp)
            .validity(1000, 2000)
            .build()
            .unwrap();
        assert!(cert.is_self_signed());
        assert_eq!(cert.valid_from, 1000);
        assert_eq!(cert.valid_until, 2000);
        assert!(cert.encryption_key.is_none());
        verify_signature(&kp.public_key_bytes(), &cert.signable_bytes(), &cert.signature).unwrap();
    }

    #[test]
    fn build_issued() {
        let ca = IdentityKeyPair::generate();
        let leaf = IdentityKeyPair::generate();
        let cert = CertificateBuilder::new("client", &leaf)
            .encryption_key([1u8; 32])
            .validity(1000, 2000)
            .issued_by("ca", &ca)
            .build()
            .unwrap();
        assert!(!cert.is_self_signed());
        assert_eq!(cert.issuer, "ca");
        assert_eq!(cert.issuer_public_key, ca.public_key_bytes());
        assert_eq!(cert.subject_public_key, leaf.public_key_bytes());
        verify_signature(&ca.public_key_bytes(), &cert.signable_bytes(), &cert.signature).unwrap();
    }

    #[test]
    fn missing_validity_fails() {
        let kp = IdentityKeyPair::generate();
        assert!(CertificateBuilder::new("x", &kp).build().is_err());
    }

    #[test]
    fn invalid_validity_window_fails() {
        let kp = IdentityKeyPair::generate();
        let result = CertificateBuilder::new("x", &kp)
            .validity(2000, 1000) // until < from
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn empty_name_fails() {
        let kp = IdentityKeyPair::generate();
        assert!(CertificateBuilder::new("", &kp).validity(1, 2).build().is_err());
    }
}
