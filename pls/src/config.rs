// Static trust material for PLS connections.

use bytes::Bytes;

use crate::cert::validator::CHAIN_LEN;
use crate::cert::Certificate;
use crate::crypto::x25519::X25519KeyPair;
use crate::error::{PlsError, Result};

/// Key material and trust anchors shared by every connection of one host.
///
/// Built once and handed to connections behind an `Arc`; connections only
/// ever read it.
#[derive(Debug)]
pub struct PlsConfig {
    private_key: X25519KeyPair,
    chain: Vec<Certificate>,
    encoded_chain: Vec<Bytes>,
    trusted_root: Certificate,
    validation_time: Option<u64>,
}

impl PlsConfig {
    /// Create a config from the host's X25519 private key, its own chain
    /// `[leaf, intermediate, root]` and the root it trusts for peers.
    ///
    /// The leaf must publish the public half of `private_key`, otherwise
    /// peers would seal pre-keys this host cannot open.
    pub fn new(
        private_key: X25519KeyPair,
        chain: Vec<Certificate>,
        trusted_root: Certificate,
    ) -> Result<Self> {
        if chain.len() != CHAIN_LEN {
            return Err(PlsError::InvalidConfig(format!(
                "certificate chain must hold {CHAIN_LEN} certificates, got {}",
                chain.len()
            )));
        }
        match chain[0].encryption_key {
            Some(key) if key == private_key.public_key_bytes() => {}
            Some(_) => {
                return Err(PlsError::InvalidConfig(
                    "leaf encryption key does not match the private key".into(),
                ))
            }
            None => {
                return Err(PlsError::InvalidConfig(
                    "leaf certificate has no encryption key".into(),
                ))
            }
        }

        let encoded_chain = chain.iter().map(Certificate::to_bytes).collect();
        Ok(Self {
            private_key,
            chain,
            encoded_chain,
            trusted_root,
            validation_time: None,
        })
    }

    /// Validate peer certificates at a fixed unix time instead of the clock.
    pub fn with_validation_time(mut self, unix_secs: u64) -> Self {
        self.validation_time = Some(unix_secs);
        self
    }

    pub fn private_key(&self) -> &X25519KeyPair {
        &self.private_key
    }

    pub fn chain(&self) -> &[Certificate] {
        &self.chain
    }

    /// The chain as carried in a Hello message.
    pub fn encoded_chain(&self) -> &[Bytes] {
        &self.encoded_chain
    }

    pub fn trusted_root(&self) -> &Certificate {
        &self.trusted_root
    }

    /// Time used for certificate validity checks.
    pub fn now(&self) -> u64 {
        self.validation_time.unwrap_or_else(crate::unix_now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::builder::CertificateBuilder;
    use crate::crypto::keys::IdentityKeyPair;

    fn chain_for(enc: Option<[u8; 32]>) -> (Vec<Certificate>, Certificate) {
        let root_kp = IdentityKeyPair::generate();
        let ca_kp = IdentityKeyPair::generate();
        let leaf_kp = IdentityKeyPair::generate();
        let root = CertificateBuilder::new("root", &root_kp)
            .validity(0, 100)
            .build()
            .unwrap();
        let ca = CertificateBuilder::new("ca", &ca_kp)
            .validity(0, 100)
            .issued_by("root", &root_kp)
            .build()
            .unwrap();
        let mut leaf = CertificateBuilder::new("host", &leaf_kp)
            .validity(0, 100)
            .issued_by("ca", &ca_kp);
        if let Some(key) = enc {
            leaf = leaf.encryption_key(key);
        }
        let leaf = leaf.build().unwrap();
        (vec![leaf, ca, root.clone()], root)
    }

    #[test]
    fn accepts_matching_leaf() {
        let key = X25519KeyPair::generate();
        let (chain, root) = chain_for(Some(key.public_key_bytes()));
        let config = PlsConfig::new(key, chain, root)
            .unwrap()
            .with_validation_time(50);
        assert_eq!(config.now(), 50);
        assert_eq!(config.encoded_chain().len(), 3);
        assert_eq!(config.encoded_chain()[0], config.chain()[0].to_bytes());
    }

    #[test]
    fn rejects_mismatched_leaf_key() {
        let key = X25519KeyPair::generate();
        let (chain, root) = chain_for(Some([3u8; 32]));
        assert!(matches!(
            PlsConfig::new(key, chain, root),
            Err(PlsError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_leaf_without_key() {
        let key = X25519KeyPair::generate();
        let (chain, root) = chain_for(None);
        assert!(PlsConfig::new(key, chain, root).is_err());
    }

    #[test]
    fn rejects_short_chain() {
        let key = X25519KeyPair::generate();
        let (mut chain, root) = chain_for(Some(key.public_key_bytes()));
        chain.pop();
        assert!(PlsConfig::new(key, chain, root).is_err());
    }
}
