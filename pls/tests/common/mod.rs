// Shared fixtures for the PLS integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;
use pls::{
    Application, Certificate, CertificateBuilder, Connection, IdentityKeyPair, PlsConfig,
    PlsError, Role, Transport, X25519KeyPair,
};

/// Validation time used by every fixture certificate.
pub const NOW: u64 = 1_700_000_000;

/// A root authority that can issue host chains.
pub struct Authority {
    pub name: String,
    pub root_kp: IdentityKeyPair,
    pub root: Certificate,
    pub ca_kp: IdentityKeyPair,
    pub ca: Certificate,
}

impl Authority {
    pub fn new(name: &str) -> Self {
        let root_kp = IdentityKeyPair::generate();
        let ca_kp = IdentityKeyPair::generate();
        let root = CertificateBuilder::new(name, &root_kp)
            .validity(NOW - 3600, NOW + 3600)
            .build()
            .unwrap();
        let ca_name = format!("{name} intermediate");
        let ca = CertificateBuilder::new(ca_name, &ca_kp)
            .validity(NOW - 3600, NOW + 3600)
            .issued_by(name, &root_kp)
            .build()
            .unwrap();
        Self {
            name: name.to_string(),
            root_kp,
            root,
            ca_kp,
            ca,
        }
    }

    /// Issue a leaf for `host` and return its full chain with the key it seals to.
    pub fn issue(&self, host: &str) -> (X25519KeyPair, Vec<Certificate>) {
        let enc = X25519KeyPair::generate();
        let leaf_kp = IdentityKeyPair::generate();
        let leaf = CertificateBuilder::new(host, &leaf_kp)
            .encryption_key(enc.public_key_bytes())
            .validity(NOW - 3600, NOW + 3600)
            .issued_by(self.ca.subject.clone(), &self.ca_kp)
            .build()
            .unwrap();
        (enc, vec![leaf, self.ca.clone(), self.root.clone()])
    }

    /// Config for `host`, trusting `trusted`'s root.
    pub fn config(&self, host: &str, trusted: &Authority) -> Arc<PlsConfig> {
        let (key, chain) = self.issue(host);
        Arc::new(
            PlsConfig::new(key, chain, trusted.root.clone())
                .unwrap()
                .with_validation_time(NOW),
        )
    }
}

/// Transport that queues writes for the test to deliver by hand.
#[derive(Debug, Default)]
pub struct Wire {
    pub outbox: Vec<Bytes>,
    pub closed: bool,
}

impl Wire {
    pub fn drain(&mut self) -> Vec<u8> {
        self.outbox.drain(..).flat_map(|b| b.to_vec()).collect()
    }
}

impl Transport for Wire {
    fn write(&mut self, data: Bytes) {
        self.outbox.push(data);
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Application that records every callback.
#[derive(Debug, Default)]
pub struct Recorder {
    pub ready: usize,
    pub received: Vec<Bytes>,
    pub lost: Vec<Option<String>>,
}

impl Application for Recorder {
    fn on_secure_channel_ready(&mut self) {
        self.ready += 1;
    }

    fn on_plaintext_received(&mut self, data: Bytes) {
        self.received.push(data);
    }

    fn on_connection_lost(&mut self, error: Option<&PlsError>) {
        self.lost.push(error.map(|e| e.to_string()));
    }
}

pub type TestConnection = Connection<Wire, Recorder>;

pub fn client(config: Arc<PlsConfig>) -> TestConnection {
    Connection::new(config, Role::Client, Wire::default(), Recorder::default())
}

pub fn server(config: Arc<PlsConfig>) -> TestConnection {
    Connection::new(config, Role::Server, Wire::default(), Recorder::default())
}

/// Move queued bytes from `from` to `to`. Returns the receiver's result.
pub fn deliver(from: &mut TestConnection, to: &mut TestConnection) -> pls::Result<usize> {
    let bytes = from.transport_mut().drain();
    let len = bytes.len();
    to.on_bytes(&bytes)?;
    Ok(len)
}

/// Shuttle bytes both ways until neither side has anything left to say.
pub fn pump(client: &mut TestConnection, server: &mut TestConnection) -> pls::Result<()> {
    loop {
        let a = deliver(client, server)?;
        let b = deliver(server, client)?;
        if a == 0 && b == 0 {
            return Ok(());
        }
    }
}

/// A client/server pair under one shared authority, already established.
pub fn established_pair() -> (TestConnection, TestConnection) {
    let ca = Authority::new("pls test root");
    let mut c = client(ca.config("client.test", &ca));
    let mut s = server(ca.config("server.test", &ca));
    c.start().unwrap();
    pump(&mut c, &mut s).unwrap();
    assert!(c.is_established() && s.is_established());
    (c, s)
}
