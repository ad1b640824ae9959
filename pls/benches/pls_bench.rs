// PLS benchmarks using criterion.
//
// Measures:
//   - Ed25519 sign / verify
//   - Data channel seal / open at various payload sizes
//   - Session key derivation
//   - Certificate chain validation
//   - Full handshake latency

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use pls::cert::validator::validate_chain;
use pls::channel::SecureChannel;
use pls::crypto::kdf::derive_session_keys;
use pls::{
    Application, Certificate, CertificateBuilder, Connection, IdentityKeyPair, PlsConfig,
    PlsError, Role, Transport, X25519KeyPair,
};

const NOW: u64 = 1_700_000_000;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Pki {
    root: Certificate,
    ca_kp: IdentityKeyPair,
    ca: Certificate,
}

impl Pki {
    fn new() -> Self {
        let root_kp = IdentityKeyPair::generate();
        let ca_kp = IdentityKeyPair::generate();
        let root = CertificateBuilder::new("bench root", &root_kp)
            .validity(NOW - 60, NOW + 60)
            .build()
            .unwrap();
        let ca = CertificateBuilder::new("bench ca", &ca_kp)
            .validity(NOW - 60, NOW + 60)
            .issued_by("bench root", &root_kp)
            .build()
            .unwrap();
        Self { root, ca_kp, ca }
    }

    fn config(&self, host: &str) -> Arc<PlsConfig> {
        let enc = X25519KeyPair::generate();
        let leaf_kp = IdentityKeyPair::generate();
        let leaf = CertificateBuilder::new(host, &leaf_kp)
            .encryption_key(enc.public_key_bytes())
            .validity(NOW - 60, NOW + 60)
            .issued_by("bench ca", &self.ca_kp)
            .build()
            .unwrap();
        let chain = vec![leaf, self.ca.clone(), self.root.clone()];
        Arc::new(
            PlsConfig::new(enc, chain, self.root.clone())
                .unwrap()
                .with_validation_time(NOW),
        )
    }
}

#[derive(Default)]
struct Queue(Vec<u8>);

impl Transport for Queue {
    fn write(&mut self, data: Bytes) {
        self.0.extend_from_slice(&data);
    }

    fn close(&mut self) {}
}

struct Discard;

impl Application for Discard {
    fn on_secure_channel_ready(&mut self) {}
    fn on_plaintext_received(&mut self, _data: Bytes) {}
    fn on_connection_lost(&mut self, _error: Option<&PlsError>) {}
}

// ---------------------------------------------------------------------------
// Ed25519 sign / verify
// ---------------------------------------------------------------------------

fn bench_sign_verify(c: &mut Criterion) {
    let kp = IdentityKeyPair::generate();
    let message = b"PLS benchmark message for Ed25519 certificate signatures";

    c.bench_function("ed25519_sign", |b| {
        b.iter(|| {
            black_box(kp.sign(black_box(message)));
        });
    });

    let sig = kp.sign(message);
    c.bench_function("ed25519_verify", |b| {
        b.iter(|| {
            black_box(kp.verify(black_box(message), black_box(&sig)).unwrap());
        });
    });
}

// ---------------------------------------------------------------------------
// Data channel seal / open
// ---------------------------------------------------------------------------

fn bench_channel(c: &mut Criterion) {
    let keys = derive_session_keys(&[1u8; 32], &[2u8; 32], 42, 99).unwrap();
    let sizes: &[usize] = &[64, 1024, 64 * 1024, 1024 * 1024];

    let mut group = c.benchmark_group("channel_seal");
    for &size in sizes {
        let plaintext = vec![0xABu8; size];
        let mut sender = SecureChannel::new(Role::Client, &keys).unwrap();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{size}B")),
            &plaintext,
            |b, pt| {
                b.iter(|| {
                    black_box(sender.seal(black_box(pt)).unwrap());
                });
            },
        );
    }
    group.finish();

    let mut group = c.benchmark_group("channel_seal_open");
    for &size in sizes {
        let plaintext = vec![0xABu8; size];
        let mut sender = SecureChannel::new(Role::Client, &keys).unwrap();
        let mut receiver = SecureChannel::new(Role::Server, &keys).unwrap();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{size}B")),
            &plaintext,
            |b, pt| {
                b.iter(|| {
                    let sealed = sender.seal(pt).unwrap();
                    black_box(receiver.open(black_box(&sealed)).unwrap());
                });
            },
        );
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Key derivation and chain validation
// ---------------------------------------------------------------------------

fn bench_kdf(c: &mut Criterion) {
    c.bench_function("derive_session_keys", |b| {
        b.iter(|| {
            black_box(derive_session_keys(black_box(&[1u8; 32]), &[2u8; 32], 42, 99).unwrap());
        });
    });
}

fn bench_validate_chain(c: &mut Criterion) {
    let pki = Pki::new();
    let config = pki.config("bench host");
    let chain = config.encoded_chain().to_vec();

    c.bench_function("validate_chain", |b| {
        b.iter(|| {
            black_box(validate_chain(black_box(&chain), &pki.root, NOW).unwrap());
        });
    });
}

// ---------------------------------------------------------------------------
// Full handshake latency
// ---------------------------------------------------------------------------

fn bench_full_handshake(c: &mut Criterion) {
    let pki = Pki::new();
    let client_config = pki.config("client");
    let server_config = pki.config("server");

    c.bench_function("full_handshake", |b| {
        b.iter(|| {
            let mut client =
                Connection::new(client_config.clone(), Role::Client, Queue::default(), Discard);
            let mut server =
                Connection::new(server_config.clone(), Role::Server, Queue::default(), Discard);
            client.start().unwrap();
            while !(client.is_established() && server.is_established()) {
                let out = std::mem::take(&mut client.transport_mut().0);
                server.on_bytes(&out).unwrap();
                let back = std::mem::take(&mut server.transport_mut().0);
                client.on_bytes(&back).unwrap();
            }
            black_box(client.session_keys().is_some());
        });
    });
}

// ---------------------------------------------------------------------------
// Criterion harness
// ---------------------------------------------------------------------------

criterion_group! {
    name = pls_benches;
    config = Criterion::default()
        .sample_size(50)
        .measurement_time(Duration::from_secs(5));
    targets =
        bench_sign_verify,
        bench_channel,
        bench_kdf,
        bench_validate_chain,
        bench_full_handshake
}

criterion_main!(pls_benches);
