// PLS error types

use thiserror::Error;

/// Top-level error type for the PLS crate.
///
/// Every handshake and data-channel failure is terminal for the connection
/// that produced it.
#[derive(Debug, Error)]
pub enum PlsError {
    // ── Wire errors ─────────────────────────────────────────────────────
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    // ── Certificate errors ──────────────────────────────────────────────
    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),

    #[error("certificate build error: {0}")]
    CertificateBuild(String),

    #[error("untrusted certificate chain: {0}")]
    UntrustedCertificateChain(String),

    // ── Handshake errors ────────────────────────────────────────────────
    #[error("key exchange failed: {0}")]
    KeyExchangeFailure(String),

    #[error("handshake transcript hash mismatch")]
    TranscriptMismatch,

    #[error("unexpected {message} in state {state}")]
    ProtocolStateViolation {
        state: &'static str,
        message: &'static str,
    },

    // ── Data channel errors ─────────────────────────────────────────────
    #[error("data message failed integrity check")]
    IntegrityFailure,

    #[error("connection is closed")]
    ConnectionClosed,

    // ── Generic ─────────────────────────────────────────────────────────
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("crypto error: {0}")]
    Crypto(String),
}

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, PlsError>;
