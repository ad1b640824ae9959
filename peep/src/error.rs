use thiserror::Error;

/// All errors produced by the PEEP layer.
#[derive(Debug, Error)]
pub enum PeepError {
    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    PacketTooShort { expected: usize, actual: usize },

    #[error("{0} trailing bytes after packet")]
    TrailingBytes(usize),

    #[error("unknown packet type: 0x{0:02x}")]
    UnknownPacketType(u8),

    #[error("bad checksum on {packet} packet: carried 0x{carried:08x}, computed 0x{computed:08x}")]
    BadChecksum {
        packet: &'static str,
        carried: u32,
        computed: u32,
    },

    #[error("unexpected acknowledgement on {packet}: expected {expected}, got {actual}")]
    BadAcknowledgement {
        packet: &'static str,
        expected: u32,
        actual: u32,
    },

    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("connection is not established")]
    NotEstablished,

    #[error("connection is closed")]
    ConnectionClosed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PeepError>;
