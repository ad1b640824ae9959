//! PEEP -- connection handshake and teardown layer for the PLS protocol stack.
//!
//! Provides:
//! - **Packets** with a CRC-32 checksum and a streaming deserializer
//! - **Three-way handshake**: SYN, SYN-ACK, ACK
//! - **Data transfer** in DATA packets
//! - **Teardown**: RIP, RIP-ACK
//! - **Async driver** over any tokio byte stream

pub mod connection;
pub mod error;
pub mod io;
pub mod packet;
pub mod transport;

// Re-export key public types at crate root.
pub use connection::{ConnectionState, PeepConfig, PeepConnection, Role};
pub use error::{PeepError, Result};
pub use io::{drive, Outbox};
pub use packet::{Deserializer, Packet, PacketType};
pub use transport::{Application, Transport};
