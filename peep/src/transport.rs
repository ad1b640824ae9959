//! Boundaries between a PEEP connection and its neighbouring layers.

use bytes::Bytes;

use crate::error::PeepError;

/// The lower layer: raw bytes out, close.
pub trait Transport {
    fn write(&mut self, data: Bytes);
    fn close(&mut self);
}

/// The layer stacked on top of PEEP.
pub trait Application {
    /// The three-way handshake finished; data may flow.
    fn on_connection_made(&mut self);

    /// Payload of one DATA packet that passed its checksum.
    fn on_data_received(&mut self, data: Bytes);

    /// The connection is gone. Called at most once; `error` is set when a
    /// protocol failure caused it.
    fn on_connection_lost(&mut self, error: Option<&PeepError>);
}
