// Boundaries between a PLS connection and the layers below and above it.

use bytes::Bytes;

use crate::error::PlsError;

/// The lower layer: an ordered, reliable byte stream.
///
/// Incoming bytes are pushed into [`Connection::on_bytes`](crate::Connection::on_bytes)
/// by whoever owns the stream.
pub trait Transport {
    /// Queue bytes for delivery to the peer.
    fn write(&mut self, data: Bytes);

    /// Close the underlying stream.
    fn close(&mut self);
}

/// The upper layer that consumes decrypted application data.
pub trait Application {
    /// The handshake completed and both sides verified the transcript.
    fn on_secure_channel_ready(&mut self);

    /// One decrypted, integrity-checked application message.
    fn on_plaintext_received(&mut self, data: Bytes);

    /// The connection closed. `error` is set when it closed because of a
    /// protocol failure; called at most once per connection.
    fn on_connection_lost(&mut self, error: Option<&PlsError>);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: Bytes) {
        (**self).write(data)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

impl<A: Application + ?Sized> Application for Box<A> {
    fn on_secure_channel_ready(&mut self) {
        (**self).on_secure_channel_ready()
    }

    fn on_plaintext_received(&mut self, data: Bytes) {
        (**self).on_plaintext_received(data)
    }

    fn on_connection_lost(&mut self, error: Option<&PlsError>) {
        (**self).on_connection_lost(error)
    }
}
