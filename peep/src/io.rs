//! Async driver: runs a [`PeepConnection`] over any tokio byte stream.

use std::collections::VecDeque;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::connection::{ConnectionState, PeepConnection, Role};
use crate::error::Result;
use crate::transport::{Application, Transport};

const READ_BUF_LEN: usize = 16 * 1024;

/// Transport that queues writes until the driver flushes them to the socket.
#[derive(Debug, Default)]
pub struct Outbox {
    pending: VecDeque<Bytes>,
    closed: bool,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pop(&mut self) -> Option<Bytes> {
        self.pending.pop_front()
    }
}

impl Transport for Outbox {
    fn write(&mut self, data: Bytes) {
        if !self.closed {
            self.pending.push_back(data);
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Pump `io` through `conn` until the connection closes.
///
/// A client connection is started here. Each buffer received on `outgoing`
/// is sent once the connection is established; when every sender is
/// dropped the connection tears down with RIP / RIP-ACK. Returns the
/// connection so its application can be inspected.
///
/// A failing stream closes the connection, reporting the error to its
/// application before it is returned.
pub async fn drive<IO, A>(
    io: IO,
    mut conn: PeepConnection<Outbox, A>,
    mut outgoing: mpsc::UnboundedReceiver<Bytes>,
) -> Result<PeepConnection<Outbox, A>>
where
    IO: AsyncRead + AsyncWrite + Unpin,
    A: Application,
{
    let (mut reader, mut writer) = tokio::io::split(io);
    let mut buf = vec![0u8; READ_BUF_LEN];
    let mut outgoing_open = true;

    if conn.role() == Role::Client && conn.state() == ConnectionState::Init {
        conn.start()?;
    }

    loop {
        if let Err(e) = flush(&mut writer, conn.transport_mut()).await {
            if conn.state() == ConnectionState::Closed {
                debug!(error = %e, "peer gone before final flush");
                break;
            }
            return Err(conn.abort(e));
        }
        if conn.state() == ConnectionState::Closed {
            break;
        }

        let transmitting = conn.state() == ConnectionState::Transmit;
        tokio::select! {
            read = reader.read(&mut buf) => {
                let n = match read {
                    Ok(n) => n,
                    Err(e) => return Err(conn.abort(e.into())),
                };
                if n == 0 {
                    conn.on_transport_closed();
                    continue;
                }
                if let Err(e) = conn.on_bytes(&buf[..n]) {
                    // The connection has already closed itself.
                    let _ = writer.shutdown().await;
                    return Err(e);
                }
            }
            next = outgoing.recv(), if outgoing_open && transmitting => {
                match next {
                    Some(data) => {
                        if let Err(e) = conn.send(&data) {
                            return Err(conn.abort(e));
                        }
                    }
                    None => {
                        outgoing_open = false;
                        conn.close();
                    }
                }
            }
        }
    }

    let _ = writer.shutdown().await;
    Ok(conn)
}

async fn flush<W: AsyncWrite + Unpin>(writer: &mut W, outbox: &mut Outbox) -> Result<()> {
    let mut wrote = false;
    while let Some(chunk) = outbox.pop() {
        writer.write_all(&chunk).await?;
        wrote = true;
    }
    if wrote {
        writer.flush().await?;
    }
    Ok(())
}
