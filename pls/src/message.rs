//! PLS wire messages and the streaming deserializer.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::crypto::hash::HASH_LEN;
use crate::error::{PlsError, Result};

/// Most certificates a Hello may carry.
pub const MAX_CERTS: usize = 8;
/// Largest accepted certificate blob.
pub const MAX_CERT_LEN: usize = 16 * 1024;
/// Largest accepted sealed pre-key.
pub const MAX_PRE_KEY_LEN: usize = 1024;
/// Largest accepted Data payload (ciphertext plus tag).
pub const MAX_DATA_LEN: usize = 1024 * 1024 + 32;

/// Message type identifiers. Wire values are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Hello = 0x01,
    KeyExchange = 0x02,
    HandshakeDone = 0x03,
    Data = 0x04,
    Close = 0x05,
}

impl MessageType {
    /// Name used in logs and state-violation errors.
    pub fn name(self) -> &'static str {
        match self {
            MessageType::Hello => "Hello",
            MessageType::KeyExchange => "KeyExchange",
            MessageType::HandshakeDone => "HandshakeDone",
            MessageType::Data => "Data",
            MessageType::Close => "Close",
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = PlsError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(MessageType::Hello),
            0x02 => Ok(MessageType::KeyExchange),
            0x03 => Ok(MessageType::HandshakeDone),
            0x04 => Ok(MessageType::Data),
            0x05 => Ok(MessageType::Close),
            other => Err(PlsError::MalformedPacket(format!(
                "unknown message type 0x{other:02x}"
            ))),
        }
    }
}

/// PLS wire message.
///
/// Binary layout (all fields big-endian):
///
/// ```text
/// Hello:         type(1) nonce(8) count(2) { len(4) cert(N) }*count
/// KeyExchange:   type(1) len(4) pre_key(N) nonce_plus_one(8)
/// HandshakeDone: type(1) validation_hash(32)
/// Data:          type(1) len(4) payload(N)
/// Close:         type(1)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Hello {
        nonce: u64,
        certs: Vec<Bytes>,
    },
    KeyExchange {
        pre_key: Bytes,
        nonce_plus_one: u64,
    },
    HandshakeDone {
        validation_hash: [u8; HASH_LEN],
    },
    /// One encrypted-and-tagged application message.
    Data {
        payload: Bytes,
    },
    Close,
}

impl Message {
    /// Return the message type discriminant.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Hello { .. } => MessageType::Hello,
            Message::KeyExchange { .. } => MessageType::KeyExchange,
            Message::HandshakeDone { .. } => MessageType::HandshakeDone,
            Message::Data { .. } => MessageType::Data,
            Message::Close => MessageType::Close,
        }
    }

    /// Encode this message into a byte buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Encode into a pre-allocated `BytesMut`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8(self.message_type() as u8);
        match self {
            Message::Hello { nonce, certs } => {
                buf.put_u64(*nonce);
                buf.put_u16(certs.len() as u16);
                for cert in certs {
                    buf.put_u32(cert.len() as u32);
                    buf.put_slice(cert);
                }
            }
            Message::KeyExchange {
                pre_key,
                nonce_plus_one,
            } => {
                buf.put_u32(pre_key.len() as u32);
                buf.put_slice(pre_key);
                buf.put_u64(*nonce_plus_one);
            }
            Message::HandshakeDone { validation_hash } => {
                buf.put_slice(validation_hash);
            }
            Message::Data { payload } => {
                buf.put_u32(payload.len() as u32);
                buf.put_slice(payload);
            }
            Message::Close => {}
        }
    }

    /// The total number of bytes this message will occupy when encoded.
    pub fn encoded_len(&self) -> usize {
        // 1 byte for type tag in every variant
        1 + match self {
            Message::Hello { certs, .. } => {
                8 + 2 + certs.iter().map(|c| 4 + c.len()).sum::<usize>()
            }
            Message::KeyExchange { pre_key, .. } => 4 + pre_key.len() + 8,
            Message::HandshakeDone { .. } => HASH_LEN,
            Message::Data { payload } => 4 + payload.len(),
            Message::Close => 0,
        }
    }

    /// Decode exactly one message occupying all of `data`.
    ///
    /// Truncated input and trailing bytes are both [`PlsError::MalformedPacket`].
    pub fn decode(data: &[u8]) -> Result<Self> {
        match Self::decode_partial(data)? {
            Some((message, used)) if used == data.len() => Ok(message),
            Some((_, used)) => Err(PlsError::MalformedPacket(format!(
                "{} trailing bytes after {}-byte message",
                data.len() - used,
                used
            ))),
            None => Err(PlsError::MalformedPacket("truncated message".into())),
        }
    }

    /// Decode one message from the front of `data`.
    ///
    /// Returns `Ok(None)` when `data` is a valid but incomplete prefix, or the
    /// message together with the number of bytes it occupied.
    pub fn decode_partial(data: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut cur = Cursor { data, pos: 0 };

        let Some(tag) = cur.take(1) else {
            return Ok(None);
        };
        let message_type = MessageType::try_from(tag[0])?;

        let message = match message_type {
            MessageType::Hello => {
                let Some(nonce) = cur.u64() else { return Ok(None) };
                let Some(count) = cur.u16() else { return Ok(None) };
                let count = count as usize;
                if count > MAX_CERTS {
                    return Err(PlsError::MalformedPacket(format!(
                        "Hello carries {count} certificates, max {MAX_CERTS}"
                    )));
                }
                let mut certs = Vec::with_capacity(count);
                for _ in 0..count {
                    let Some(cert) = cur.prefixed(MAX_CERT_LEN, "certificate")? else {
                        return Ok(None);
                    };
                    certs.push(cert);
                }
                Message::Hello { nonce, certs }
            }
            MessageType::KeyExchange => {
                let Some(pre_key) = cur.prefixed(MAX_PRE_KEY_LEN, "pre-key")? else {
                    return Ok(None);
                };
                let Some(nonce_plus_one) = cur.u64() else { return Ok(None) };
                Message::KeyExchange {
                    pre_key,
                    nonce_plus_one,
                }
            }
            MessageType::HandshakeDone => {
                let Some(hash) = cur.take(HASH_LEN) else { return Ok(None) };
                let mut validation_hash = [0u8; HASH_LEN];
                validation_hash.copy_from_slice(hash);
                Message::HandshakeDone { validation_hash }
            }
            MessageType::Data => {
                let Some(payload) = cur.prefixed(MAX_DATA_LEN, "data payload")? else {
                    return Ok(None);
                };
                Message::Data { payload }
            }
            MessageType::Close => Message::Close,
        };

        Ok(Some((message, cur.pos)))
    }
}

/// Read cursor that reports exhaustion as `None` ("need more bytes").
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.data.len() - self.pos < n {
            return None;
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Some(out)
    }

    fn u16(&mut self) -> Option<u16> {
        self.take(2).map(|mut b| b.get_u16())
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(4).map(|mut b| b.get_u32())
    }

    fn u64(&mut self) -> Option<u64> {
        self.take(8).map(|mut b| b.get_u64())
    }

    /// A u32 length prefix followed by that many bytes. An over-limit length
    /// is rejected before its body arrives.
    fn prefixed(&mut self, max: usize, what: &str) -> Result<Option<Bytes>> {
        let Some(len) = self.u32() else { return Ok(None) };
        let len = len as usize;
        if len > max {
            return Err(PlsError::MalformedPacket(format!(
                "{what} length {len} exceeds {max}"
            )));
        }
        Ok(self.take(len).map(Bytes::copy_from_slice))
    }
}

/// Reassembles complete messages from a byte stream.
///
/// Feed arbitrary chunks with [`update`](Self::update) and drain
/// [`next_message`](Self::next_message) until it returns `Ok(None)`.
#[derive(Debug, Default)]
pub struct Deserializer {
    buf: BytesMut,
}

impl Deserializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly received bytes.
    pub fn update(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of buffered bytes not yet consumed by a complete message.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete message together with its exact wire bytes.
    ///
    /// A malformed message poisons the stream; the caller is expected to
    /// close the connection.
    pub fn next_message(&mut self) -> Result<Option<(Message, Bytes)>> {
        match Message::decode_partial(&self.buf)? {
            Some((message, used)) => {
                let raw = self.buf.split_to(used).freeze();
                Ok(Some((message, raw)))
            }
            None => Ok(None),
        }
    }
}
