use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{PeepError, Result};

/// Fixed header: type(1) + seq(4) + ack(4) + checksum(4) + len(4).
pub const HEADER_LEN: usize = 17;

/// Largest payload a single packet may carry on the wire.
pub const MAX_PAYLOAD_LEN: usize = 1024 * 1024;

/// Packet type identifiers. Wire values are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Syn = 0,
    SynAck = 1,
    Ack = 2,
    Rip = 3,
    RipAck = 4,
    Data = 5,
}

impl PacketType {
    pub fn name(self) -> &'static str {
        match self {
            PacketType::Syn => "SYN",
            PacketType::SynAck => "SYN-ACK",
            PacketType::Ack => "ACK",
            PacketType::Rip => "RIP",
            PacketType::RipAck => "RIP-ACK",
            PacketType::Data => "DATA",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for PacketType {
    type Error = PeepError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PacketType::Syn),
            1 => Ok(PacketType::SynAck),
            2 => Ok(PacketType::Ack),
            3 => Ok(PacketType::Rip),
            4 => Ok(PacketType::RipAck),
            5 => Ok(PacketType::Data),
            other => Err(PeepError::UnknownPacketType(other)),
        }
    }
}

/// PEEP wire packet.
///
/// Binary layout (all fields big-endian):
///
/// ```text
/// +------+---------+---------+-------------+-----------+---------+
/// | type |   seq   |   ack   |  checksum   | data_len  |  data   |
/// | (1B) |  (4B)   |  (4B)   |    (4B)     |   (4B)    |  (N)    |
/// +------+---------+---------+-------------+-----------+---------+
/// ```
///
/// `checksum` is CRC-32 over the whole packet encoded with a zero checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub seq: u32,
    pub ack: u32,
    pub checksum: u32,
    pub data: Bytes,
}

impl Packet {
    /// Build a packet with its checksum filled in.
    pub fn new(packet_type: PacketType, seq: u32, ack: u32, data: Bytes) -> Self {
        let mut packet = Self {
            packet_type,
            seq,
            ack,
            checksum: 0,
            data,
        };
        packet.update_checksum();
        packet
    }

    /// A control packet with no data.
    pub fn control(packet_type: PacketType, seq: u32, ack: u32) -> Self {
        Self::new(packet_type, seq, ack, Bytes::new())
    }

    /// CRC-32 of this packet with the checksum field zeroed.
    pub fn compute_checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&[self.packet_type as u8]);
        hasher.update(&self.seq.to_be_bytes());
        hasher.update(&self.ack.to_be_bytes());
        hasher.update(&0u32.to_be_bytes());
        hasher.update(&(self.data.len() as u32).to_be_bytes());
        hasher.update(&self.data);
        hasher.finalize()
    }

    pub fn update_checksum(&mut self) {
        self.checksum = self.compute_checksum();
    }

    pub fn verify_checksum(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    /// `Ok(())` when the checksum matches, otherwise [`PeepError::BadChecksum`].
    pub fn check(&self) -> Result<()> {
        let computed = self.compute_checksum();
        if computed == self.checksum {
            Ok(())
        } else {
            Err(PeepError::BadChecksum {
                packet: self.packet_type.name(),
                carried: self.checksum,
                computed,
            })
        }
    }

    /// Encode this packet into a byte buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Encode into a pre-allocated `BytesMut`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8(self.packet_type as u8);
        buf.put_u32(self.seq);
        buf.put_u32(self.ack);
        buf.put_u32(self.checksum);
        buf.put_u32(self.data.len() as u32);
        buf.put_slice(&self.data);
    }

    /// The total number of bytes this packet will occupy when encoded.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.data.len()
    }

    /// Decode exactly one packet occupying all of `data`.
    ///
    /// Truncated input is [`PeepError::PacketTooShort`], leftover input
    /// [`PeepError::TrailingBytes`].
    ///
    /// The checksum is carried through unverified; see [`Packet::check`].
    pub fn decode(data: &[u8]) -> Result<Self> {
        match Self::decode_partial(data)? {
            Some((packet, used)) if used == data.len() => Ok(packet),
            Some((_, used)) => Err(PeepError::TrailingBytes(data.len() - used)),
            None => Err(PeepError::PacketTooShort {
                expected: Self::needed(data),
                actual: data.len(),
            }),
        }
    }

    /// Decode one packet from the front of `data`; `Ok(None)` means more
    /// bytes are needed.
    pub fn decode_partial(data: &[u8]) -> Result<Option<(Self, usize)>> {
        if data.is_empty() {
            return Ok(None);
        }
        let packet_type = PacketType::try_from(data[0])?;
        if data.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut header = &data[1..HEADER_LEN];
        let seq = header.get_u32();
        let ack = header.get_u32();
        let checksum = header.get_u32();
        let len = header.get_u32() as usize;
        if len > MAX_PAYLOAD_LEN {
            return Err(PeepError::PayloadTooLarge {
                size: len,
                max: MAX_PAYLOAD_LEN,
            });
        }
        if data.len() < HEADER_LEN + len {
            return Ok(None);
        }

        let packet = Packet {
            packet_type,
            seq,
            ack,
            checksum,
            data: Bytes::copy_from_slice(&data[HEADER_LEN..HEADER_LEN + len]),
        };
        Ok(Some((packet, HEADER_LEN + len)))
    }

    /// Bytes a complete packet starting at `data` needs, as far as known.
    fn needed(data: &[u8]) -> usize {
        if data.len() < HEADER_LEN {
            return HEADER_LEN;
        }
        let len = (&data[13..HEADER_LEN]).get_u32() as usize;
        HEADER_LEN + len
    }
}

/// Reassembles complete packets from a byte stream.
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

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete packet, if one is buffered.
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        match Packet::decode_partial(&self.buf)? {
            Some((packet, used)) => {
                self.buf.advance(used);
                Ok(Some(packet))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let packet = Packet::new(PacketType::Data, 7, 9, Bytes::from_static(b"hi"));
        let encoded = packet.encode();
        assert_eq!(encoded.len(), HEADER_LEN + 2);
        assert_eq!(encoded[0], 5);
        assert_eq!(&encoded[1..5], &7u32.to_be_bytes());
        assert_eq!(&encoded[5..9], &9u32.to_be_bytes());
        assert_eq!(&encoded[9..13], &packet.checksum.to_be_bytes());
        assert_eq!(&encoded[13..17], &2u32.to_be_bytes());
        assert_eq!(&encoded[17..], b"hi");
    }

    #[test]
    fn checksum_matches_zeroed_encoding() {
        let packet = Packet::new(PacketType::Syn, 1234, 0, Bytes::new());
        let mut zeroed = packet.clone();
        zeroed.checksum = 0;
        assert_eq!(packet.checksum, crc32fast::hash(&zeroed.encode()));
        assert!(packet.verify_checksum());
    }

    #[test]
    fn partial_header_needs_more() {
        let encoded = Packet::control(PacketType::Ack, 1, 2).encode();
        for cut in 0..encoded.len() {
            assert!(Packet::decode_partial(&encoded[..cut]).unwrap().is_none());
        }
    }

    #[test]
    fn deserializer_splits_stream() {
        let mut stream = BytesMut::new();
        Packet::control(PacketType::Syn, 1, 0).encode_into(&mut stream);
        Packet::new(PacketType::Data, 2, 0, Bytes::from_static(b"abc")).encode_into(&mut stream);

        let mut de = Deserializer::new();
        de.update(&stream[..20]);
        assert_eq!(de.next_packet().unwrap().unwrap().packet_type, PacketType::Syn);
        assert!(de.next_packet().unwrap().is_none());
        de.update(&stream[20..]);
        let data = de.next_packet().unwrap().unwrap();
        assert_eq!(&data.data[..], b"abc");
        assert_eq!(de.buffered(), 0);
    }
}
