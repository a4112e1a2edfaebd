//! PRUDP v0 packet framing.
//!
//! Every UDP datagram on the auth and secure endpoints carries exactly one
//! packet:
//!
//! ```text
//! ┌────────┬──────┬───────────┬─────────┬───────────┬─────────┬──────────────┬─────────┬──────────┐
//! │ source │ dest │ type|flags│ session │ signature │   seq   │ type fields  │ payload │ checksum │
//! │   1B   │  1B  │    1B     │   1B    │  4B (LE)  │ 2B (LE) │  (see below) │   var   │    1B    │
//! └────────┴──────┴───────────┴─────────┴───────────┴─────────┴──────────────┴─────────┴──────────┘
//! ```
//!
//! Type fields:
//! - SYN / CONNECT: 4-byte connection signature
//! - DATA: 1-byte fragment id (0 = final fragment)
//! - any type with `HAS_SIZE`: u16 payload length before the payload
//!
//! The type occupies the low three bits of the type/flags byte and the five
//! flag bits sit above it. The trailing checksum is the wrapping byte sum of
//! the access key followed by every preceding byte of the packet.

use std::ops::{BitOr, BitOrAssign};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// Virtual port of the server side of every connection.
pub const SERVER_PORT: u8 = 0x31;

/// Virtual port of the client side of every connection.
pub const CLIENT_PORT: u8 = 0x3F;

/// Signature carried by every SYN packet.
pub const SYN_SIGNATURE: u32 = 0;

/// Largest payload a single packet can describe with `HAS_SIZE`.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

const TYPE_MASK: u8 = 0x07;
const FLAG_SHIFT: u8 = 3;

/// PRUDP packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Connection request carrying the client's connection signature
    Syn = 0,
    /// Connection establishment (carries the ticket on the secure endpoint)
    Connect = 1,
    /// Application payload or acknowledgement
    Data = 2,
    /// Connection teardown
    Disconnect = 3,
    /// Keep-alive
    Ping = 4,
}

impl PacketType {
    /// Convert from the low bits of the type/flags byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Syn),
            1 => Some(Self::Connect),
            2 => Some(Self::Data),
            3 => Some(Self::Disconnect),
            4 => Some(Self::Ping),
            _ => None,
        }
    }

    /// Numeric wire value.
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Flag set carried in the high bits of the type/flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PacketFlags(u8);

impl PacketFlags {
    /// Packet acknowledges the sequence id it carries
    pub const ACK: Self = Self(0x01);
    /// Packet belongs to the reliable stream
    pub const RELIABLE: Self = Self(0x02);
    /// Receiver must acknowledge this packet
    pub const NEED_ACK: Self = Self(0x04);
    /// Payload is preceded by a u16 length
    pub const HAS_SIZE: Self = Self(0x08);
    /// Payload is a list of acknowledged sequence ids
    pub const MULTI_ACK: Self = Self(0x10);

    const ALL_BITS: u8 = 0x1F;

    /// Empty flag set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build from raw bits, discarding undefined bits.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL_BITS)
    }

    /// Raw flag bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True if every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set every flag in `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear every flag in `other`.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for PacketFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PacketFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Fixed 10-byte packet header.
///
/// Multi-byte fields are stored as little-endian byte arrays so the struct has
/// alignment 1 and every bit pattern is a valid value.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct PacketHeader {
    source: u8,
    destination: u8,
    type_flags: u8,
    session_id: u8,
    signature: [u8; 4],
    sequence_id: [u8; 2],
}

impl PacketHeader {
    /// Size of the serialized header
    pub const SIZE: usize = 10;

    /// Parse the header prefix of a datagram without copying.
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(bytes)
            .map(|(header, _)| header)
            .map_err(|_| ProtocolError::PacketTooShort { expected: Self::SIZE, actual: bytes.len() })
    }

    /// Source virtual port.
    pub fn source(&self) -> u8 {
        self.source
    }

    /// Destination virtual port.
    pub fn destination(&self) -> u8 {
        self.destination
    }

    /// Raw type/flags byte.
    pub fn type_flags(&self) -> u8 {
        self.type_flags
    }

    /// Packet type, if the type bits are known.
    pub fn packet_type(&self) -> Option<PacketType> {
        PacketType::from_u8(self.type_flags & TYPE_MASK)
    }

    /// Flag set.
    pub fn flags(&self) -> PacketFlags {
        PacketFlags::from_bits(self.type_flags >> FLAG_SHIFT)
    }

    /// Client-chosen session id.
    pub fn session_id(&self) -> u8 {
        self.session_id
    }

    /// Packet signature.
    pub fn signature(&self) -> u32 {
        u32::from_le_bytes(self.signature)
    }

    /// Sequence id.
    pub fn sequence_id(&self) -> u16 {
        u16::from_le_bytes(self.sequence_id)
    }
}

/// Compose the type/flags byte.
pub fn type_flags_byte(packet_type: PacketType, flags: PacketFlags) -> u8 {
    packet_type.to_u8() | (flags.bits() << FLAG_SHIFT)
}

/// Wrapping byte sum of an access key, the starting value of every checksum.
pub fn checksum_seed(access_key: &[u8]) -> u8 {
    access_key.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Checksum of `data` starting from `seed`.
pub fn checksum(seed: u8, data: &[u8]) -> u8 {
    data.iter().fold(seed, |acc, b| acc.wrapping_add(*b))
}

/// True if the trailing checksum byte of `datagram` matches `seed`.
///
/// Used to identify which access key (and therefore which platform) a new
/// client speaks before any state exists for it.
pub fn checksum_matches(seed: u8, datagram: &[u8]) -> bool {
    match datagram.split_last() {
        Some((last, body)) if datagram.len() > PacketHeader::SIZE => checksum(seed, body) == *last,
        _ => false,
    }
}

/// Decoded PRUDP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Source virtual port
    pub source: u8,
    /// Destination virtual port
    pub destination: u8,
    /// Packet type
    pub packet_type: PacketType,
    /// Flag set
    pub flags: PacketFlags,
    /// Client-chosen session id
    pub session_id: u8,
    /// Type-dependent signature
    pub signature: u32,
    /// Sequence id
    pub sequence_id: u16,
    /// Connection signature (SYN and CONNECT only)
    pub connection_signature: Option<u32>,
    /// Fragment id (DATA only, 0 = final)
    pub fragment_id: u8,
    /// Payload bytes (possibly encrypted)
    pub payload: Bytes,
}

impl Packet {
    /// Packet from the server to a client with an empty payload.
    pub fn server(packet_type: PacketType, flags: PacketFlags, session_id: u8) -> Self {
        Self {
            source: SERVER_PORT,
            destination: CLIENT_PORT,
            packet_type,
            flags,
            session_id,
            signature: 0,
            sequence_id: 0,
            connection_signature: None,
            fragment_id: 0,
            payload: Bytes::new(),
        }
    }

    /// Packet from a client to the server with an empty payload.
    pub fn client(packet_type: PacketType, flags: PacketFlags, session_id: u8) -> Self {
        Self { source: CLIENT_PORT, destination: SERVER_PORT, ..Self::server(packet_type, flags, session_id) }
    }

    /// Raw type/flags byte as it appears on the wire.
    pub fn type_flags(&self) -> u8 {
        type_flags_byte(self.packet_type, self.flags)
    }

    /// True if this packet acknowledges an earlier one.
    pub fn is_ack(&self) -> bool {
        self.flags.contains(PacketFlags::ACK) || self.flags.contains(PacketFlags::MULTI_ACK)
    }

    /// Bytes covered by the DATA signature: `seq || session || type_flags ||
    /// payload`.
    pub fn signed_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.payload.len());
        buf.put_u16_le(self.sequence_id);
        buf.put_u8(self.session_id);
        buf.put_u8(self.type_flags());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode a datagram, verifying its checksum against `seed`.
    ///
    /// # Errors
    ///
    /// - `PacketTooShort` if the datagram cannot hold a header and checksum
    /// - `InvalidChecksum` if the trailing byte does not match
    /// - `UnknownPacketType` if the type bits are undefined
    /// - `PayloadSizeMismatch` if a declared size disagrees with the datagram
    pub fn decode(datagram: &[u8], seed: u8) -> Result<Self> {
        if datagram.len() < PacketHeader::SIZE + 1 {
            return Err(ProtocolError::PacketTooShort {
                expected: PacketHeader::SIZE + 1,
                actual: datagram.len(),
            });
        }

        let (body, trailer) = datagram.split_at(datagram.len() - 1);
        let expected = checksum(seed, body);
        if expected != trailer[0] {
            return Err(ProtocolError::InvalidChecksum { expected, actual: trailer[0] });
        }

        let header = PacketHeader::from_bytes(body)?;
        let packet_type = header
            .packet_type()
            .ok_or(ProtocolError::UnknownPacketType(header.type_flags() & TYPE_MASK))?;
        let flags = header.flags();

        let mut rest = &body[PacketHeader::SIZE..];

        let connection_signature = match packet_type {
            PacketType::Syn | PacketType::Connect => {
                if rest.remaining() < 4 {
                    return Err(ProtocolError::PacketTooShort {
                        expected: PacketHeader::SIZE + 5,
                        actual: datagram.len(),
                    });
                }
                Some(rest.get_u32_le())
            },
            _ => None,
        };

        let fragment_id = if packet_type == PacketType::Data {
            if !rest.has_remaining() {
                return Err(ProtocolError::PacketTooShort {
                    expected: PacketHeader::SIZE + 2,
                    actual: datagram.len(),
                });
            }
            rest.get_u8()
        } else {
            0
        };

        if flags.contains(PacketFlags::HAS_SIZE) {
            if rest.remaining() < 2 {
                return Err(ProtocolError::PayloadSizeMismatch { declared: 2, available: rest.remaining() });
            }
            let declared = rest.get_u16_le() as usize;
            if declared != rest.remaining() {
                return Err(ProtocolError::PayloadSizeMismatch { declared, available: rest.remaining() });
            }
        }
        let payload = Bytes::copy_from_slice(rest);

        Ok(Self {
            source: header.source(),
            destination: header.destination(),
            packet_type,
            flags,
            session_id: header.session_id(),
            signature: header.signature(),
            sequence_id: header.sequence_id(),
            connection_signature,
            fragment_id,
            payload,
        })
    }

    /// Encode into a datagram, appending a checksum seeded with `seed`.
    ///
    /// # Errors
    ///
    /// - `PayloadTooLarge` if the payload cannot be described by a u16 size
    pub fn encode(&self, seed: u8) -> Result<Bytes> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge { size: self.payload.len(), max: MAX_PAYLOAD_SIZE });
        }

        let mut buf = BytesMut::with_capacity(PacketHeader::SIZE + 8 + self.payload.len());
        buf.put_u8(self.source);
        buf.put_u8(self.destination);
        buf.put_u8(self.type_flags());
        buf.put_u8(self.session_id);
        buf.put_u32_le(self.signature);
        buf.put_u16_le(self.sequence_id);

        match self.packet_type {
            PacketType::Syn | PacketType::Connect => {
                buf.put_u32_le(self.connection_signature.unwrap_or_default());
            },
            PacketType::Data => buf.put_u8(self.fragment_id),
            PacketType::Disconnect | PacketType::Ping => {},
        }

        if self.flags.contains(PacketFlags::HAS_SIZE) {
            buf.put_u16_le(self.payload.len() as u16);
        }
        buf.extend_from_slice(&self.payload);

        let sum = checksum(seed, &buf);
        buf.put_u8(sum);

        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: u8 = 0x5A;

    #[test]
    fn header_is_ten_bytes() {
        assert_eq!(std::mem::size_of::<PacketHeader>(), PacketHeader::SIZE);
    }

    #[test]
    fn type_and_flags_share_one_byte() {
        let byte = type_flags_byte(PacketType::Data, PacketFlags::RELIABLE | PacketFlags::NEED_ACK);
        assert_eq!(byte & 0x07, 2);
        assert_eq!(byte >> 3, 0x06);

        let all = type_flags_byte(PacketType::Ping, PacketFlags::from_bits(0xFF));
        assert_eq!(all, 0xFC);
    }

    #[test]
    fn syn_round_trips_with_connection_signature() {
        let mut packet = Packet::client(PacketType::Syn, PacketFlags::NEED_ACK, 7);
        packet.connection_signature = Some(0xDEAD_BEEF);

        let bytes = packet.encode(SEED).unwrap();
        let decoded = Packet::decode(&bytes, SEED).unwrap();

        assert_eq!(decoded, packet);
        assert_eq!(decoded.connection_signature, Some(0xDEAD_BEEF));
    }

    #[test]
    fn data_with_size_round_trips() {
        let mut packet = Packet::server(
            PacketType::Data,
            PacketFlags::RELIABLE | PacketFlags::NEED_ACK | PacketFlags::HAS_SIZE,
            3,
        );
        packet.sequence_id = 0xFFFF;
        packet.fragment_id = 2;
        packet.signature = 0x0102_0304;
        packet.payload = Bytes::from_static(b"hello world");

        let bytes = packet.encode(SEED).unwrap();
        assert_eq!(Packet::decode(&bytes, SEED).unwrap(), packet);
    }

    #[test]
    fn checksum_mismatch_is_rejected() {
        let packet = Packet::client(PacketType::Ping, PacketFlags::NEED_ACK, 1);
        let bytes = packet.encode(SEED).unwrap();

        let result = Packet::decode(&bytes, SEED.wrapping_add(1));
        assert!(matches!(result, Err(ProtocolError::InvalidChecksum { .. })));
        assert!(checksum_matches(SEED, &bytes));
        assert!(!checksum_matches(SEED.wrapping_add(1), &bytes));
    }

    #[test]
    fn declared_size_must_match() {
        let mut packet = Packet::client(PacketType::Data, PacketFlags::HAS_SIZE, 1);
        packet.payload = Bytes::from_static(b"abc");
        let bytes = packet.encode(SEED).unwrap();

        // Drop one payload byte and recompute the checksum
        let mut truncated = bytes[..bytes.len() - 2].to_vec();
        truncated.push(checksum(SEED, &truncated));

        let result = Packet::decode(&truncated, SEED);
        assert!(matches!(result, Err(ProtocolError::PayloadSizeMismatch { .. })));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut raw = vec![CLIENT_PORT, SERVER_PORT, 0x07, 0, 0, 0, 0, 0, 0, 0];
        raw.push(checksum(SEED, &raw));

        assert!(matches!(Packet::decode(&raw, SEED), Err(ProtocolError::UnknownPacketType(7))));
    }

    #[test]
    fn short_datagram_is_rejected() {
        assert!(matches!(Packet::decode(&[1, 2, 3], SEED), Err(ProtocolError::PacketTooShort { .. })));
    }

    #[test]
    fn checksum_seed_sums_key_bytes() {
        assert_eq!(checksum_seed(&[0xFF, 0x02]), 0x01);
        assert_eq!(checksum_seed(&[]), 0);
    }
}
