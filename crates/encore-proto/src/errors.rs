//! Wire-level error types.

use thiserror::Error;

/// Result alias for wire parsing.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while parsing or building wire structures.
///
/// None of these are ever reported back to a peer. The packet layer drops
/// offending datagrams silently; the RMC layer turns them into an
/// invalid-argument response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Datagram shorter than the fixed packet header plus checksum
    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    PacketTooShort {
        /// Minimum number of bytes required
        expected: usize,
        /// Number of bytes received
        actual: usize,
    },

    /// Trailing checksum byte does not match the computed sum
    #[error("invalid checksum: expected {expected:#04x}, got {actual:#04x}")]
    InvalidChecksum {
        /// Checksum computed over the packet
        expected: u8,
        /// Checksum carried by the packet
        actual: u8,
    },

    /// Packet type bits do not name a known packet type
    #[error("unknown packet type: {0}")]
    UnknownPacketType(u8),

    /// Packet declared a payload size that disagrees with the datagram
    #[error("payload size mismatch: declared {declared}, available {available}")]
    PayloadSizeMismatch {
        /// Size carried in the packet
        declared: usize,
        /// Bytes actually present
        available: usize,
    },

    /// Payload exceeds what the wire format can describe
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Actual size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// Stream ended before a value could be read
    #[error("unexpected end of stream: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof {
        /// Bytes needed by the read
        needed: usize,
        /// Bytes left in the stream
        remaining: usize,
    },

    /// String was not valid UTF-8 or lacked its terminator
    #[error("invalid string: {0}")]
    InvalidString(String),

    /// RMC envelope was malformed
    #[error("invalid RMC message: {0}")]
    InvalidRmc(String),

    /// Station URL could not be parsed
    #[error("invalid station URL: {0}")]
    InvalidStationUrl(String),

    /// Typed wrapper carried an unexpected type name or length
    #[error("invalid data holder: {0}")]
    InvalidDataHolder(String),

    /// JSON tunnel payload had the wrong shape
    #[error("invalid tunnel payload: {0}")]
    InvalidTunnel(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidTunnel(err.to_string())
    }
}
