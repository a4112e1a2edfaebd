//! Encore wire formats.
//!
//! Everything that crosses the network is defined here, with no I/O and no
//! session state:
//!
//! - [`Packet`]: PRUDP v0 packets (header, per-type fields, checksum)
//! - [`StreamReader`] / [`StreamWriter`]: little-endian primitive codec used by
//!   every RMC parameter list
//! - [`RmcRequest`] / [`RmcResponse`]: remote method call envelopes
//! - [`StationUrl`]: `prudp:/key=value;...` peer addresses
//! - [`ErrorCode`]: typed 32-bit result codes carried in RMC error responses
//! - [`tunnel`]: the column-oriented JSON sub-protocol
//!
//! # Byte Order
//!
//! All multi-byte integers are little-endian. Strings are a u16 length
//! (including the terminating NUL) followed by UTF-8 bytes and a NUL.
//! Buffers are a u32 length followed by raw bytes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod any_data;
pub mod datetime;
pub mod errors;
pub mod message;
pub mod packet;
pub mod protocol;
pub mod result;
pub mod rmc;
pub mod station_url;
pub mod stream;
pub mod tunnel;

pub use any_data::AnyDataHolder;
pub use datetime::PackedDateTime;
pub use errors::{ProtocolError, Result};
pub use message::{MessageRecipient, RecipientType, TextMessage, UserMessage};
pub use packet::{Packet, PacketFlags, PacketHeader, PacketType};
pub use protocol::ProtocolId;
pub use result::ErrorCode;
pub use rmc::{RmcRequest, RmcResponse};
pub use station_url::{StationUrl, UrlScheme};
pub use stream::{StreamReader, StreamWriter, Structure};
