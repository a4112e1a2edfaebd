//! Remote method call envelopes.
//!
//! ```text
//! request:  size u32 | protocol|0x80 | call_id u32 | method_id u32 | params
//! response: size u32 | protocol      | 1 | call_id u32 | method_id u32 | payload
//!           size u32 | protocol      | 0 | error_code u32 | call_id u32
//! ```
//!
//! `size` counts every byte after the size field itself.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    errors::{ProtocolError, Result},
    result::ErrorCode,
    stream::StreamReader,
};

/// High bit of the protocol byte, set on requests.
pub const REQUEST_BIT: u8 = 0x80;

/// Inbound (or server-initiated) method call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RmcRequest {
    /// Protocol id (low seven bits of the protocol byte)
    pub protocol_id: u8,
    /// Caller-chosen id echoed in the response
    pub call_id: u32,
    /// Method within the protocol
    pub method_id: u32,
    /// Encoded parameter list
    pub parameters: Bytes,
}

impl RmcRequest {
    /// Decode a complete request message.
    ///
    /// # Errors
    ///
    /// - `InvalidRmc` if the size prefix disagrees with the message length or
    ///   the request bit is clear
    /// - `UnexpectedEof` if the fixed fields are truncated
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = StreamReader::new(bytes);
        let size = reader.read_u32()? as usize;
        if size != reader.remaining() {
            return Err(ProtocolError::InvalidRmc(format!(
                "size prefix {size} does not match {} remaining bytes",
                reader.remaining()
            )));
        }

        let protocol = reader.read_u8()?;
        if protocol & REQUEST_BIT == 0 {
            return Err(ProtocolError::InvalidRmc("request bit not set".to_string()));
        }

        let call_id = reader.read_u32()?;
        let method_id = reader.read_u32()?;
        let parameters = Bytes::copy_from_slice(reader.read_rest());

        Ok(Self { protocol_id: protocol & !REQUEST_BIT, call_id, method_id, parameters })
    }

    /// Encode as a request message.
    pub fn encode(&self) -> Bytes {
        let body_len = 1 + 4 + 4 + self.parameters.len();
        let mut buf = BytesMut::with_capacity(4 + body_len);
        buf.put_u32_le(body_len as u32);
        buf.put_u8(self.protocol_id | REQUEST_BIT);
        buf.put_u32_le(self.call_id);
        buf.put_u32_le(self.method_id);
        buf.extend_from_slice(&self.parameters);
        buf.freeze()
    }
}

/// Outbound method result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RmcResponse {
    /// Method completed
    Success {
        /// Protocol id of the request
        protocol_id: u8,
        /// Call id of the request
        call_id: u32,
        /// Method id of the request
        method_id: u32,
        /// Encoded return values
        payload: Bytes,
    },
    /// Method failed with a typed code
    Error {
        /// Protocol id of the request
        protocol_id: u8,
        /// Call id of the request
        call_id: u32,
        /// Wire error code
        error_code: u32,
    },
}

impl RmcResponse {
    /// Successful response to `request`.
    pub fn success(request: &RmcRequest, payload: Bytes) -> Self {
        Self::Success {
            protocol_id: request.protocol_id,
            call_id: request.call_id,
            method_id: request.method_id,
            payload,
        }
    }

    /// Failed response to `request`.
    pub fn error(request: &RmcRequest, code: ErrorCode) -> Self {
        Self::Error { protocol_id: request.protocol_id, call_id: request.call_id, error_code: code.code() }
    }

    /// Call id this response answers.
    pub fn call_id(&self) -> u32 {
        match self {
            Self::Success { call_id, .. } | Self::Error { call_id, .. } => *call_id,
        }
    }

    /// Typed error code, if this is a known error response.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Success { .. } => None,
            Self::Error { error_code, .. } => ErrorCode::from_code(*error_code),
        }
    }

    /// Encode as a response message.
    pub fn encode(&self) -> Bytes {
        let mut body = BytesMut::new();
        match self {
            Self::Success { protocol_id, call_id, method_id, payload } => {
                body.put_u8(*protocol_id & !REQUEST_BIT);
                body.put_u8(1);
                body.put_u32_le(*call_id);
                body.put_u32_le(*method_id);
                body.extend_from_slice(payload);
            },
            Self::Error { protocol_id, call_id, error_code } => {
                body.put_u8(*protocol_id & !REQUEST_BIT);
                body.put_u8(0);
                body.put_u32_le(*error_code);
                body.put_u32_le(*call_id);
            },
        }

        let mut buf = BytesMut::with_capacity(4 + body.len());
        buf.put_u32_le(body.len() as u32);
        buf.extend_from_slice(&body);
        buf.freeze()
    }

    /// Decode a complete response message.
    ///
    /// # Errors
    ///
    /// - `InvalidRmc` if the size prefix is wrong or the request bit is set
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = StreamReader::new(bytes);
        let size = reader.read_u32()? as usize;
        if size != reader.remaining() {
            return Err(ProtocolError::InvalidRmc(format!(
                "size prefix {size} does not match {} remaining bytes",
                reader.remaining()
            )));
        }

        let protocol_id = reader.read_u8()?;
        if protocol_id & REQUEST_BIT != 0 {
            return Err(ProtocolError::InvalidRmc("request bit set on response".to_string()));
        }

        if reader.read_bool()? {
            let call_id = reader.read_u32()?;
            let method_id = reader.read_u32()?;
            let payload = Bytes::copy_from_slice(reader.read_rest());
            Ok(Self::Success { protocol_id, call_id, method_id, payload })
        } else {
            let error_code = reader.read_u32()?;
            let call_id = reader.read_u32()?;
            Ok(Self::Error { protocol_id, call_id, error_code })
        }
    }
}
