//! Handler error types.
//!
//! Every failure a handler can produce maps onto exactly one wire
//! [`ErrorCode`]. The dispatcher logs the error and answers with the code;
//! nothing a handler returns tears down the connection.

use std::fmt;

use encore_core::ValidationError;
use encore_crypto::CryptoError;
use encore_proto::{ErrorCode, ProtocolError};

use crate::storage::StorageError;

/// Errors returned by RMC handlers and tunnel services.
#[derive(Debug)]
pub enum HandlerError {
    /// Parameters did not decode, or a reply could not be encoded.
    Protocol(ProtocolError),

    /// A PID named in the request failed validation.
    Validation(ValidationError),

    /// Repository operation failed.
    ///
    /// Logged at error level; the client only sees an operation error.
    Storage(StorageError),

    /// Ticket could not be built or verified.
    Crypto(CryptoError),

    /// Method needs an authenticated session.
    NotAuthenticated,

    /// Caller may not perform this operation.
    AccessDenied(String),

    /// Parameter out of range or referring to nothing.
    InvalidArgument(String),

    /// Username unknown or malformed.
    InvalidUsername(String),

    /// PID unknown.
    InvalidPid(u32),

    /// JSON tunnel request failed.
    Tunnel(String),

    /// No handler for `(protocol, method)`.
    UnknownMethod {
        /// Protocol byte
        protocol: u8,
        /// Method id
        method: u32,
    },

    /// Handler did not finish before the deadline.
    Timeout,

    /// Work was cut short before it produced an outcome.
    Aborted(String),
}

impl HandlerError {
    /// Wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Protocol(_) | Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Validation(ValidationError::NotAuthenticated { .. }) | Self::NotAuthenticated => {
                ErrorCode::NotAuthenticated
            },
            Self::Validation(_) | Self::AccessDenied(_) => ErrorCode::AccessDenied,
            Self::Storage(_) => ErrorCode::OperationError,
            Self::Crypto(_) => ErrorCode::EncryptionFailure,
            Self::InvalidUsername(_) => ErrorCode::InvalidUsername,
            Self::InvalidPid(_) => ErrorCode::InvalidPid,
            Self::Tunnel(_) | Self::UnknownMethod { .. } => ErrorCode::Unknown,
            Self::Timeout => ErrorCode::Timeout,
            Self::Aborted(_) => ErrorCode::OperationAborted,
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(err) => write!(f, "protocol error: {err}"),
            Self::Validation(err) => write!(f, "validation failed: {err}"),
            Self::Storage(err) => write!(f, "storage error: {err}"),
            Self::Crypto(err) => write!(f, "crypto error: {err}"),
            Self::NotAuthenticated => write!(f, "session is not authenticated"),
            Self::AccessDenied(msg) => write!(f, "access denied: {msg}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::InvalidUsername(name) => write!(f, "invalid username: {name}"),
            Self::InvalidPid(pid) => write!(f, "invalid pid: {pid}"),
            Self::Tunnel(msg) => write!(f, "tunnel error: {msg}"),
            Self::UnknownMethod { protocol, method } => {
                write!(f, "no handler for protocol {protocol:#04x} method {method}")
            },
            Self::Timeout => write!(f, "handler timed out"),
            Self::Aborted(msg) => write!(f, "aborted: {msg}"),
        }
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Protocol(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::Crypto(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ProtocolError> for HandlerError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err)
    }
}

impl From<ValidationError> for HandlerError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

impl From<StorageError> for HandlerError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<CryptoError> for HandlerError {
    fn from(err: CryptoError) -> Self {
        Self::Crypto(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_the_table() {
        assert_eq!(HandlerError::Storage(StorageError::Io("x".into())).code().code(), 0x0004_0008);
        assert_eq!(HandlerError::Validation(ValidationError::NotAuthenticated { pid: 1 }).code().code(), 0x0003_0002);
        assert_eq!(HandlerError::Validation(ValidationError::Banned { pid: 1 }).code(), ErrorCode::AccessDenied);
        assert_eq!(HandlerError::Tunnel("bad".into()).code().code(), 0x0001_0001);
        assert_eq!(HandlerError::Crypto(CryptoError::TicketSignatureMismatch).code(), ErrorCode::EncryptionFailure);
        assert_eq!(HandlerError::Aborted("join".into()).code().code(), 0x0001_0004);
    }

    #[test]
    fn display() {
        let err = HandlerError::UnknownMethod { protocol: 0x15, method: 99 };
        assert_eq!(err.to_string(), "no handler for protocol 0x15 method 99");
        assert_eq!(HandlerError::InvalidPid(7).to_string(), "invalid pid: 7");
    }
}
