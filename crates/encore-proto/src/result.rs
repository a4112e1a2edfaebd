//! Typed result codes carried by RMC error responses.

use std::fmt;

/// Error code returned in the `error_code` slot of a failed RMC response.
///
/// The high half of the value names the category (Core, Authentication,
/// Runtime); the low half the specific condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    /// Unknown or generic failure
    Unknown = 0x0001_0001,
    /// Operation aborted
    OperationAborted = 0x0001_0004,
    /// Caller may not perform this operation
    AccessDenied = 0x0001_0006,
    /// Malformed or out-of-range parameter
    InvalidArgument = 0x0001_000A,
    /// Operation did not finish in time
    Timeout = 0x0001_000B,
    /// Server component failed to initialize
    InitializationFailure = 0x0001_000C,
    /// Caller has not authenticated
    NotAuthenticated = 0x0003_0002,
    /// Username rejected
    InvalidUsername = 0x0003_0064,
    /// Password rejected
    InvalidPassword = 0x0003_0066,
    /// Account disabled
    AccountDisabled = 0x0003_0067,
    /// Username already exists or account expired
    AccountExpired = 0x0003_0068,
    /// Another login for this account is active
    ConcurrentLoginDenied = 0x0003_0069,
    /// Ticket or payload could not be decrypted
    EncryptionFailure = 0x0003_006A,
    /// PID unknown or not owned by the caller
    InvalidPid = 0x0003_006B,
    /// Storage or internal failure
    OperationError = 0x0004_0008,
}

impl ErrorCode {
    /// Numeric wire value.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Look up a wire value.
    pub fn from_code(code: u32) -> Option<Self> {
        let known = [
            Self::Unknown,
            Self::OperationAborted,
            Self::AccessDenied,
            Self::InvalidArgument,
            Self::Timeout,
            Self::InitializationFailure,
            Self::NotAuthenticated,
            Self::InvalidUsername,
            Self::InvalidPassword,
            Self::AccountDisabled,
            Self::AccountExpired,
            Self::ConcurrentLoginDenied,
            Self::EncryptionFailure,
            Self::InvalidPid,
            Self::OperationError,
        ];
        known.into_iter().find(|c| c.code() == code)
    }

    /// Category name.
    pub const fn category(self) -> &'static str {
        match self.code() >> 16 {
            0x0001 => "Core",
            0x0003 => "Authentication",
            _ => "Runtime",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{:?} ({:#010x})", self.category(), self, self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_wire_values() {
        assert_eq!(ErrorCode::AccessDenied.code(), 0x0001_0006);
        assert_eq!(ErrorCode::InvalidPid.code(), 0x0003_006B);
        assert_eq!(ErrorCode::OperationError.code(), 0x0004_0008);
    }

    #[test]
    fn from_code_inverts_code() {
        for code in [0x0001_0001, 0x0003_0002, 0x0004_0008] {
            assert_eq!(ErrorCode::from_code(code).map(ErrorCode::code), Some(code));
        }
        assert_eq!(ErrorCode::from_code(0xDEAD), None);
    }

    #[test]
    fn display_names_category() {
        assert_eq!(ErrorCode::NotAuthenticated.to_string(), "Authentication::NotAuthenticated (0x00030002)");
        assert_eq!(ErrorCode::OperationError.to_string(), "Runtime::OperationError (0x00040008)");
    }
}
