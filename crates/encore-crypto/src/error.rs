//! Crypto errors.

use thiserror::Error;

/// Errors from ticket and cipher operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// RC4 needs at least one key byte
    #[error("cipher key is empty")]
    EmptyKey,

    /// Ticket is too short to hold a body and MAC
    #[error("ticket too short: {len} bytes, need at least {min}")]
    TicketTooShort {
        /// Bytes received
        len: usize,
        /// Smallest well-formed ticket
        min: usize,
    },

    /// HMAC over the encrypted body did not verify
    #[error("ticket signature mismatch")]
    TicketSignatureMismatch,

    /// Decrypted ticket body is structurally wrong
    #[error("malformed ticket: {0}")]
    MalformedTicket(String),
}
