//! Error types for the PRUDP connection state machine.
//!
//! Inbound packets that fail verification are reported as errors so the
//! driver can log and drop them; none of them tear the connection down on
//! their own.

use std::time::Duration;

use encore_crypto::CryptoError;
use encore_proto::{PacketType, ProtocolError};
use thiserror::Error;

use crate::prudp::ConnectionState;

/// Errors from connection state machine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Operation not valid in the current state
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// State when the error occurred
        state: ConnectionState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Packet type not expected in the current state
    #[error("unexpected {packet_type:?} packet in state {state:?}")]
    UnexpectedPacket {
        /// State when the packet arrived
        state: ConnectionState,
        /// Type of the packet
        packet_type: PacketType,
    },

    /// Packet signature did not verify
    #[error("bad signature: expected {expected:#010x}, got {actual:#010x}")]
    BadSignature {
        /// Signature we computed
        expected: u32,
        /// Signature on the packet
        actual: u32,
    },

    /// Session id differs from the one chosen at SYN
    #[error("session id mismatch: expected {expected}, got {actual}")]
    SessionMismatch {
        /// Session id from the SYN
        expected: u8,
        /// Session id on the packet
        actual: u8,
    },

    /// Secure CONNECT payload could not be parsed
    #[error("malformed connect payload: {0}")]
    MalformedConnect(String),

    /// Reassembled message would exceed the size cap
    #[error("fragmented message exceeds {max} bytes")]
    MessageTooLarge {
        /// Size cap
        max: usize,
    },

    /// No activity within the idle timeout
    #[error("idle timeout after {elapsed:?}")]
    IdleTimeout {
        /// Time since last activity
        elapsed: Duration,
    },

    /// Reliable packet unacknowledged after the retransmit cap
    #[error("packet {sequence_id} unacknowledged after {attempts} attempts")]
    RetransmitExhausted {
        /// Sequence id of the packet
        sequence_id: u16,
        /// Send attempts made
        attempts: u32,
    },

    /// Wire format error
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Cipher or ticket error
    #[error("crypto error: {0}")]
    Crypto(String),
}

impl ConnectionError {
    /// True if the connection must be closed because of this error.
    ///
    /// Verification failures on single packets are not fatal: the packet is
    /// dropped and the peer may retransmit.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::IdleTimeout { .. } | Self::RetransmitExhausted { .. } | Self::MessageTooLarge { .. }
        )
    }
}

impl From<ProtocolError> for ConnectionError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<CryptoError> for ConnectionError {
    fn from(err: CryptoError) -> Self {
        Self::Crypto(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_and_exhaustion_are_fatal() {
        assert!(ConnectionError::IdleTimeout { elapsed: Duration::from_secs(61) }.is_fatal());
        assert!(ConnectionError::RetransmitExhausted { sequence_id: 3, attempts: 5 }.is_fatal());
    }

    #[test]
    fn verification_failures_are_not_fatal() {
        assert!(!ConnectionError::BadSignature { expected: 1, actual: 2 }.is_fatal());
        assert!(!ConnectionError::SessionMismatch { expected: 1, actual: 2 }.is_fatal());
        assert!(
            !ConnectionError::UnexpectedPacket { state: ConnectionState::Listen, packet_type: PacketType::Data }
                .is_fatal()
        );
        assert!(!ConnectionError::Protocol("bad".to_string()).is_fatal());
    }
}
