//! PRUDP reliable transport.
//!
//! [`Connection`] is a pure state machine: the driver hands it decoded
//! packets and clock readings, and executes the [`ConnectionAction`]s it
//! returns (send a packet, deliver a reassembled message, verify a ticket,
//! close). Checksums and datagram encoding stay with the driver.

mod connection;
pub mod fragment;
pub mod reliability;
pub mod signature;

use std::time::Duration;

pub use connection::{Connection, ConnectionAction, ConnectionState, ConnectPayload};

/// Largest DATA payload before fragmentation.
pub const DEFAULT_FRAGMENT_SIZE: usize = 750;

/// Maximum time without inbound traffic before the client is evicted.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// First retransmission delay; doubles on every attempt.
pub const DEFAULT_RETRANSMIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Send attempts for one reliable packet before the client is evicted.
pub const DEFAULT_MAX_RETRANSMITS: u32 = 5;

/// Out-of-order packets buffered ahead of the next expected sequence id.
pub const DEFAULT_REORDER_WINDOW: u16 = 64;

/// Connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Largest DATA payload per packet
    pub fragment_size: usize,
    /// Idle eviction threshold
    pub idle_timeout: Duration,
    /// Initial retransmission delay
    pub retransmit_timeout: Duration,
    /// Send attempts per reliable packet
    pub max_retransmits: u32,
    /// Reorder buffer size
    pub reorder_window: u16,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            retransmit_timeout: DEFAULT_RETRANSMIT_TIMEOUT,
            max_retransmits: DEFAULT_MAX_RETRANSMITS,
            reorder_window: DEFAULT_REORDER_WINDOW,
        }
    }
}
