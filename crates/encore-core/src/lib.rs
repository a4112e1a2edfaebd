//! Encore core logic.
//!
//! Everything between the socket and the repository that can be expressed
//! without I/O: the PRUDP connection state machine, per-client session state,
//! the message store, gathering rules and the validation predicates. Time and
//! randomness come from an [`Environment`] so the whole layer runs under
//! deterministic tests.
//!
//! # Connection Lifecycle
//!
//! ```text
//! ┌────────┐  SYN   ┌─────────────┐ CONNECT ┌────────────────┐ accept ┌───────────┐
//! │ Listen │───────>│ SynReceived │────────>│ ConnectPending │───────>│ Connected │
//! └────────┘        └─────────────┘         └────────────────┘        └───────────┘
//!                          │      auth endpoint: no ticket                 ^  │
//!                          └───────────────────────────────────────────────┘  │
//!                                              DISCONNECT / timeout / retries │
//!                                                                             v
//!                                                                       ┌────────┐
//!                                                                       │ Closed │
//!                                                                       └────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod env;
pub mod error;
pub mod gathering;
pub mod master_user;
pub mod message_store;
pub mod pid_stack;
pub mod platform;
pub mod prudp;
pub mod session;
pub mod validation;

pub use env::Environment;
pub use error::ConnectionError;
pub use gathering::Gathering;
pub use message_store::{MessageStore, NewMessage, StoredMessage};
pub use pid_stack::PidStack;
pub use platform::{AccessKey, Platform};
pub use prudp::{Connection, ConnectionAction, ConnectionConfig, ConnectionState};
pub use session::{Endpoint, SessionState};
pub use validation::ValidationError;
