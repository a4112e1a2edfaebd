//! Storage error types.
//!
//! - `NotFound`: a record the caller required does not exist
//! - `Conflict`: a unique key is already taken
//! - `Serialization`: a stored value could not be encoded or decoded
//! - `Io`: the backend failed

use thiserror::Error;

use super::Collection;

/// Errors that can occur during storage operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Record not found
    #[error("{collection:?} record not found: {key}")]
    NotFound {
        /// Collection searched
        collection: Collection,
        /// Key that was not found
        key: String,
    },

    /// Unique key already taken
    #[error("{collection:?} key already exists: {key}")]
    Conflict {
        /// Collection written
        collection: Collection,
        /// Key that collided
        key: String,
    },

    /// Serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error (file system, database, etc.)
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
