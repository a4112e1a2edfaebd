//! Server error types.

use std::fmt;

use crate::storage::StorageError;

/// Errors that stop the server or one of its listeners.
#[derive(Debug)]
pub enum ServerError {
    /// Invalid runtime configuration. Raised at startup only.
    Config(String),

    /// A socket could not be bound or read. Per-client send failures are
    /// logged instead.
    Transport(String),

    /// The repository backend could not be opened.
    Storage(StorageError),

    /// A listener or the purge loop panicked.
    Internal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Storage(err) => write!(f, "storage error: {err}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for ServerError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_layer() {
        assert_eq!(ServerError::Config("bad port".into()).to_string(), "configuration error: bad port");

        let err = ServerError::from(StorageError::Io("disk full".into()));
        assert!(err.to_string().starts_with("storage error: "));
        assert!(std::error::Error::source(&err).is_some());
    }
}
