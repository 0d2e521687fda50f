//! Error types for draft storage.

use thiserror::Error;

/// Whether a failed storage call is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network or server trouble; the same call may succeed later.
    Transient,
    /// Auth, permission, or malformed data; retrying will not help.
    Permanent,
}

/// Errors raised by [`crate::DraftStorePort`] implementations.
#[derive(Debug, Error)]
pub enum DraftError {
    #[error("transient storage error: {0}")]
    Transient(String),
    #[error("permanent storage error: {0}")]
    Permanent(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid session key: {0}")]
    InvalidKey(String),
}

impl DraftError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient(_) => ErrorKind::Transient,
            Self::Permanent(_) | Self::Serialization(_) | Self::InvalidKey(_) => {
                ErrorKind::Permanent
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl From<serde_json::Error> for DraftError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// Convenience result type for draft storage operations.
pub type DraftResult<T> = Result<T, DraftError>;
