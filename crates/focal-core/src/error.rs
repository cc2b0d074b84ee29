//! Error types for focal-core

use thiserror::Error;

/// Result type alias using focal-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in focal-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Caller is not authenticated
    #[error("Authentication required: {0}")]
    Auth(String),

    /// Transport-level failure (includes timeouts)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Remote endpoint returned a non-success response
    #[error("Remote rejected request ({status}): {message}")]
    Remote { status: u16, message: String },

    /// Invalid input
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Conflict resolution failure
    #[error("Conflict resolution failed: {0}")]
    Conflict(String),

    /// Batch metadata sync failure (atomic per batch)
    #[error("Batch metadata sync failed: {0}")]
    BatchSync(String),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A sync session is already running
    #[error("A sync session is already active: {0}")]
    SessionActive(String),
}

impl Error {
    /// Whether a failed operation carrying this error is eligible for
    /// retry with backoff. Only transport and remote-rejection failures
    /// qualify; everything else propagates on first failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Remote { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_are_retryable() {
        let error = Error::Remote {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert!(error.is_retryable());
    }

    #[test]
    fn caller_errors_are_not_retryable() {
        assert!(!Error::Auth("no session".to_string()).is_retryable());
        assert!(!Error::Validation("empty batch".to_string()).is_retryable());
        assert!(!Error::Conflict("manual".to_string()).is_retryable());
        assert!(!Error::BatchSync("2 entries rejected".to_string()).is_retryable());
    }
}
