//! Common error types for stowage.

use thiserror::Error;

/// Top-level error type for storage operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or unparsable `cloud://` address.
    #[error("Invalid cloud URI: {0}")]
    InvalidUri(String),

    /// No registry entry exists for the requested provider id or type.
    #[error("No provider configured: {0}")]
    ProviderNotConfigured(String),

    /// Backend operation failed (quota, protocol, worker-reported failure).
    #[error("Backend error: {0}")]
    Backend(String),

    /// Backend rejected the supplied credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Transient network failure.
    #[error("Network error: {0}")]
    Network(String),

    /// External worker did not finish before its deadline.
    #[error("Worker operation '{operation}' timed out after {timeout_secs}s")]
    BridgeTimeout {
        /// Worker operation that timed out.
        operation: String,
        /// Deadline that was exceeded.
        timeout_secs: u64,
    },

    /// External worker failed without a usable response.
    #[error("Worker error: {0}")]
    Bridge(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

impl Error {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Io(_) | Error::BridgeTimeout { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::Network("reset".to_string()).is_transient());
        assert!(Error::BridgeTimeout {
            operation: "list".to_string(),
            timeout_secs: 30
        }
        .is_transient());
        assert!(!Error::NotFound("x".to_string()).is_transient());
        assert!(!Error::ProviderNotConfigured("s3".to_string()).is_transient());
    }

    #[test]
    fn test_timeout_message() {
        let err = Error::BridgeTimeout {
            operation: "mkdir".to_string(),
            timeout_secs: 20,
        };
        assert_eq!(err.to_string(), "Worker operation 'mkdir' timed out after 20s");
    }
}
