//! Error types for api-worker
//!
//! This module defines the lifecycle and queue errors surfaced to callers.
//! Errors raised while processing a single request live in
//! [`crate::request::RequestError`] and never reach this type.

use thiserror::Error;

/// Main error type for worker operations
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The worker has shut its queue; no further entries are accepted
    #[error("Worker has stopped and no longer accepts entries")]
    Stopped,

    /// Invalid lifecycle transition (e.g. starting twice)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The worker thread did not terminate within the bounded wait
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The shared queue can no longer be used (a holder of its lock panicked)
    #[error("Queue corrupted: {0}")]
    QueueCorrupted(String),

    /// I/O errors (thread spawn, config file access)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias using WorkerError
pub type Result<T> = std::result::Result<T, WorkerError>;

impl From<serde_json::Error> for WorkerError {
    fn from(err: serde_json::Error) -> Self {
        WorkerError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for WorkerError {
    fn from(err: toml::de::Error) -> Self {
        WorkerError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopped_message() {
        assert_eq!(
            WorkerError::Stopped.to_string(),
            "Worker has stopped and no longer accepts entries"
        );
    }

    #[test]
    fn test_toml_error_maps_to_config() {
        let err: WorkerError = toml::from_str::<toml::Value>("= broken")
            .unwrap_err()
            .into();
        assert!(matches!(err, WorkerError::Config(_)));
    }
}
