//! Error types for cardmill.

use thiserror::Error;

/// Result type alias using cardmill's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for cardmill operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Resource not found (task, page, or export target)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Structurally invalid input (fatal to the call, no partial work)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Authentication/authorization rejected by an external service
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Content source unreachable or rejected the request
    #[error("Content source error: {0}")]
    ContentSource(String),

    /// Summarizer provider failed (retryable at the call granularity)
    #[error("Summarizer error: {0}")]
    Summarizer(String),

    /// Export sink write failure (absorbed per-item by the pipeline)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Task store operation failed
    #[error("Store error: {0}")]
    Store(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("task abc".to_string());
        assert_eq!(err.to_string(), "Not found: task abc");
    }

    #[test]
    fn test_error_display_invalid_input() {
        let err = Error::InvalidInput("no content provided".to_string());
        assert_eq!(err.to_string(), "Invalid input: no content provided");
    }

    #[test]
    fn test_error_display_content_source() {
        let err = Error::ContentSource("page fetch failed".to_string());
        assert_eq!(err.to_string(), "Content source error: page fetch failed");
    }

    #[test]
    fn test_error_display_summarizer() {
        let err = Error::Summarizer("model timeout".to_string());
        assert_eq!(err.to_string(), "Summarizer error: model timeout");
    }

    #[test]
    fn test_error_display_storage() {
        let err = Error::Storage("disk full".to_string());
        assert_eq!(err.to_string(), "Storage error: disk full");
    }

    #[test]
    fn test_error_display_store() {
        let err = Error::Store("connection refused".to_string());
        assert_eq!(err.to_string(), "Store error: connection refused");
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("missing API key".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing API key");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
