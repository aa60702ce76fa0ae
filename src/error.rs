//! Error types for NebenChat
//!
//! This module defines all error types used throughout the crate,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Boxed cause carried by transport failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for NebenChat operations
///
/// Storage backends and the session store return these variants directly so
/// callers can match on them; application code wraps them in `anyhow`.
#[derive(Error, Debug)]
pub enum NebenchatError {
    /// Empty or otherwise unusable path, rejected before any I/O
    #[error("Invalid path: '{0}'")]
    InvalidPath(String),

    /// Target path does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Target path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// Underlying transport (filesystem, git remote, contents API) failed
    #[error("Storage failure for {path}: {source}")]
    StorageFailure {
        /// Path the operation was acting on
        path: String,
        /// Root cause reported by the transport
        #[source]
        source: BoxError,
    },

    /// Every attempt of an optimistic-locking write hit a revision mismatch
    #[error("Conflict retries exhausted for {path} after {attempts} attempts")]
    ConflictExhausted {
        /// Path the operation was acting on
        path: String,
        /// Number of attempts made
        attempts: u32,
    },

    /// No session with the given identifier exists for the user
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Remote vector store calls failed
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl NebenchatError {
    /// Build a `StorageFailure`, logging it with its path first.
    pub fn storage_failure(path: impl Into<String>, source: impl Into<BoxError>) -> Self {
        let path = path.into();
        let source = source.into();
        tracing::error!(path = %path, error = %source, "storage operation failed");
        Self::StorageFailure { path, source }
    }

    /// Build a `StorageFailure` from a plain message.
    pub fn storage_message(path: impl Into<String>, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::storage_failure(path, message)
    }

    /// True for `StorageFailure` and its `ConflictExhausted` specialization.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            Self::StorageFailure { .. } | Self::ConflictExhausted { .. }
        )
    }
}

/// Result type for storage backends and the session store
pub type StorageResult<T> = std::result::Result<T, NebenchatError>;

/// Result type alias for application-level operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_path_display() {
        let error = NebenchatError::InvalidPath("  ".to_string());
        assert_eq!(error.to_string(), "Invalid path: '  '");
    }

    #[test]
    fn test_not_found_display() {
        let error = NebenchatError::NotFound("chat_history_neben.json".to_string());
        assert_eq!(error.to_string(), "Not found: chat_history_neben.json");
    }

    #[test]
    fn test_storage_failure_display_includes_path_and_cause() {
        let error = NebenchatError::storage_message("history/a.json", "push rejected");
        let s = error.to_string();
        assert!(s.contains("history/a.json"));
        assert!(s.contains("push rejected"));
        assert!(error.is_storage_failure());
    }

    #[test]
    fn test_storage_failure_keeps_source() {
        let io_error = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let error = NebenchatError::storage_failure("a.json", io_error);
        let source = std::error::Error::source(&error).expect("source present");
        assert_eq!(source.to_string(), "disk gone");
    }

    #[test]
    fn test_conflict_exhausted_is_storage_failure() {
        let error = NebenchatError::ConflictExhausted {
            path: "a.json".to_string(),
            attempts: 3,
        };
        assert!(error.is_storage_failure());
        assert!(error.to_string().contains("3 attempts"));
    }

    #[test]
    fn test_not_found_is_not_storage_failure() {
        assert!(!NebenchatError::NotFound("x".into()).is_storage_failure());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: NebenchatError = io_error.into();
        assert!(matches!(error, NebenchatError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let error: NebenchatError = json_error.into();
        assert!(matches!(error, NebenchatError::Serialization(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NebenchatError>();
    }
}
