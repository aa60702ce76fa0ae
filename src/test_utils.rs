//! Test utilities for NebenChat
//!
//! This module provides common test utilities: temporary stores backed by the
//! local filesystem, turn builders, and assertion helpers.

use crate::error::NebenchatError;
use crate::session::{AttachmentJanitor, ChatTurn, SessionStore, VectorStores};
use crate::storage::LocalStorage;
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Create a temporary directory for testing
///
/// # Returns
///
/// Returns a TempDir that will be cleaned up when dropped
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Session store over a fresh temporary directory
///
/// Documents live under `<tmp>/data`; uploads and generated files under
/// `<tmp>/uploads` and `<tmp>/generated_files`.
pub fn temp_session_store(vector_stores: Arc<dyn VectorStores>) -> (SessionStore, TempDir) {
    let dir = temp_dir();
    let storage = Arc::new(LocalStorage::new(dir.path().join("data")));
    let janitor = AttachmentJanitor::new(
        dir.path().join("uploads"),
        dir.path().join("generated_files"),
    );
    (
        SessionStore::new(storage, vector_stores).with_janitor(janitor),
        dir,
    )
}

/// Create an upload file the way the upload route names it
///
/// # Panics
///
/// Panics if file creation or writing fails
pub fn create_upload(dir: &TempDir, user: &str, unix_ts: i64, file_name: &str) -> PathBuf {
    let path = dir
        .path()
        .join("uploads")
        .join(format!("{}_{}_{}", user, unix_ts, file_name));
    std::fs::create_dir_all(path.parent().expect("upload path has a parent"))
        .expect("Failed to create uploads directory");
    std::fs::write(&path, b"upload").expect("Failed to write upload");
    path
}

/// Plain text turn answering `message` with `re: <message>`
pub fn text_turn(now: DateTime<Local>, message: &str) -> ChatTurn {
    ChatTurn::text(now, "gpt-5", message, format!("re: {message}"), "")
}

/// Assert that an error contains the expected message
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected message
pub fn assert_error_contains<T>(result: Result<T, NebenchatError>, expected: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{}' but got Ok", expected),
        Err(e) => {
            let error_msg = e.to_string();
            assert!(
                error_msg.contains(expected),
                "Error message '{}' does not contain '{}'",
                error_msg,
                expected
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::NoVectorStores;

    #[test]
    fn test_temp_session_store_starts_empty() {
        let (store, _dir) = temp_session_store(Arc::new(NoVectorStores));
        assert!(store.load("neben").unwrap().is_empty());
    }

    #[test]
    fn test_create_upload_uses_upload_naming() {
        let dir = temp_dir();
        let path = create_upload(&dir, "neben", 1700000000, "a.png");
        assert!(path.ends_with("uploads/neben_1700000000_a.png"));
        assert!(path.exists());
    }

    #[test]
    fn test_assert_error_contains_success() {
        let result: Result<(), NebenchatError> =
            Err(NebenchatError::Config("test error message".to_string()));
        assert_error_contains(result, "test error");
    }

    #[test]
    #[should_panic(expected = "Expected error containing")]
    fn test_assert_error_contains_ok() {
        let result: Result<(), NebenchatError> = Ok(());
        assert_error_contains(result, "error");
    }

    #[test]
    #[should_panic(expected = "does not contain")]
    fn test_assert_error_contains_wrong_message() {
        let result: Result<(), NebenchatError> =
            Err(NebenchatError::Config("different error".to_string()));
        assert_error_contains(result, "not present");
    }
}
