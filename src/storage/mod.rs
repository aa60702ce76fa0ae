//! Pluggable storage for chat history documents
//!
//! Every backend implements [`FileStorage`], a small path-oriented contract
//! (read, write, remove, exists, make_dirs, list_dir). The session store only
//! ever sees `Arc<dyn FileStorage>`; which implementation sits behind it is
//! decided once at start-up by [`factory::select_backend`].
//!
//! # Backends
//!
//! - [`LocalStorage`]: the host filesystem
//! - [`GitStorage`]: a cloned repository, one commit + push per mutation
//! - [`ApiStorage`]: a remote contents API with SHA-based optimistic locking
//!
//! # Contract
//!
//! - `read` fails with `NotFound` when the path is absent
//! - `write` creates parents and replaces content atomically
//! - `remove` of an absent path is a no-op on every backend
//! - `list_dir` fails with `NotFound` or `NotADirectory` and returns sorted names
//! - every operation rejects blank paths with `InvalidPath` before any I/O

use crate::error::{NebenchatError, StorageResult};

pub mod api;
pub mod factory;
pub mod git;
pub mod local;

pub use api::{ApiStorage, ContentsApi, ContentsEntry, GithubContentsClient, WriteOutcome};
pub use factory::{build_storage, select_backend, BackendSelection};
pub use git::{authenticated_url, GitCredentials, GitStorage};
pub use local::LocalStorage;

/// Uniform storage capability shared by all backends
///
/// Implementations must be safe to share across request threads.
pub trait FileStorage: Send + Sync {
    /// Read the full contents of `path` as UTF-8 text
    fn read(&self, path: &str) -> StorageResult<String>;

    /// Replace the contents of `path`, creating parent directories as needed
    fn write(&self, path: &str, content: &str) -> StorageResult<()>;

    /// Remove `path`; absent paths are a no-op
    fn remove(&self, path: &str) -> StorageResult<()>;

    /// Whether `path` exists
    fn exists(&self, path: &str) -> StorageResult<bool>;

    /// Recursively create `path` as a directory (idempotent)
    fn make_dirs(&self, path: &str) -> StorageResult<()>;

    /// Names of the entries directly under `path`, sorted
    fn list_dir(&self, path: &str) -> StorageResult<Vec<String>>;

    /// Short backend name used in logs
    fn backend_name(&self) -> &'static str;
}

/// Reject empty or whitespace-only paths
///
/// # Errors
///
/// Returns `NebenchatError::InvalidPath` for blank input
///
/// # Examples
///
/// ```
/// use nebenchat::storage::validate_path;
///
/// assert!(validate_path("chat_history_neben.json").is_ok());
/// assert!(validate_path("   ").is_err());
/// ```
pub fn validate_path(path: &str) -> StorageResult<()> {
    if path.trim().is_empty() {
        tracing::error!("Invalid file path: '{}'", path);
        return Err(NebenchatError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Strip leading separators so a path is relative to the backend root
pub(crate) fn relative_path(path: &str) -> &str {
    path.trim_start_matches('/')
}
