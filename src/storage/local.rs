//! Local filesystem backend

use super::{relative_path, validate_path, FileStorage};
use crate::error::{NebenchatError, StorageResult};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Storage backed directly by the host filesystem
///
/// Relative paths resolve against `root`. Writes go to a temporary file in
/// the destination directory which is then renamed over the target, so a
/// reader never observes a partially written document.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create a backend rooted at `root`
    ///
    /// # Examples
    ///
    /// ```
    /// use nebenchat::storage::{FileStorage, LocalStorage};
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let storage = LocalStorage::new(dir.path());
    /// storage.write("notes/a.txt", "hello").unwrap();
    /// assert_eq!(storage.read("notes/a.txt").unwrap(), "hello");
    /// ```
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of this backend
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(relative_path(path))
    }
}

impl Default for LocalStorage {
    fn default() -> Self {
        Self::new(".")
    }
}

fn map_io(path: &str, err: std::io::Error) -> NebenchatError {
    match err.kind() {
        ErrorKind::NotFound => NebenchatError::NotFound(path.to_string()),
        _ => NebenchatError::storage_failure(path, err),
    }
}

impl FileStorage for LocalStorage {
    fn read(&self, path: &str) -> StorageResult<String> {
        validate_path(path)?;
        std::fs::read_to_string(self.full_path(path)).map_err(|e| map_io(path, e))
    }

    fn write(&self, path: &str, content: &str) -> StorageResult<()> {
        validate_path(path)?;
        let full_path = self.full_path(path);
        let dir = match full_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| NebenchatError::storage_failure(path, e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| NebenchatError::storage_failure(path, e))?;
        tmp.write_all(content.as_bytes())
            .and_then(|_| tmp.flush())
            .map_err(|e| NebenchatError::storage_failure(path, e))?;
        tmp.persist(&full_path)
            .map_err(|e| NebenchatError::storage_failure(path, e.error))?;

        tracing::debug!("Wrote {} bytes to {}", content.len(), full_path.display());
        Ok(())
    }

    fn remove(&self, path: &str) -> StorageResult<()> {
        validate_path(path)?;
        match std::fs::remove_file(self.full_path(path)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(NebenchatError::storage_failure(path, e)),
        }
    }

    fn exists(&self, path: &str) -> StorageResult<bool> {
        validate_path(path)?;
        Ok(self.full_path(path).exists())
    }

    fn make_dirs(&self, path: &str) -> StorageResult<()> {
        validate_path(path)?;
        std::fs::create_dir_all(self.full_path(path))
            .map_err(|e| NebenchatError::storage_failure(path, e))
    }

    fn list_dir(&self, path: &str) -> StorageResult<Vec<String>> {
        validate_path(path)?;
        list_entries(&self.full_path(path), path)
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}

/// Sorted entry names of a directory, shared with the git backend
pub(crate) fn list_entries(dir: &Path, path: &str) -> StorageResult<Vec<String>> {
    if !dir.exists() {
        return Err(NebenchatError::NotFound(path.to_string()));
    }
    if !dir.is_dir() {
        return Err(NebenchatError::NotADirectory(path.to_string()));
    }
    let mut names = std::fs::read_dir(dir)
        .map_err(|e| map_io(path, e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    names.sort();
    Ok(names)
}
