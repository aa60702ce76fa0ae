//! Files referenced by turns
//!
//! Uploads are stored as `<uploads_dir>/<user>_<unix ts>_<file name>` and
//! generated files as `<generated_dir>/<user>_<unix ts>_<file name>`. When a
//! turn leaves the history its files are deleted.

use super::types::{ChatSession, ChatTurn};
use crate::config::SessionConfig;
use glob::Pattern;
use std::path::{Component, Path, PathBuf};

/// Deletes the files belonging to evicted turns
#[derive(Debug, Clone)]
pub struct AttachmentJanitor {
    uploads_dir: PathBuf,
    generated_dir: PathBuf,
}

impl Default for AttachmentJanitor {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

impl AttachmentJanitor {
    /// Janitor for the given directories
    pub fn new(uploads_dir: impl Into<PathBuf>, generated_dir: impl Into<PathBuf>) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
            generated_dir: generated_dir.into(),
        }
    }

    /// Janitor for the directories named in `config`
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.uploads_dir.clone(), config.generated_dir.clone())
    }

    /// Where an upload received at `unix_ts` is stored
    pub fn upload_path(&self, user: &str, unix_ts: i64, file_name: &str) -> PathBuf {
        self.uploads_dir
            .join(format!("{}_{}_{}", user, unix_ts, file_name))
    }

    /// Where a file generated at `unix_ts` is stored
    pub fn generated_path(&self, user: &str, unix_ts: i64, file_name: &str) -> PathBuf {
        self.generated_dir
            .join(format!("{}_{}_{}", user, unix_ts, file_name))
    }

    /// Delete the files of one turn, returning how many were removed
    pub fn cleanup_turn(&self, user: &str, turn: &ChatTurn) -> usize {
        let mut removed = 0;

        if turn.has_file {
            if let Some(file_name) = turn.file_name.as_deref() {
                removed += self.remove_uploads(user, file_name);
            }
        }

        if let Some(generated) = turn.generated_file.as_deref() {
            removed += self.remove_generated(Path::new(generated));
        }

        removed
    }

    /// Delete the files of every turn in `session`
    pub fn cleanup_session(&self, user: &str, session: &ChatSession) -> usize {
        session
            .exchanges
            .iter()
            .map(|turn| self.cleanup_turn(user, turn))
            .sum()
    }

    fn remove_uploads(&self, user: &str, file_name: &str) -> usize {
        let pattern = format!(
            "{}/{}_*_{}",
            Pattern::escape(&self.uploads_dir.to_string_lossy()),
            Pattern::escape(user),
            Pattern::escape(file_name)
        );

        let paths = match glob::glob(&pattern) {
            Ok(paths) => paths,
            Err(e) => {
                tracing::error!("Invalid upload pattern {}: {}", pattern, e);
                return 0;
            }
        };

        let mut removed = 0;
        for entry in paths {
            match entry {
                Ok(path) => match std::fs::remove_file(&path) {
                    Ok(()) => {
                        tracing::info!("Cleaned up file: {}", path.display());
                        removed += 1;
                    }
                    Err(e) => tracing::error!("Error removing file {}: {}", path.display(), e),
                },
                Err(e) => tracing::error!("Error reading upload entry: {}", e),
            }
        }
        removed
    }

    /// `starts_with` compares components, so `..` must be rejected separately
    fn inside_generated_dir(&self, path: &Path) -> bool {
        path.starts_with(&self.generated_dir)
            && !path
                .components()
                .any(|component| matches!(component, Component::ParentDir))
    }

    fn remove_generated(&self, path: &Path) -> usize {
        if !self.inside_generated_dir(path) {
            tracing::warn!(
                "Skipping generated file outside {}: {}",
                self.generated_dir.display(),
                path.display()
            );
            return 0;
        }
        match std::fs::remove_file(path) {
            Ok(()) => {
                tracing::info!("Cleaned up generated file: {}", path.display());
                1
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => {
                tracing::error!("Error removing file {}: {}", path.display(), e);
                0
            }
        }
    }
}
