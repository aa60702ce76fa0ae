//! Backend selection and construction
//!
//! Selection is a pure function of [`StorageConfig`] so it can be tested
//! without touching the network. Construction happens once at start-up and
//! hands out a shared `Arc<dyn FileStorage>`.

use super::{ApiStorage, FileStorage, GitCredentials, GitStorage, GithubContentsClient, LocalStorage};
use crate::config::StorageConfig;
use crate::error::{NebenchatError, StorageResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Backend chosen from configuration, with everything needed to build it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSelection {
    /// Host filesystem rooted at `root`
    Local {
        /// Base directory
        root: PathBuf,
    },
    /// Remote contents API
    Api {
        /// Repository owner
        owner: String,
        /// Repository name
        repo: String,
        /// Branch to read and commit to
        branch: String,
        /// Bearer token, if any
        token: Option<String>,
        /// API root
        api_base: String,
        /// Timeout for reads and SHA lookups
        read_timeout: Duration,
        /// Timeout for writes and deletes
        write_timeout: Duration,
    },
    /// Cloned git repository
    Git {
        /// Remote URL as configured (without injected credentials)
        url: String,
        /// Branch to clone and push
        branch: String,
        /// Credentials injected into HTTP remotes
        credentials: Option<GitCredentials>,
        /// Directory the working copy is cloned under
        scratch_root: PathBuf,
        /// Commit author name
        author_name: String,
        /// Commit author email
        author_email: String,
    },
}

impl BackendSelection {
    /// Short backend name, matching [`FileStorage::backend_name`]
    pub fn kind(&self) -> &'static str {
        match self {
            BackendSelection::Local { .. } => "local",
            BackendSelection::Api { .. } => "api",
            BackendSelection::Git { .. } => "git",
        }
    }
}

impl std::fmt::Display for BackendSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendSelection::Local { root } => write!(f, "local ({})", root.display()),
            BackendSelection::Api {
                owner,
                repo,
                branch,
                token,
                ..
            } => write!(
                f,
                "api ({}/{}@{}, {})",
                owner,
                repo,
                branch,
                if token.is_some() { "token" } else { "anonymous" }
            ),
            BackendSelection::Git { url, branch, .. } => write!(f, "git ({}@{})", url, branch),
        }
    }
}

fn required(value: &Option<String>, key: &str) -> StorageResult<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(NebenchatError::Config(format!(
            "storage.{} is required for the api backend",
            key
        ))),
    }
}

fn select_api(config: &StorageConfig) -> StorageResult<BackendSelection> {
    Ok(BackendSelection::Api {
        owner: required(&config.repo_owner, "repo_owner")?,
        repo: required(&config.repo_name, "repo_name")?,
        branch: config.branch.clone(),
        token: config.token().map(str::to_string),
        api_base: config.api_base.clone(),
        read_timeout: Duration::from_secs(config.read_timeout_seconds),
        write_timeout: Duration::from_secs(config.write_timeout_seconds),
    })
}

fn select_git(config: &StorageConfig) -> StorageResult<BackendSelection> {
    let url = config
        .git_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| {
            NebenchatError::Config("storage.git_url is required for the git backend".to_string())
        })?;
    Ok(BackendSelection::Git {
        url: url.to_string(),
        branch: config.branch.clone(),
        credentials: config.token().map(|token| GitCredentials {
            username: config.git_username.clone(),
            token: token.to_string(),
        }),
        scratch_root: config.scratch_root(),
        author_name: config.author_name.clone(),
        author_email: config.author_email.clone(),
    })
}

/// Decide which backend the configuration asks for
///
/// An explicit `backend` wins. Under `auto` a token selects the contents
/// API, unless only a git URL is configured alongside it; otherwise a git URL
/// selects the git backend, and the local filesystem is the fallback. A token
/// under `auto` without both `repo_owner` and `repo_name` also falls back to
/// local, with a warning.
///
/// # Errors
///
/// Returns `NebenchatError::Config` for unknown backend names and for explicit
/// api or git selections missing their required settings
///
/// # Examples
///
/// ```
/// use nebenchat::config::StorageConfig;
/// use nebenchat::storage::select_backend;
///
/// let selection = select_backend(&StorageConfig::default()).unwrap();
/// assert_eq!(selection.kind(), "local");
/// ```
pub fn select_backend(config: &StorageConfig) -> StorageResult<BackendSelection> {
    let has_repo = config.repo_owner.is_some() || config.repo_name.is_some();
    let has_git_url = config
        .git_url
        .as_deref()
        .is_some_and(|u| !u.trim().is_empty());

    let selection = match config.backend.as_str() {
        "local" => BackendSelection::Local {
            root: config.local_root.clone(),
        },
        "api" => select_api(config)?,
        "git" => select_git(config)?,
        "auto" => {
            if config.token().is_some() && (has_repo || !has_git_url) {
                match select_api(config) {
                    Ok(selection) => selection,
                    Err(e) => {
                        tracing::warn!(
                            "Token configured but contents API settings incomplete ({}); using local storage",
                            e
                        );
                        BackendSelection::Local {
                            root: config.local_root.clone(),
                        }
                    }
                }
            } else if has_git_url {
                select_git(config)?
            } else {
                BackendSelection::Local {
                    root: config.local_root.clone(),
                }
            }
        }
        other => {
            return Err(NebenchatError::Config(format!(
                "Unknown storage backend: {}",
                other
            )))
        }
    };

    tracing::debug!("Selected storage backend: {}", selection);
    Ok(selection)
}

/// Construct the selected backend
///
/// The git backend clones eagerly, so this may block on the network.
///
/// # Errors
///
/// Returns `Config` if the HTTP client cannot be built and `StorageFailure`
/// if the git clone fails
pub fn build_storage(selection: &BackendSelection) -> StorageResult<Arc<dyn FileStorage>> {
    let storage: Arc<dyn FileStorage> = match selection {
        BackendSelection::Local { root } => Arc::new(LocalStorage::new(root.clone())),
        BackendSelection::Api {
            owner,
            repo,
            branch,
            token,
            api_base,
            read_timeout,
            write_timeout,
        } => {
            let client = GithubContentsClient::new(
                owner.clone(),
                repo.clone(),
                branch.clone(),
                token.clone(),
            )?
            .with_base_url(api_base.clone())
            .with_timeouts(*read_timeout, *write_timeout);
            Arc::new(ApiStorage::new(client))
        }
        BackendSelection::Git {
            url,
            branch,
            credentials,
            scratch_root,
            author_name,
            author_email,
        } => Arc::new(
            GitStorage::clone_into(url, branch, credentials.as_ref(), scratch_root)?
                .with_author(author_name.clone(), author_email.clone()),
        ),
    };

    tracing::info!("Using {} storage backend", storage.backend_name());
    Ok(storage)
}
