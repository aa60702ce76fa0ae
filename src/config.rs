//! Configuration management for NebenChat
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{NebenchatError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for NebenChat
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// History storage backend settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Session lifecycle policy
    #[serde(default)]
    pub sessions: SessionConfig,
    /// Vector store side-resource settings
    #[serde(default)]
    pub vector_stores: VectorStoreConfig,
}

/// Storage backend configuration
///
/// `backend` picks the implementation explicitly; `auto` lets the factory
/// decide from which credentials are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// One of `auto`, `local`, `api`, `git`
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Root directory for the local backend
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,

    /// Directory (relative to the backend root) holding history documents
    #[serde(default)]
    pub history_dir: String,

    /// Repository owner for the contents API
    #[serde(default)]
    pub repo_owner: Option<String>,

    /// Repository name for the contents API
    #[serde(default)]
    pub repo_name: Option<String>,

    /// Branch used by both remote backends
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Access token for the contents API and git pushes
    #[serde(default, skip_serializing)]
    pub token: Option<String>,

    /// Base URL of the contents API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Remote URL for the git backend
    #[serde(default)]
    pub git_url: Option<String>,

    /// Username paired with the token when injecting git credentials
    #[serde(default = "default_git_username")]
    pub git_username: String,

    /// Directory under which git working copies are cloned
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    /// Commit author name for the git backend
    #[serde(default = "default_author_name")]
    pub author_name: String,

    /// Commit author email for the git backend
    #[serde(default = "default_author_email")]
    pub author_email: String,

    /// Timeout for contents API reads and SHA lookups (seconds)
    #[serde(default = "default_read_timeout")]
    pub read_timeout_seconds: u64,

    /// Timeout for contents API writes and deletes (seconds)
    #[serde(default = "default_write_timeout")]
    pub write_timeout_seconds: u64,
}

fn default_backend() -> String {
    "auto".to_string()
}

fn default_local_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_git_username() -> String {
    "x-access-token".to_string()
}

fn default_author_name() -> String {
    "nebenchat".to_string()
}

fn default_author_email() -> String {
    "nebenchat@localhost".to_string()
}

fn default_read_timeout() -> u64 {
    10
}

fn default_write_timeout() -> u64 {
    30
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            local_root: default_local_root(),
            history_dir: String::new(),
            repo_owner: None,
            repo_name: None,
            branch: default_branch(),
            token: None,
            api_base: default_api_base(),
            git_url: None,
            git_username: default_git_username(),
            scratch_dir: None,
            author_name: default_author_name(),
            author_email: default_author_email(),
            read_timeout_seconds: default_read_timeout(),
            write_timeout_seconds: default_write_timeout(),
        }
    }
}

impl StorageConfig {
    /// Directory git working copies are cloned under.
    ///
    /// Falls back to the platform data directory, then the system temp dir.
    pub fn scratch_root(&self) -> PathBuf {
        if let Some(dir) = &self.scratch_dir {
            return dir.clone();
        }
        ProjectDirs::from("com", "nebenchat", "nebenchat")
            .map(|dirs| dirs.data_dir().join("git-storage"))
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Token with blank values treated as absent
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Session lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds of inactivity after which the next turn opens a new session
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,

    /// Number of sessions retained per user
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Number of turns retained per session
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Directory holding uploaded attachments
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,

    /// Directory holding generated files
    #[serde(default = "default_generated_dir")]
    pub generated_dir: PathBuf,
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_max_sessions() -> usize {
    10
}

fn default_max_turns() -> usize {
    10
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_generated_dir() -> PathBuf {
    PathBuf::from("generated_files")
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: default_idle_timeout(),
            max_sessions: default_max_sessions(),
            max_turns: default_max_turns(),
            uploads_dir: default_uploads_dir(),
            generated_dir: default_generated_dir(),
        }
    }
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// API key; vector stores are disabled when absent
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Base URL of the vector store API
    #[serde(default = "default_openai_base")]
    pub api_base: String,

    /// Request timeout (seconds)
    #[serde(default = "default_vector_timeout")]
    pub timeout_seconds: u64,
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_vector_timeout() -> u64 {
    30
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_openai_base(),
            timeout_seconds: default_vector_timeout(),
        }
    }
}

/// Backend names accepted by `storage.backend`
pub const VALID_BACKENDS: [&str; 4] = ["auto", "local", "api", "git"];

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| NebenchatError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| NebenchatError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(backend) = std::env::var("NEBENCHAT_STORAGE_BACKEND") {
            self.storage.backend = backend;
        }

        if let Ok(owner) = std::env::var("NEBENCHAT_REPO_OWNER") {
            self.storage.repo_owner = Some(owner);
        }

        if let Ok(name) = std::env::var("NEBENCHAT_REPO_NAME") {
            self.storage.repo_name = Some(name);
        }

        if let Ok(branch) = std::env::var("NEBENCHAT_REPO_BRANCH") {
            self.storage.branch = branch;
        }

        // GITHUB_TOKEN wins over the older GIT_STORAGE_TOKEN name
        if let Some(token) = std::env::var("GITHUB_TOKEN")
            .ok()
            .or_else(|| std::env::var("GIT_STORAGE_TOKEN").ok())
        {
            self.storage.token = Some(token);
        }

        if let Ok(git_url) = std::env::var("GIT_STORAGE") {
            self.storage.git_url = Some(git_url);
        }

        if let Ok(username) = std::env::var("NEBENCHAT_GIT_USERNAME") {
            self.storage.git_username = username;
        }

        if let Ok(dir) = std::env::var("NEBENCHAT_SCRATCH_DIR") {
            self.storage.scratch_dir = Some(PathBuf::from(dir));
        }

        if let Ok(root) = std::env::var("NEBENCHAT_LOCAL_ROOT") {
            self.storage.local_root = PathBuf::from(root);
        }

        if let Ok(dir) = std::env::var("NEBENCHAT_HISTORY_DIR") {
            self.storage.history_dir = dir;
        }

        if let Ok(timeout) = std::env::var("NEBENCHAT_IDLE_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.sessions.idle_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid NEBENCHAT_IDLE_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(max_sessions) = std::env::var("NEBENCHAT_MAX_SESSIONS") {
            if let Ok(value) = max_sessions.parse() {
                self.sessions.max_sessions = value;
            } else {
                tracing::warn!("Invalid NEBENCHAT_MAX_SESSIONS: {}", max_sessions);
            }
        }

        if let Ok(max_turns) = std::env::var("NEBENCHAT_MAX_TURNS") {
            if let Ok(value) = max_turns.parse() {
                self.sessions.max_turns = value;
            } else {
                tracing::warn!("Invalid NEBENCHAT_MAX_TURNS: {}", max_turns);
            }
        }

        if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
            self.vector_stores.api_key = Some(api_key);
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(backend) = &cli.backend {
            self.storage.backend = backend.clone();
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if !VALID_BACKENDS.contains(&self.storage.backend.as_str()) {
            return Err(NebenchatError::Config(format!(
                "Invalid storage backend: {}. Must be one of: {}",
                self.storage.backend,
                VALID_BACKENDS.join(", ")
            ))
            .into());
        }

        if self.storage.branch.trim().is_empty() {
            return Err(
                NebenchatError::Config("storage.branch cannot be empty".to_string()).into(),
            );
        }

        if self.storage.read_timeout_seconds == 0 || self.storage.write_timeout_seconds == 0 {
            return Err(NebenchatError::Config(
                "storage timeouts must be greater than 0".to_string(),
            )
            .into());
        }

        if self.sessions.idle_timeout_seconds == 0 {
            return Err(NebenchatError::Config(
                "sessions.idle_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.sessions.max_sessions == 0 {
            return Err(NebenchatError::Config(
                "sessions.max_sessions must be greater than 0".to_string(),
            )
            .into());
        }

        if self.sessions.max_turns == 0 {
            return Err(
                NebenchatError::Config("sessions.max_turns must be greater than 0".to_string())
                    .into(),
            );
        }

        Ok(())
    }
}
