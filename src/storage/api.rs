//! Contents-API storage with optimistic locking
//!
//! Files live in a remote repository and are read and written through its
//! REST contents endpoint. Every update must name the revision ("SHA") it
//! replaces; a stale SHA is answered with a conflict.
//!
//! [`ApiStorage`] owns the locking discipline (SHA cache, bounded retries)
//! and talks to the remote through the [`ContentsApi`] seam.
//! [`GithubContentsClient`] is the HTTP implementation of that seam.

use super::{relative_path, validate_path, FileStorage};
use crate::error::{NebenchatError, StorageResult};
use base64::Engine;
use metrics::increment_counter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Attempts made for one write or remove before giving up on conflicts
pub const MAX_ATTEMPTS: u32 = 3;

/// What the remote holds at a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentsEntry {
    /// A file with its revision and base64 payload as delivered
    File {
        /// Revision identifier
        sha: String,
        /// Base64 content, possibly wrapped with newlines; `None` when the
        /// API withholds the payload, as it does for files over its size limit
        content: Option<String>,
    },
    /// A directory with the names of its entries
    Directory(Vec<String>),
}

/// Body of an update or delete request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentsUpdate {
    /// Commit message
    pub message: String,
    /// Base64 content; absent for deletes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Revision being replaced; absent when creating
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

/// Result of a mutating request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Accepted; carries the new revision when the remote reports one
    Committed {
        /// Revision identifier after the change
        sha: Option<String>,
    },
    /// Rejected because the supplied revision is stale
    Conflict,
}

/// Transport seam for the remote contents endpoint
#[cfg_attr(test, mockall::automock)]
pub trait ContentsApi: Send + Sync {
    /// Fetch an entry; `Ok(None)` when the path does not exist
    fn get(&self, path: &str) -> StorageResult<Option<ContentsEntry>>;

    /// Create or update a file
    fn put(&self, path: &str, update: &ContentsUpdate) -> StorageResult<WriteOutcome>;

    /// Delete a file
    fn delete(&self, path: &str, update: &ContentsUpdate) -> StorageResult<WriteOutcome>;
}

/// Storage on top of a remote contents API
///
/// Caches the last known SHA per path so consecutive writes chain without a
/// lookup. `make_dirs` is a no-op because the remote has no empty directories.
pub struct ApiStorage<C = GithubContentsClient> {
    client: C,
    sha_cache: Mutex<HashMap<String, String>>,
}

impl<C: ContentsApi> ApiStorage<C> {
    /// Wrap a contents client
    pub fn new(client: C) -> Self {
        Self {
            client,
            sha_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Borrow the underlying client
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Last SHA recorded for `path`
    pub fn cached_sha(&self, path: &str) -> Option<String> {
        self.sha_cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(path).cloned())
    }

    fn remember_sha(&self, path: &str, sha: String) {
        if let Ok(mut cache) = self.sha_cache.lock() {
            cache.insert(path.to_string(), sha);
        }
    }

    fn forget_sha(&self, path: &str) {
        if let Ok(mut cache) = self.sha_cache.lock() {
            cache.remove(path);
        }
    }

    /// Ask the remote for the current SHA of `path`
    fn fresh_sha(&self, path: &str) -> StorageResult<Option<String>> {
        match self.client.get(path)? {
            Some(ContentsEntry::File { sha, .. }) => Ok(Some(sha)),
            Some(ContentsEntry::Directory(_)) | None => Ok(None),
        }
    }

    fn known_sha(&self, path: &str) -> StorageResult<Option<String>> {
        match self.cached_sha(path) {
            Some(sha) => Ok(Some(sha)),
            None => self.fresh_sha(path),
        }
    }

    fn exhausted(&self, path: &str, op: &str) -> NebenchatError {
        self.forget_sha(path);
        tracing::error!(
            "Failed to {} {} after {} attempts due to conflicts",
            op,
            path,
            MAX_ATTEMPTS
        );
        NebenchatError::ConflictExhausted {
            path: path.to_string(),
            attempts: MAX_ATTEMPTS,
        }
    }
}

fn decode_content(path: &str, encoded: &str) -> StorageResult<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| NebenchatError::storage_failure(path, e))?;
    String::from_utf8(bytes).map_err(|e| NebenchatError::storage_failure(path, e))
}

impl<C: ContentsApi> FileStorage for ApiStorage<C> {
    fn read(&self, path: &str) -> StorageResult<String> {
        validate_path(path)?;
        match self.client.get(path)? {
            None => Err(NebenchatError::NotFound(path.to_string())),
            Some(ContentsEntry::Directory(_)) => Err(NebenchatError::storage_message(
                path,
                "path is a directory, not a file",
            )),
            Some(ContentsEntry::File { sha, content }) => {
                self.remember_sha(path, sha);
                match content {
                    Some(content) => decode_content(path, &content),
                    None => Err(NebenchatError::storage_message(
                        path,
                        "contents API returned no inline content (file too large?)",
                    )),
                }
            }
        }
    }

    fn write(&self, path: &str, content: &str) -> StorageResult<()> {
        validate_path(path)?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(content.as_bytes());
        let mut sha = self.known_sha(path)?;

        for attempt in 1..=MAX_ATTEMPTS {
            let update = ContentsUpdate {
                message: format!("Update {}", path),
                content: Some(encoded.clone()),
                sha: sha.clone(),
            };
            match self.client.put(path, &update)? {
                WriteOutcome::Committed { sha: new_sha } => {
                    match new_sha {
                        Some(new_sha) => self.remember_sha(path, new_sha),
                        None => {
                            tracing::warn!("Write response for {} missing content sha", path);
                            self.forget_sha(path);
                        }
                    }
                    tracing::info!("Successfully wrote {} bytes to {}", content.len(), path);
                    return Ok(());
                }
                WriteOutcome::Conflict => {
                    increment_counter!("storage_conflicts_total", "op" => "write");
                    if attempt == MAX_ATTEMPTS {
                        break;
                    }
                    tracing::warn!(
                        "Conflict writing {}, retrying ({}/{}) with fresh SHA",
                        path,
                        attempt,
                        MAX_ATTEMPTS
                    );
                    // A vanished file is recreated on the next attempt
                    sha = self.fresh_sha(path)?;
                }
            }
        }

        Err(self.exhausted(path, "write"))
    }

    fn remove(&self, path: &str) -> StorageResult<()> {
        validate_path(path)?;
        let Some(mut sha) = self.known_sha(path)? else {
            tracing::warn!("Cannot delete {}: file not found or SHA unavailable", path);
            return Ok(());
        };

        for attempt in 1..=MAX_ATTEMPTS {
            let update = ContentsUpdate {
                message: format!("Remove {}", path),
                content: None,
                sha: Some(sha.clone()),
            };
            match self.client.delete(path, &update)? {
                WriteOutcome::Committed { .. } => {
                    self.forget_sha(path);
                    tracing::info!("Removed {}", path);
                    return Ok(());
                }
                WriteOutcome::Conflict => {
                    increment_counter!("storage_conflicts_total", "op" => "remove");
                    if attempt == MAX_ATTEMPTS {
                        break;
                    }
                    tracing::warn!(
                        "Conflict deleting {}, retrying ({}/{}) with fresh SHA",
                        path,
                        attempt,
                        MAX_ATTEMPTS
                    );
                    match self.fresh_sha(path)? {
                        Some(fresh) => sha = fresh,
                        None => {
                            tracing::warn!("File {} appears to have been deleted already", path);
                            self.forget_sha(path);
                            return Ok(());
                        }
                    }
                }
            }
        }

        Err(self.exhausted(path, "remove"))
    }

    fn exists(&self, path: &str) -> StorageResult<bool> {
        validate_path(path)?;
        Ok(self.client.get(path)?.is_some())
    }

    fn make_dirs(&self, path: &str) -> StorageResult<()> {
        validate_path(path)
    }

    fn list_dir(&self, path: &str) -> StorageResult<Vec<String>> {
        validate_path(path)?;
        match self.client.get(path)? {
            None => Err(NebenchatError::NotFound(path.to_string())),
            Some(ContentsEntry::File { .. }) => Err(NebenchatError::NotADirectory(path.to_string())),
            Some(ContentsEntry::Directory(mut names)) => {
                names.sort();
                Ok(names)
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "api"
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Listing(Vec<ListingItem>),
    File(FileItem),
}

#[derive(Deserialize)]
struct ListingItem {
    name: String,
}

#[derive(Deserialize)]
struct FileItem {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Deserialize)]
struct PutResponse {
    content: Option<PutResponseContent>,
}

#[derive(Deserialize)]
struct PutResponseContent {
    sha: Option<String>,
}

#[derive(Serialize)]
struct RequestBody<'a> {
    #[serde(flatten)]
    update: &'a ContentsUpdate,
    branch: &'a str,
}

/// Blocking HTTP client for the GitHub repository contents API
#[derive(Debug, Clone)]
pub struct GithubContentsClient {
    http: reqwest::blocking::Client,
    base_url: String,
    owner: String,
    repo: String,
    branch: String,
    token: Option<String>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl GithubContentsClient {
    /// Create a client for `owner/repo` at `branch`
    ///
    /// Without a token the repository is effectively read-only; a warning is
    /// logged but construction succeeds.
    ///
    /// # Errors
    ///
    /// Returns `NebenchatError::Config` if the HTTP client cannot be built
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        branch: impl Into<String>,
        token: Option<String>,
    ) -> StorageResult<Self> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(concat!("nebenchat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NebenchatError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let token = token.filter(|t| !t.trim().is_empty());
        if token.is_none() {
            tracing::warn!("GitHub API token missing; repository may be read-only");
        }

        Ok(Self {
            http,
            base_url: "https://api.github.com".to_string(),
            owner: owner.into(),
            repo: repo.into(),
            branch: branch.into(),
            token,
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(30),
        })
    }

    /// Point the client at another API root (GitHub Enterprise, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the per-call timeouts
    pub fn with_timeouts(mut self, read: Duration, write: Duration) -> Self {
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }

    /// Branch the client reads and commits to
    pub fn branch(&self) -> &str {
        &self.branch
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.base_url,
            self.owner,
            self.repo,
            relative_path(path)
        )
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        timeout: Duration,
    ) -> reqwest::blocking::RequestBuilder {
        let builder = self
            .http
            .request(method, self.contents_url(path))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .timeout(timeout);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn failure(path: &str, op: &str, response: reqwest::blocking::Response) -> NebenchatError {
        let status = response.status();
        let body = response.text().unwrap_or_default();
        let snippet: String = body.chars().take(500).collect();
        NebenchatError::storage_message(
            path,
            format!("{} failed with status {}: {}", op, status, snippet),
        )
    }
}

impl ContentsApi for GithubContentsClient {
    fn get(&self, path: &str) -> StorageResult<Option<ContentsEntry>> {
        let response = self
            .request(reqwest::Method::GET, path, self.read_timeout)
            .query(&[("ref", self.branch.as_str())])
            .send()
            .map_err(|e| NebenchatError::storage_failure(path, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::failure(path, "GET", response));
        }

        let parsed: ContentsResponse = response
            .json()
            .map_err(|e| NebenchatError::storage_failure(path, e))?;
        Ok(Some(match parsed {
            ContentsResponse::Listing(items) => {
                ContentsEntry::Directory(items.into_iter().map(|item| item.name).collect())
            }
            ContentsResponse::File(file) => {
                let inline = file.encoding.as_deref().map_or(true, |enc| enc == "base64");
                if !inline {
                    tracing::warn!(
                        "Contents API returned {} with encoding {:?}",
                        path,
                        file.encoding
                    );
                }
                ContentsEntry::File {
                    sha: file.sha,
                    content: inline.then_some(file.content),
                }
            }
        }))
    }

    fn put(&self, path: &str, update: &ContentsUpdate) -> StorageResult<WriteOutcome> {
        let body = RequestBody {
            update,
            branch: &self.branch,
        };
        let response = self
            .request(reqwest::Method::PUT, path, self.write_timeout)
            .json(&body)
            .send()
            .map_err(|e| NebenchatError::storage_failure(path, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::CONFLICT {
            return Ok(WriteOutcome::Conflict);
        }
        if !status.is_success() {
            return Err(Self::failure(path, "PUT", response));
        }

        let parsed: PutResponse = response
            .json()
            .map_err(|e| NebenchatError::storage_failure(path, e))?;
        Ok(WriteOutcome::Committed {
            sha: parsed.content.and_then(|c| c.sha),
        })
    }

    fn delete(&self, path: &str, update: &ContentsUpdate) -> StorageResult<WriteOutcome> {
        let body = RequestBody {
            update,
            branch: &self.branch,
        };
        let response = self
            .request(reqwest::Method::DELETE, path, self.write_timeout)
            .json(&body)
            .send()
            .map_err(|e| NebenchatError::storage_failure(path, e))?;

        let status = response.status();
        match status {
            reqwest::StatusCode::CONFLICT => Ok(WriteOutcome::Conflict),
            reqwest::StatusCode::NOT_FOUND => {
                tracing::debug!("DELETE {} returned 404; treating as removed", path);
                Ok(WriteOutcome::Committed { sha: None })
            }
            s if s.is_success() => Ok(WriteOutcome::Committed { sha: None }),
            _ => Err(Self::failure(path, "DELETE", response)),
        }
    }
}
