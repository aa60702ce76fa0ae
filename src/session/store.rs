//! Per-user session persistence over a [`FileStorage`] backend
//!
//! The store keeps no cache: every operation reads the user's whole document,
//! changes it in memory and writes it back. Storage is the only point of
//! synchronization between concurrent requests.

use super::attachments::AttachmentJanitor;
use super::document::{to_json, HistoryDocument};
use super::side_resources::VectorStores;
use super::types::{ChatSession, ChatTurn, SessionCollection, MAX_SESSIONS, MAX_TURNS};
use crate::config::{Config, SessionConfig};
use crate::error::{NebenchatError, StorageResult};
use crate::storage::FileStorage;
use chrono::{DateTime, Duration, Local};
use metrics::{counter, increment_counter};
use std::sync::Arc;

/// Retention caps and idle threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Sessions kept per user
    pub max_sessions: usize,
    /// Turns kept per session
    pub max_turns: usize,
    /// Inactivity after which the next turn opens a new session
    pub idle_timeout: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_sessions: MAX_SESSIONS,
            max_turns: MAX_TURNS,
            idle_timeout: Duration::seconds(600),
        }
    }
}

impl From<&SessionConfig> for SessionPolicy {
    fn from(config: &SessionConfig) -> Self {
        Self {
            max_sessions: config.max_sessions,
            max_turns: config.max_turns,
            idle_timeout: Duration::seconds(
                config.idle_timeout_seconds.min((i64::MAX / 1000) as u64) as i64,
            ),
        }
    }
}

/// Reject user ids that would escape the history directory
///
/// # Errors
///
/// Returns `NebenchatError::InvalidPath` for empty ids and ids containing
/// `/`, `\` or `..`
pub fn validate_user(user: &str) -> StorageResult<()> {
    if user.trim().is_empty() || user.contains('/') || user.contains('\\') || user.contains("..") {
        tracing::error!("Invalid user id: '{}'", user);
        return Err(NebenchatError::InvalidPath(user.to_string()));
    }
    Ok(())
}

/// Session lifecycle for every user, persisted as one document per user
pub struct SessionStore {
    storage: Arc<dyn FileStorage>,
    vector_stores: Arc<dyn VectorStores>,
    janitor: AttachmentJanitor,
    policy: SessionPolicy,
    history_dir: String,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("backend", &self.storage.backend_name())
            .field("policy", &self.policy)
            .field("history_dir", &self.history_dir)
            .finish()
    }
}

impl SessionStore {
    /// Store with default policy, default attachment directories and
    /// documents at the backend root
    pub fn new(storage: Arc<dyn FileStorage>, vector_stores: Arc<dyn VectorStores>) -> Self {
        Self {
            storage,
            vector_stores,
            janitor: AttachmentJanitor::default(),
            policy: SessionPolicy::default(),
            history_dir: String::new(),
        }
    }

    /// Store configured from `config`
    pub fn from_config(
        storage: Arc<dyn FileStorage>,
        vector_stores: Arc<dyn VectorStores>,
        config: &Config,
    ) -> Self {
        Self::new(storage, vector_stores)
            .with_policy(SessionPolicy::from(&config.sessions))
            .with_janitor(AttachmentJanitor::from_config(&config.sessions))
            .with_history_dir(config.storage.history_dir.clone())
    }

    /// Replace the retention policy
    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the attachment janitor
    pub fn with_janitor(mut self, janitor: AttachmentJanitor) -> Self {
        self.janitor = janitor;
        self
    }

    /// Keep documents under `dir` (relative to the backend root)
    pub fn with_history_dir(mut self, dir: impl Into<String>) -> Self {
        self.history_dir = dir.into().trim_matches('/').to_string();
        self
    }

    /// Active policy
    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Backend the store writes through
    pub fn storage(&self) -> &Arc<dyn FileStorage> {
        &self.storage
    }

    /// Path of `user`'s history document
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` for unsafe user ids
    pub fn document_path(&self, user: &str) -> StorageResult<String> {
        validate_user(user)?;
        let file_name = format!("chat_history_{}.json", user);
        if self.history_dir.is_empty() {
            Ok(file_name)
        } else {
            Ok(format!("{}/{}", self.history_dir, file_name))
        }
    }

    /// Read `user`'s sessions
    ///
    /// An absent document is an empty collection. Legacy documents are
    /// upgraded in memory. A document matching neither shape is logged and
    /// treated as empty.
    pub fn load(&self, user: &str) -> StorageResult<SessionCollection> {
        let path = self.document_path(user)?;
        let text = match self.storage.read(&path) {
            Ok(text) => text,
            Err(NebenchatError::NotFound(_)) => return Ok(SessionCollection::new()),
            Err(e) => return Err(e),
        };

        match HistoryDocument::parse(&text) {
            Ok(document) => Ok(document.upgrade()),
            Err(e) => {
                tracing::warn!("Corrupt chat history for {} at {}: {}", user, path, e);
                Ok(SessionCollection::new())
            }
        }
    }

    /// Persist `collection`, evicting the oldest sessions over the cap
    ///
    /// Evicted sessions have their vector store released and attachments
    /// deleted after the trimmed document is written; those clean-ups are
    /// best-effort.
    pub fn save(&self, user: &str, collection: &mut SessionCollection) -> StorageResult<()> {
        let path = self.document_path(user)?;
        let evicted = collection.take_overflow(self.policy.max_sessions);

        self.storage.write(&path, &to_json(collection)?)?;
        tracing::debug!(
            "Saved {} sessions for {} via {}",
            collection.len(),
            user,
            self.storage.backend_name()
        );

        if !evicted.is_empty() {
            counter!("sessions_evicted_total", evicted.len() as u64);
            for session in &evicted {
                tracing::info!("Evicting session {} for {}", session.session_id, user);
                self.release_vector_store(session);
                self.janitor.cleanup_session(user, session);
            }
        }
        Ok(())
    }

    /// Current session, if any, alongside the whole collection
    pub fn current(&self, user: &str) -> StorageResult<(Option<ChatSession>, SessionCollection)> {
        let collection = self.load(user)?;
        Ok((collection.current().cloned(), collection))
    }

    /// Make `session` current, replacing any stored copy with the same id
    pub fn promote(&self, user: &str, session: ChatSession) -> StorageResult<()> {
        let mut collection = self.load(user)?;
        self.promote_in(user, &mut collection, session, Local::now())
            .map(|_| ())
    }

    fn promote_in(
        &self,
        user: &str,
        collection: &mut SessionCollection,
        mut session: ChatSession,
        now: DateTime<Local>,
    ) -> StorageResult<ChatSession> {
        collection.remove(&session.session_id);
        session.updated_at = now;
        collection.push(session.clone());
        self.save(user, collection)?;
        Ok(session)
    }

    /// Append `turn` to the user's current session, opening a new one when needed
    pub fn record_turn(
        &self,
        user: &str,
        turn: ChatTurn,
        start_new: bool,
    ) -> StorageResult<ChatSession> {
        self.record_turn_at(user, turn, start_new, Local::now())
    }

    /// [`record_turn`](Self::record_turn) against an explicit clock
    ///
    /// The current session is reused when it is empty, or when `start_new` is
    /// false and no more than the idle timeout has passed since its last turn.
    pub fn record_turn_at(
        &self,
        user: &str,
        turn: ChatTurn,
        start_new: bool,
        now: DateTime<Local>,
    ) -> StorageResult<ChatSession> {
        let mut collection = self.load(user)?;

        let mut session = match collection.take_current() {
            Some(current) if self.reusable(&current, start_new, now) => current,
            Some(current) => {
                tracing::debug!(
                    "Starting new session for {} (previous {})",
                    user,
                    current.session_id
                );
                collection.push(current);
                ChatSession::new(now)
            }
            None => ChatSession::new(now),
        };

        let dropped = session.push_turn(turn, self.policy.max_turns);
        collection.push(session.clone());
        self.save(user, &mut collection)?;

        for turn in &dropped {
            self.janitor.cleanup_turn(user, turn);
        }
        Ok(session)
    }

    fn reusable(&self, session: &ChatSession, start_new: bool, now: DateTime<Local>) -> bool {
        if session.is_empty() {
            return true;
        }
        let idle = now.signed_duration_since(session.last_activity());
        !start_new && idle <= self.policy.idle_timeout
    }

    /// All sessions for `user`, oldest first
    pub fn sessions(&self, user: &str) -> StorageResult<Vec<ChatSession>> {
        Ok(self.load(user)?.into_sessions())
    }

    /// One session by id
    pub fn find(&self, user: &str, session_id: &str) -> StorageResult<Option<ChatSession>> {
        Ok(self.load(user)?.find(session_id).cloned())
    }

    /// Make a stored session current again
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` when no session has `session_id`
    pub fn revert(&self, user: &str, session_id: &str) -> StorageResult<ChatSession> {
        let mut collection = self.load(user)?;
        let session = collection
            .find(session_id)
            .cloned()
            .ok_or_else(|| NebenchatError::SessionNotFound(session_id.to_string()))?;
        let promoted = self.promote_in(user, &mut collection, session, Local::now())?;
        tracing::info!("Reverted {} to session {}", user, session_id);
        Ok(promoted)
    }

    /// Forget all of `user`'s history
    ///
    /// Vector stores are released best-effort; attachments are left in place.
    pub fn clear(&self, user: &str) -> StorageResult<()> {
        let path = self.document_path(user)?;
        let collection = self.load(user)?;
        for session in &collection {
            self.release_vector_store(session);
        }
        self.storage.remove(&path)?;
        tracing::info!("Cleared chat history for {}", user);
        Ok(())
    }

    /// Vector store for a session, creating one if it has none
    ///
    /// Creation failures are logged and yield `None`.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` for unknown ids and storage errors when the
    /// new handle cannot be persisted
    pub fn ensure_vector_store(
        &self,
        user: &str,
        session_id: &str,
    ) -> StorageResult<Option<String>> {
        let mut collection = self.load(user)?;
        let Some(session) = collection.find_mut(session_id) else {
            return Err(NebenchatError::SessionNotFound(session_id.to_string()));
        };
        if let Some(existing) = &session.vector_store_id {
            return Ok(Some(existing.clone()));
        }

        let name = format!("chat-{}-{}", user, session_id);
        match self.vector_stores.create(&name) {
            Ok(id) => {
                session.vector_store_id = Some(id.clone());
                self.save(user, &mut collection)?;
                Ok(Some(id))
            }
            Err(e) => {
                tracing::warn!("Vector store creation failed for {}: {}", session_id, e);
                Ok(None)
            }
        }
    }

    fn release_vector_store(&self, session: &ChatSession) {
        let Some(id) = session.vector_store_id.as_deref() else {
            return;
        };
        if let Err(e) = self.vector_stores.release(id) {
            increment_counter!("vector_store_release_failures_total");
            tracing::warn!(
                "Failed to release vector store {} of session {}: {}",
                id,
                session.session_id,
                e
            );
        }
    }
}
