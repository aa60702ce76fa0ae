//! Command handlers for the CLI
//!
//! - `history`: list, show, revert and clear a user's sessions
//! - `storage`: raw access to the configured backend
//!
//! Both build their dependencies from [`Config`] once per invocation.

use crate::config::Config;
use crate::error::Result;
use crate::session::{vector_stores_from_config, SessionStore};
use crate::storage::{build_storage, select_backend, FileStorage};
use std::sync::Arc;

pub mod history;
pub mod storage;

/// Select and construct the configured storage backend
pub fn open_storage(config: &Config) -> Result<Arc<dyn FileStorage>> {
    let selection = select_backend(&config.storage)?;
    tracing::debug!("Opening {} storage", selection);
    Ok(build_storage(&selection)?)
}

/// Session store wired to the configured backend and vector stores
pub fn open_session_store(config: &Config) -> Result<SessionStore> {
    let storage = open_storage(config)?;
    let vector_stores = vector_stores_from_config(&config.vector_stores)?;
    Ok(SessionStore::from_config(storage, vector_stores, config))
}
