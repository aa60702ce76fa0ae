//! NebenChat - chat history store library
//!
//! This library persists per-user chat sessions through pluggable storage
//! backends: the local filesystem, a cloned git repository, or a remote
//! repository contents API with optimistic locking.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `storage`: the `FileStorage` contract, its backends and the factory
//! - `session`: session types, the history document format and `SessionStore`
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli`: command-line interface definition
//! - `commands`: handlers behind the `nebenchat` binary
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use nebenchat::session::{ChatTurn, NoVectorStores, SessionStore};
//! use nebenchat::storage::{build_storage, select_backend};
//! use nebenchat::Config;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let storage = build_storage(&select_backend(&config.storage)?)?;
//!     let store = SessionStore::from_config(storage, Arc::new(NoVectorStores), &config);
//!     let turn = ChatTurn::text(chrono::Local::now(), "gpt-5", "hi", "hello", "<p>hello</p>");
//!     store.record_turn("neben", turn, false)?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use error::{NebenchatError, Result, StorageResult};
pub use session::{ChatSession, ChatTurn, SessionCollection, SessionStore};
pub use storage::FileStorage;

#[cfg(test)]
pub mod test_utils;
