//! Chat sessions and their persistence
//!
//! A user's history is a [`SessionCollection`]: sessions oldest first, each a
//! bounded run of [`ChatTurn`]s. [`SessionStore`] reads and writes the
//! collection through any [`FileStorage`](crate::storage::FileStorage)
//! backend, applies the retention caps, and cleans up the vector stores and
//! attachment files of whatever it evicts.

pub mod attachments;
pub mod document;
pub mod side_resources;
pub mod store;
pub mod types;

pub use attachments::AttachmentJanitor;
pub use document::HistoryDocument;
pub use side_resources::{vector_stores_from_config, NoVectorStores, OpenAiVectorStores, VectorStores};
pub use store::{validate_user, SessionPolicy, SessionStore};
pub use types::{
    summarize, ChatSession, ChatTurn, ContextMessage, Role, SessionCollection, MAX_SESSIONS,
    MAX_TURNS,
};
