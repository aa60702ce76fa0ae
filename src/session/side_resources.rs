//! Vector stores tied to sessions
//!
//! A session may own a vector store on the model provider's side. The store
//! only ever creates and releases them; both are best-effort and never fail
//! a chat turn.

use crate::config::VectorStoreConfig;
use crate::error::{NebenchatError, StorageResult};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Create and release provider-side vector stores
#[cfg_attr(test, mockall::automock)]
pub trait VectorStores: Send + Sync {
    /// Create a store named `name`, returning its id
    fn create(&self, name: &str) -> StorageResult<String>;

    /// Release the store with `id`
    fn release(&self, id: &str) -> StorageResult<()>;
}

/// Stand-in used when no API key is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVectorStores;

impl VectorStores for NoVectorStores {
    fn create(&self, _name: &str) -> StorageResult<String> {
        Err(NebenchatError::VectorStore(
            "vector stores are disabled (no API key configured)".to_string(),
        ))
    }

    fn release(&self, id: &str) -> StorageResult<()> {
        tracing::debug!("Vector stores disabled; nothing to release for {}", id);
        Ok(())
    }
}

#[derive(Deserialize)]
struct CreatedStore {
    id: String,
}

/// Blocking client for the OpenAI vector store endpoints
#[derive(Debug, Clone)]
pub struct OpenAiVectorStores {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiVectorStores {
    /// Create a client for `base_url` authenticating with `api_key`
    ///
    /// # Errors
    ///
    /// Returns `NebenchatError::Config` if the HTTP client cannot be built
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> StorageResult<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NebenchatError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/vector_stores{}", self.base_url, suffix)
    }
}

impl VectorStores for OpenAiVectorStores {
    fn create(&self, name: &str) -> StorageResult<String> {
        let response = self
            .http
            .post(self.url(""))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
            .json(&serde_json::json!({ "name": name }))
            .send()
            .map_err(|e| NebenchatError::VectorStore(format!("create {} failed: {}", name, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(NebenchatError::VectorStore(format!(
                "create {} returned {}: {}",
                name, status, body
            )));
        }

        let created: CreatedStore = response
            .json()
            .map_err(|e| NebenchatError::VectorStore(format!("invalid create response: {}", e)))?;
        tracing::info!("Created vector store {} ({})", created.id, name);
        Ok(created.id)
    }

    fn release(&self, id: &str) -> StorageResult<()> {
        let response = self
            .http
            .delete(self.url(&format!("/{}", id)))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
            .send()
            .map_err(|e| NebenchatError::VectorStore(format!("release {} failed: {}", id, e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!("Vector store {} already gone", id);
            return Ok(());
        }
        if !status.is_success() {
            return Err(NebenchatError::VectorStore(format!(
                "release {} returned {}",
                id, status
            )));
        }

        tracing::info!("Released vector store {}", id);
        Ok(())
    }
}

/// Pick the vector store implementation for `config`
///
/// # Errors
///
/// Returns `NebenchatError::Config` if the HTTP client cannot be built
pub fn vector_stores_from_config(
    config: &VectorStoreConfig,
) -> StorageResult<Arc<dyn VectorStores>> {
    match config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        Some(key) => Ok(Arc::new(OpenAiVectorStores::new(
            config.api_base.clone(),
            key,
            Duration::from_secs(config.timeout_seconds),
        )?)),
        None => {
            tracing::debug!("No vector store API key configured; vector stores disabled");
            Ok(Arc::new(NoVectorStores))
        }
    }
}
