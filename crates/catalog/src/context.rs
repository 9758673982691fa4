use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::CatalogError;
use crate::store::ObjectStore;

pub const CONTEXT_PREFIX: &str = "context/";

/// Rules or policy text used to ground the model's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDocument {
    pub id: String,
    /// Parsed JSON, or a JSON string when the object is plain text.
    pub content: Value,
}

/// Fetches context documents by id. Nothing is cached between requests.
#[derive(Clone)]
pub struct ContextStore {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl ContextStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_prefix(store, CONTEXT_PREFIX)
    }

    pub fn with_prefix(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn key_for(&self, id: &str) -> String {
        format!("{}{}.json", self.prefix, id)
    }

    pub async fn fetch(&self, id: &str) -> Result<ContextDocument, CatalogError> {
        if id.trim().is_empty() || id.contains('/') || id.contains("..") {
            return Err(CatalogError::InvalidKey {
                what: "context",
                key: id.to_string(),
            });
        }

        let key = self.key_for(id);
        tracing::debug!(context_id = id, uri = %self.store.uri(&key), "Loading context");

        let bytes = self.store.fetch(&key).await.map_err(|e| match e {
            CatalogError::NotFound { .. } => CatalogError::not_found("context", id),
            other => other,
        })?;

        let content = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

        Ok(ContextDocument {
            id: id.to_string(),
            content,
        })
    }

    /// Fetch every id in order, stopping at the first failure.
    pub async fn fetch_all(&self, ids: &[String]) -> Result<Vec<ContextDocument>, CatalogError> {
        let mut documents = Vec::with_capacity(ids.len());
        for id in ids {
            documents.push(self.fetch(id).await?);
        }
        Ok(documents)
    }
}
