//! Vector index inside an active collection
//!
//! Index creation goes through the collection's own endpoint, which only
//! starts answering some time after the collection turns active and the data
//! access policy propagates. Failures here are logged and reported as an
//! outcome instead of an error.

use crate::error::{ApiError, ProvisionError, Result};
use crate::key::NamedResourceKey;
use crate::provider::VectorIndexApi;
use crate::waiter::{PollConfig, wait_until};
use serde_json::{Value, json};
use std::sync::Arc;

/// Dimension of the embedding vectors stored in the index
pub const VECTOR_DIMENSION: u32 = 1024;

const EF_CONSTRUCTION: u32 = 512;
const HNSW_M: u32 = 16;

/// Index settings and mapping: a single knn vector field
pub fn index_body(key: &NamedResourceKey) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert(
        key.vector_field(),
        json!({
            "type": "knn_vector",
            "dimension": VECTOR_DIMENSION,
            "method": {
                "name": "hnsw",
                "engine": "faiss",
                "parameters": {
                    "ef_construction": EF_CONSTRUCTION,
                    "m": HNSW_M,
                },
            },
        }),
    );

    json!({
        "settings": { "index.knn": true },
        "mappings": { "properties": properties },
    })
}

/// What happened to the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    Created,
    /// Left over from an earlier delivery of the same request
    AlreadyExists,
    Failed(String),
}

impl IndexOutcome {
    pub fn is_ready(&self) -> bool {
        !matches!(self, IndexOutcome::Failed(_))
    }
}

pub struct IndexManager {
    api: Arc<dyn VectorIndexApi>,
    poll: PollConfig,
}

impl IndexManager {
    pub fn new(api: Arc<dyn VectorIndexApi>, poll: PollConfig) -> Self {
        Self { api, poll }
    }

    /// Create the index `{key}` on `endpoint`. Never fails: errors are logged
    /// and returned as `IndexOutcome::Failed`.
    pub async fn create_index(&self, endpoint: &str, key: &NamedResourceKey) -> IndexOutcome {
        tracing::info!(key = %key, endpoint, "Creating index");
        match self.try_create_index(endpoint, key).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(key = %key, endpoint, error = %e, "Index creation failed");
                IndexOutcome::Failed(e.to_string())
            }
        }
    }

    async fn try_create_index(&self, endpoint: &str, key: &NamedResourceKey) -> Result<IndexOutcome> {
        let api = &self.api;
        let index = key.as_str();

        // the endpoint rejects requests until it is reachable and authorized
        let exists = wait_until(&format!("endpoint {}", endpoint), &self.poll, move |attempt| async move {
            match api.index_exists(endpoint, index).await {
                Ok(exists) => Ok(Some(exists)),
                Err(e) => {
                    tracing::debug!(attempt, endpoint, error = %e, "Endpoint not ready");
                    Ok(None)
                }
            }
        })
        .await?;

        if exists {
            tracing::info!(key = %key, "Index already exists");
            return Ok(IndexOutcome::AlreadyExists);
        }

        self.api
            .create_index(endpoint, index, &index_body(key))
            .await
            .map_err(|source: ApiError| ProvisionError::IndexCreation {
                name: index.to_string(),
                source,
            })?;

        wait_until(&format!("index {}", index), &self.poll, move |_| async move {
            Ok(matches!(api.index_exists(endpoint, index).await, Ok(true)).then_some(()))
        })
        .await?;

        tracing::info!(key = %key, "Index created");
        Ok(IndexOutcome::Created)
    }

    pub async fn delete_index(&self, endpoint: &str, key: &NamedResourceKey) -> Result<()> {
        tracing::info!(key = %key, endpoint, "Deleting index");
        match self.api.delete_index(endpoint, key.as_str()).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(source) => Err(ProvisionError::IndexDeletion {
                name: key.to_string(),
                source,
            }),
        }
    }
}
