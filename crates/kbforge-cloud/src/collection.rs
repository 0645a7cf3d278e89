//! Vector search collection lifecycle

use crate::error::{ApiError, ProvisionError, Result};
use crate::key::{Attribute, NamedResourceKey};
use crate::provider::{CollectionDetail, CollectionStatus, SearchServerlessApi};
use crate::state::StateStore;
use crate::waiter::{PollConfig, wait_until};
use std::sync::Arc;

/// An active collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRecord {
    pub id: String,
    pub arn: String,
    pub name: String,
    pub endpoint: String,
}

impl CollectionRecord {
    fn from_active(detail: CollectionDetail) -> std::result::Result<Self, ApiError> {
        let missing = |field: &str| {
            ApiError::malformed(format!(
                "active collection {} has no {}",
                detail.id, field
            ))
        };
        Ok(Self {
            arn: detail.arn.clone().ok_or_else(|| missing("arn"))?,
            name: detail.name.clone().ok_or_else(|| missing("name"))?,
            endpoint: detail
                .endpoint
                .clone()
                .ok_or_else(|| missing("endpoint"))?,
            id: detail.id,
        })
    }
}

/// Creates, reads back and deletes the collection of a provisioning unit
pub struct CollectionManager {
    api: Arc<dyn SearchServerlessApi>,
    state: Arc<dyn StateStore>,
    poll: PollConfig,
}

impl CollectionManager {
    pub fn new(
        api: Arc<dyn SearchServerlessApi>,
        state: Arc<dyn StateStore>,
        poll: PollConfig,
    ) -> Self {
        Self { api, state, poll }
    }

    /// Submit the collection, wait until it is active and persist its
    /// id, ARN, name and endpoint
    pub async fn create_collection(
        &self,
        key: &NamedResourceKey,
        client_token: &str,
    ) -> Result<CollectionRecord> {
        let id = self.submit_collection(key, client_token).await?;
        self.await_active(key, &id).await
    }

    /// Submit a vector search collection and return its id without waiting
    pub async fn submit_collection(&self, key: &NamedResourceKey, client_token: &str) -> Result<String> {
        tracing::info!(key = %key, "Creating collection");
        let id = self
            .api
            .create_collection(key.as_str(), client_token)
            .await
            .map_err(|source| ProvisionError::CollectionCreation {
                name: key.to_string(),
                source,
            })?;
        tracing::info!(key = %key, collection_id = %id, "Collection submitted, waiting for ACTIVE");
        Ok(id)
    }

    /// Poll collection `id` until it is active, then persist its attributes
    pub async fn await_active(&self, key: &NamedResourceKey, id: &str) -> Result<CollectionRecord> {
        let creation_error = |source: ApiError| ProvisionError::CollectionCreation {
            name: key.to_string(),
            source,
        };

        let api = &self.api;
        let record = wait_until(&format!("collection {}", key), &self.poll, move |attempt| async move {
            let Some(detail) = api.get_collection(id).await.map_err(creation_error)? else {
                tracing::info!(attempt, collection_id = id, "Collection not visible yet");
                return Ok(None);
            };

            tracing::info!(attempt, collection_id = id, status = %detail.status, "Collection status");
            if detail.status != CollectionStatus::Active {
                return Ok(None);
            }
            CollectionRecord::from_active(detail)
                .map(Some)
                .map_err(creation_error)
        })
        .await?;

        self.persist(key, &record).await?;
        Ok(record)
    }

    async fn persist(&self, key: &NamedResourceKey, record: &CollectionRecord) -> Result<()> {
        let values = [
            (Attribute::CollectionId, &record.id),
            (Attribute::CollectionArn, &record.arn),
            (Attribute::CollectionName, &record.name),
            (Attribute::CollectionEndpoint, &record.endpoint),
        ];
        for (attribute, value) in values {
            let path = key.path(attribute);
            tracing::debug!(path = %path, "Storing attribute");
            self.state.put(&path, value).await?;
        }
        Ok(())
    }

    /// Read back the persisted collection attributes. No provider call is made.
    pub async fn update_collection(&self, key: &NamedResourceKey) -> Result<CollectionRecord> {
        tracing::info!(key = %key, "Reading persisted collection");
        Ok(CollectionRecord {
            id: self.state.get(&key.path(Attribute::CollectionId)).await?,
            name: self.state.get(&key.path(Attribute::CollectionName)).await?,
            arn: self.state.get(&key.path(Attribute::CollectionArn)).await?,
            endpoint: self
                .state
                .get(&key.path(Attribute::CollectionEndpoint))
                .await?,
        })
    }

    /// Delete the collection whose id was persisted for `key`
    pub async fn delete_collection(&self, key: &NamedResourceKey, client_token: &str) -> Result<()> {
        let id = self.state.get(&key.path(Attribute::CollectionId)).await?;
        self.delete_collection_by_id(&id, client_token).await
    }

    pub async fn delete_collection_by_id(&self, id: &str, client_token: &str) -> Result<()> {
        tracing::info!(collection_id = id, "Deleting collection");
        match self.api.delete_collection(id, client_token).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::info!(collection_id = id, "Collection already deleted");
                Ok(())
            }
            Err(source) => Err(ProvisionError::CollectionDeletion {
                id: id.to_string(),
                source,
            }),
        }
    }
}
