//! Managed knowledge base bound to the collection's vector index

use crate::error::{ApiError, ProvisionError, Result};
use crate::key::{Attribute, NamedResourceKey};
use crate::provider::{KnowledgeBaseApi, KnowledgeBaseRequest, KnowledgeBaseStatus};
use crate::state::StateStore;
use crate::waiter::{PollConfig, wait_until};
use std::sync::Arc;

const TEXT_FIELD: &str = "text";
const METADATA_FIELD: &str = "metadata";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeBaseRecord {
    pub id: String,
    pub arn: String,
}

/// Persisted identifiers read back on update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeBaseAttributes {
    pub knowledge_base_id: String,
    pub knowledge_base_arn: String,
    pub data_source_id: String,
}

pub struct KnowledgeBaseManager {
    api: Arc<dyn KnowledgeBaseApi>,
    state: Arc<dyn StateStore>,
    poll: PollConfig,
}

impl KnowledgeBaseManager {
    pub fn new(api: Arc<dyn KnowledgeBaseApi>, state: Arc<dyn StateStore>, poll: PollConfig) -> Self {
        Self { api, state, poll }
    }

    /// Create the knowledge base, persist its id and ARN, then wait until it
    /// is active
    pub async fn create_knowledge_base(
        &self,
        role_arn: &str,
        key: &NamedResourceKey,
        embedding_model_arn: &str,
        collection_arn: &str,
        client_token: &str,
    ) -> Result<KnowledgeBaseRecord> {
        let record = self
            .submit_knowledge_base(role_arn, key, embedding_model_arn, collection_arn, client_token)
            .await?;
        self.await_active(key, &record.id).await?;
        Ok(record)
    }

    /// Create the knowledge base and persist its id and ARN without waiting
    pub async fn submit_knowledge_base(
        &self,
        role_arn: &str,
        key: &NamedResourceKey,
        embedding_model_arn: &str,
        collection_arn: &str,
        client_token: &str,
    ) -> Result<KnowledgeBaseRecord> {
        tracing::info!(
            key = %key,
            collection_arn,
            embedding_model_arn,
            role_arn,
            "Creating knowledge base"
        );
        let creation_error = |source: ApiError| ProvisionError::KnowledgeBaseCreation {
            name: key.to_string(),
            source,
        };

        let request = KnowledgeBaseRequest {
            name: key.to_string(),
            role_arn: role_arn.to_string(),
            embedding_model_arn: embedding_model_arn.to_string(),
            collection_arn: collection_arn.to_string(),
            vector_index_name: key.to_string(),
            vector_field: key.vector_field(),
            text_field: TEXT_FIELD.to_string(),
            metadata_field: METADATA_FIELD.to_string(),
        };

        let summary = self
            .api
            .create_knowledge_base(&request, client_token)
            .await
            .map_err(creation_error)?
            .filter(|kb| !kb.id.is_empty() && !kb.arn.is_empty())
            .ok_or_else(|| {
                creation_error(ApiError::malformed(
                    "response is missing the knowledge base id or ARN",
                ))
            })?;

        let record = KnowledgeBaseRecord {
            id: summary.id,
            arn: summary.arn,
        };
        self.state
            .put(&key.path(Attribute::KnowledgeBaseId), &record.id)
            .await?;
        self.state
            .put(&key.path(Attribute::KnowledgeBaseArn), &record.arn)
            .await?;
        tracing::info!(key = %key, knowledge_base_id = %record.id, "Knowledge base created");

        Ok(record)
    }

    /// Poll knowledge base `id` until it reports ACTIVE
    pub async fn await_active(&self, key: &NamedResourceKey, id: &str) -> Result<()> {
        let creation_error = |source: ApiError| ProvisionError::KnowledgeBaseCreation {
            name: key.to_string(),
            source,
        };

        let api = &self.api;
        wait_until(&format!("knowledge base {}", id), &self.poll, move |attempt| async move {
            let summary = api.get_knowledge_base(id).await.map_err(creation_error)?;
            let status = summary.map(|kb| kb.status);
            tracing::info!(attempt, knowledge_base_id = id, status = ?status, "Knowledge base status");
            Ok((status == Some(KnowledgeBaseStatus::Active)).then_some(()))
        })
        .await
    }

    /// Read back the persisted knowledge base and data source identifiers
    pub async fn update_knowledge_base(&self, key: &NamedResourceKey) -> Result<KnowledgeBaseAttributes> {
        tracing::info!(key = %key, "Reading persisted knowledge base");
        Ok(KnowledgeBaseAttributes {
            knowledge_base_id: self.state.get(&key.path(Attribute::KnowledgeBaseId)).await?,
            knowledge_base_arn: self.state.get(&key.path(Attribute::KnowledgeBaseArn)).await?,
            data_source_id: self.state.get(&key.path(Attribute::DataSourceId)).await?,
        })
    }

    pub async fn delete_knowledge_base(&self, key: &NamedResourceKey) -> Result<()> {
        let id = self.state.get(&key.path(Attribute::KnowledgeBaseId)).await?;
        self.delete_knowledge_base_by_id(&id).await
    }

    pub async fn delete_knowledge_base_by_id(&self, id: &str) -> Result<()> {
        tracing::info!(knowledge_base_id = id, "Deleting knowledge base");
        match self.api.delete_knowledge_base(id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::info!(knowledge_base_id = id, "Knowledge base already deleted");
                Ok(())
            }
            Err(source) => {
                tracing::error!(knowledge_base_id = id, error = %source, "Error deleting knowledge base");
                Err(ProvisionError::KnowledgeBaseDeletion {
                    id: id.to_string(),
                    source,
                })
            }
        }
    }
}
