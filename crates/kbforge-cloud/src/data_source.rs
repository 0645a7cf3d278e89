//! Bucket data source feeding the knowledge base, and ingestion triggers

use crate::error::{ApiError, ProvisionError, Result};
use crate::key::{Attribute, NamedResourceKey};
use crate::provider::{DataSourceRequest, IngestionJob, KnowledgeBaseApi};
use crate::state::StateStore;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSourceRecord {
    pub id: String,
}

pub struct DataSourceManager {
    api: Arc<dyn KnowledgeBaseApi>,
    state: Arc<dyn StateStore>,
}

impl DataSourceManager {
    pub fn new(api: Arc<dyn KnowledgeBaseApi>, state: Arc<dyn StateStore>) -> Self {
        Self { api, state }
    }

    /// Bind the bucket to the knowledge base and persist the data source id
    pub async fn create_data_source(
        &self,
        bucket_arn: &str,
        knowledge_base_id: &str,
        key: &NamedResourceKey,
        client_token: &str,
    ) -> Result<DataSourceRecord> {
        tracing::info!(key = %key, knowledge_base_id, bucket_arn, "Creating data source");
        let creation_error = |source: ApiError| ProvisionError::DataSourceCreation {
            name: key.to_string(),
            source,
        };

        let request = DataSourceRequest {
            knowledge_base_id: knowledge_base_id.to_string(),
            name: key.to_string(),
            bucket_arn: bucket_arn.to_string(),
        };

        let id = self
            .api
            .create_data_source(&request, client_token)
            .await
            .map_err(creation_error)?
            .filter(|id| !id.is_empty())
            .ok_or_else(|| creation_error(ApiError::malformed("response is missing the data source id")))?;

        self.state
            .put(&key.path(Attribute::DataSourceId), &id)
            .await?;
        tracing::info!(key = %key, data_source_id = %id, "Data source created");

        Ok(DataSourceRecord { id })
    }

    /// Delete the data source persisted for `key`
    pub async fn delete_data_source(&self, key: &NamedResourceKey) -> Result<()> {
        let knowledge_base_id = self.state.get(&key.path(Attribute::KnowledgeBaseId)).await?;
        let data_source_id = self.state.get(&key.path(Attribute::DataSourceId)).await?;
        self.delete_data_source_by_id(&knowledge_base_id, &data_source_id)
            .await
    }

    pub async fn delete_data_source_by_id(
        &self,
        knowledge_base_id: &str,
        data_source_id: &str,
    ) -> Result<()> {
        tracing::info!(knowledge_base_id, data_source_id, "Deleting data source");
        match self
            .api
            .delete_data_source(knowledge_base_id, data_source_id)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(source) => Err(ProvisionError::DataSourceDeletion {
                id: data_source_id.to_string(),
                source,
            }),
        }
    }

    /// Start a re-ingestion job. Does not wait for the job to finish.
    pub async fn sync_knowledge_base(
        &self,
        knowledge_base_id: &str,
        data_source_id: &str,
        client_token: &str,
        description: Option<&str>,
    ) -> Result<Option<IngestionJob>> {
        tracing::info!(knowledge_base_id, data_source_id, "Starting ingestion job");
        let job = self
            .api
            .start_ingestion_job(knowledge_base_id, data_source_id, client_token, description)
            .await
            .map_err(|source| ProvisionError::SyncTrigger {
                data_source_id: data_source_id.to_string(),
                source,
            })?;

        match &job {
            Some(job) => tracing::info!(
                knowledge_base_id,
                data_source_id,
                ingestion_job_id = %job.id,
                status = %job.status,
                "Ingestion job started"
            ),
            None => tracing::warn!(knowledge_base_id, data_source_id, "Ingestion job response had no job"),
        }
        Ok(job)
    }
}
