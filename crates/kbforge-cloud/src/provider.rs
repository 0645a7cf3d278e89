//! Provider API traits
//!
//! The managers talk to the cloud through these traits so the provisioning
//! logic is independent of the SDK. `kbforge-cloud-aws` implements them on top
//! of the AWS SDK; the `testing` module has recording fakes.

use crate::error::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Kind of security policy attached to a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityPolicyType {
    Network,
    Encryption,
}

impl SecurityPolicyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityPolicyType::Network => "network",
            SecurityPolicyType::Encryption => "encryption",
        }
    }
}

impl std::fmt::Display for SecurityPolicyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collection lifecycle status as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionStatus {
    Creating,
    Active,
    Deleting,
    Failed,
    Other(String),
}

impl CollectionStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "CREATING" => CollectionStatus::Creating,
            "ACTIVE" => CollectionStatus::Active,
            "DELETING" => CollectionStatus::Deleting,
            "FAILED" => CollectionStatus::Failed,
            other => CollectionStatus::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectionStatus::Creating => write!(f, "CREATING"),
            CollectionStatus::Active => write!(f, "ACTIVE"),
            CollectionStatus::Deleting => write!(f, "DELETING"),
            CollectionStatus::Failed => write!(f, "FAILED"),
            CollectionStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Collection as returned by a status lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDetail {
    pub id: String,
    pub arn: Option<String>,
    pub name: Option<String>,
    pub endpoint: Option<String>,
    pub status: CollectionStatus,
}

/// Vector search service control plane (collections and their policies)
#[async_trait]
pub trait SearchServerlessApi: Send + Sync {
    async fn create_access_policy(&self, name: &str, policy: &str, client_token: &str)
    -> ApiResult<()>;

    async fn delete_access_policy(&self, name: &str) -> ApiResult<()>;

    async fn create_security_policy(
        &self,
        policy_type: SecurityPolicyType,
        name: &str,
        policy: &str,
        client_token: &str,
    ) -> ApiResult<()>;

    async fn delete_security_policy(
        &self,
        policy_type: SecurityPolicyType,
        name: &str,
    ) -> ApiResult<()>;

    /// Submit a vector search collection. Returns the new collection id.
    async fn create_collection(&self, name: &str, client_token: &str) -> ApiResult<String>;

    async fn get_collection(&self, id: &str) -> ApiResult<Option<CollectionDetail>>;

    async fn delete_collection(&self, id: &str, client_token: &str) -> ApiResult<()>;
}

/// Data plane of a collection: index management against its endpoint
#[async_trait]
pub trait VectorIndexApi: Send + Sync {
    async fn index_exists(&self, endpoint: &str, index: &str) -> ApiResult<bool>;

    async fn create_index(
        &self,
        endpoint: &str,
        index: &str,
        body: &serde_json::Value,
    ) -> ApiResult<()>;

    async fn delete_index(&self, endpoint: &str, index: &str) -> ApiResult<()>;
}

/// Knowledge base lifecycle status as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnowledgeBaseStatus {
    Creating,
    Active,
    Failed,
    Other(String),
}

impl KnowledgeBaseStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "CREATING" => KnowledgeBaseStatus::Creating,
            "ACTIVE" => KnowledgeBaseStatus::Active,
            "FAILED" => KnowledgeBaseStatus::Failed,
            other => KnowledgeBaseStatus::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for KnowledgeBaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KnowledgeBaseStatus::Creating => write!(f, "CREATING"),
            KnowledgeBaseStatus::Active => write!(f, "ACTIVE"),
            KnowledgeBaseStatus::Failed => write!(f, "FAILED"),
            KnowledgeBaseStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Parameters of a vector knowledge base backed by a serverless collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeBaseRequest {
    pub name: String,
    pub role_arn: String,
    pub embedding_model_arn: String,
    pub collection_arn: String,
    pub vector_index_name: String,
    pub vector_field: String,
    pub text_field: String,
    pub metadata_field: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeBaseSummary {
    pub id: String,
    pub arn: String,
    pub status: KnowledgeBaseStatus,
}

/// Parameters of a bucket-backed data source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSourceRequest {
    pub knowledge_base_id: String,
    pub name: String,
    pub bucket_arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionJob {
    pub id: String,
    pub status: String,
}

/// Managed knowledge base service
#[async_trait]
pub trait KnowledgeBaseApi: Send + Sync {
    /// `Ok(None)` means the provider answered without a knowledge base
    async fn create_knowledge_base(
        &self,
        request: &KnowledgeBaseRequest,
        client_token: &str,
    ) -> ApiResult<Option<KnowledgeBaseSummary>>;

    async fn get_knowledge_base(&self, id: &str) -> ApiResult<Option<KnowledgeBaseSummary>>;

    async fn delete_knowledge_base(&self, id: &str) -> ApiResult<()>;

    /// Returns the data source id, `None` when the response carried none
    async fn create_data_source(
        &self,
        request: &DataSourceRequest,
        client_token: &str,
    ) -> ApiResult<Option<String>>;

    async fn delete_data_source(&self, knowledge_base_id: &str, data_source_id: &str)
    -> ApiResult<()>;

    async fn start_ingestion_job(
        &self,
        knowledge_base_id: &str,
        data_source_id: &str,
        client_token: &str,
        description: Option<&str>,
    ) -> ApiResult<Option<IngestionJob>>;
}
