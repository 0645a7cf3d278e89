//! Lifecycle handler for the knowledge base custom resource
//!
//! One request per lifecycle event:
//!
//! - **Create** runs policies → collection → index → knowledge base → data
//!   source, each step feeding the next. On failure the completed steps are
//!   undone in reverse order before the error is reported.
//! - **Update** reads back the persisted identifiers.
//! - **Delete** attempts every teardown step, then purges persisted state,
//!   and always reports success.

use crate::action::{TeardownReport, TeardownStep};
use crate::collection::CollectionManager;
use crate::data_source::DataSourceManager;
use crate::error::{ProvisionError, Result};
use crate::index::{IndexManager, IndexOutcome};
use crate::key::{Attribute, NamedResourceKey};
use crate::knowledge_base::KnowledgeBaseManager;
use crate::policy::PolicyManager;
use crate::provider::{KnowledgeBaseApi, SearchServerlessApi, SecurityPolicyType, VectorIndexApi};
use crate::state::{Lease, StateStore};
use crate::waiter::PollConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestType::Create => write!(f, "Create"),
            RequestType::Update => write!(f, "Update"),
            RequestType::Delete => write!(f, "Delete"),
        }
    }
}

/// Properties supplied by the template
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceProperties {
    pub name_prefix: String,
    pub name_suffix: String,
    #[serde(default)]
    pub knowledge_base_bucket_arn: String,
    #[serde(default)]
    pub knowledge_base_role_arn: String,
    #[serde(default)]
    pub knowledge_base_custom_resource_role: String,
    /// JSON-encoded array of extra principal ARNs
    #[serde(default)]
    pub access_policy_arns: String,
    #[serde(default)]
    pub knowledge_base_embedding_model_arn: String,
}

impl ResourceProperties {
    pub fn key(&self) -> Result<NamedResourceKey> {
        NamedResourceKey::new(&self.name_prefix, &self.name_suffix)
    }

    /// Decode `accessPolicyArns`. An empty value means no extra principals.
    pub fn extra_principal_arns(&self) -> Result<Vec<String>> {
        if self.access_policy_arns.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&self.access_policy_arns).map_err(|e| {
            ProvisionError::InvalidRequest(format!(
                "accessPolicyArns must be a JSON array of strings: {}",
                e
            ))
        })
    }

    fn require_create_properties(&self) -> Result<()> {
        let required = [
            ("knowledgeBaseBucketArn", &self.knowledge_base_bucket_arn),
            ("knowledgeBaseRoleArn", &self.knowledge_base_role_arn),
            (
                "knowledgeBaseCustomResourceRole",
                &self.knowledge_base_custom_resource_role,
            ),
            (
                "knowledgeBaseEmbeddingModelArn",
                &self.knowledge_base_embedding_model_arn,
            ),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(name, _)| *name)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ProvisionError::InvalidRequest(format!(
                "missing resource properties: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Event delivered by the orchestration framework
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleRequest {
    pub request_type: RequestType,
    pub resource_properties: ResourceProperties,
    #[serde(default)]
    pub stack_id: String,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub logical_resource_id: String,
    #[serde(default)]
    pub physical_resource_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

/// Attribute bag returned to the template
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_base_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleResponse {
    pub status: ResponseStatus,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    pub physical_resource_id: String,
}

impl LifecycleResponse {
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

/// Tunables of the lifecycle handler
#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    pub collection_poll: PollConfig,
    pub index_poll: PollConfig,
    pub knowledge_base_poll: PollConfig,
    /// Age after which a lease left by another request is taken over
    pub lease_ttl: Duration,
    /// Undo completed steps when Create fails
    pub rollback_on_failure: bool,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            collection_poll: PollConfig::default(),
            index_poll: PollConfig::new(Duration::from_secs(10), 30),
            knowledge_base_poll: PollConfig::new(Duration::from_secs(10), 30),
            lease_ttl: Duration::from_secs(20 * 60),
            rollback_on_failure: true,
        }
    }
}

/// A Create step that finished and can be undone
#[derive(Debug, Clone)]
enum CompletedStep {
    AccessPolicy,
    NetworkPolicy,
    EncryptionPolicy,
    Collection { id: String },
    Index { endpoint: String },
    KnowledgeBase { id: String },
    DataSource {
        knowledge_base_id: String,
        data_source_id: String,
    },
}

/// Dispatches lifecycle events onto the resource managers
pub struct Provisioner {
    state: Arc<dyn StateStore>,
    policies: PolicyManager,
    collections: CollectionManager,
    indexes: IndexManager,
    knowledge_bases: KnowledgeBaseManager,
    data_sources: DataSourceManager,
    settings: ProvisionSettings,
}

impl Provisioner {
    pub fn new(
        search: Arc<dyn SearchServerlessApi>,
        index: Arc<dyn VectorIndexApi>,
        knowledge_base: Arc<dyn KnowledgeBaseApi>,
        state: Arc<dyn StateStore>,
        settings: ProvisionSettings,
    ) -> Self {
        Self {
            policies: PolicyManager::new(search.clone()),
            collections: CollectionManager::new(
                search,
                state.clone(),
                settings.collection_poll,
            ),
            indexes: IndexManager::new(index, settings.index_poll),
            knowledge_bases: KnowledgeBaseManager::new(
                knowledge_base.clone(),
                state.clone(),
                settings.knowledge_base_poll,
            ),
            data_sources: DataSourceManager::new(knowledge_base, state.clone()),
            state,
            settings,
        }
    }

    pub fn data_sources(&self) -> &DataSourceManager {
        &self.data_sources
    }

    /// Handle one lifecycle event. Never fails: errors become a FAILED response.
    pub async fn handle(&self, request: &LifecycleRequest) -> LifecycleResponse {
        tracing::info!(
            request_type = %request.request_type,
            request_id = %request.request_id,
            logical_resource_id = %request.logical_resource_id,
            "Handling lifecycle event"
        );

        let key = request.resource_properties.key();
        let physical_resource_id = request
            .physical_resource_id
            .clone()
            .or_else(|| key.as_ref().ok().map(|k| k.to_string()))
            .unwrap_or_else(|| request.logical_resource_id.clone());

        let outcome = match key {
            Ok(key) => self.dispatch(&key, request).await,
            // an invalid name never had anything created under it
            Err(e) if request.request_type == RequestType::Delete => {
                tracing::warn!(error = %e, "Delete for an invalid resource name");
                Ok((
                    format!("DeleteKnowledgeBase successful (nothing to delete: {})", e),
                    None,
                ))
            }
            Err(e) => Err(e),
        };

        let (status, reason, data) = match outcome {
            Ok((reason, data)) => (ResponseStatus::Success, reason, data),
            Err(e) => {
                tracing::error!(request_type = %request.request_type, error = %e, "Lifecycle event failed");
                (ResponseStatus::Failed, e.to_string(), None)
            }
        };

        let response = LifecycleResponse {
            status,
            reason,
            data,
            stack_id: request.stack_id.clone(),
            request_id: request.request_id.clone(),
            logical_resource_id: request.logical_resource_id.clone(),
            physical_resource_id,
        };
        tracing::info!(status = ?response.status, reason = %response.reason, "Lifecycle event handled");
        response
    }

    async fn dispatch(
        &self,
        key: &NamedResourceKey,
        request: &LifecycleRequest,
    ) -> Result<(String, Option<ResponseData>)> {
        let lease = Lease::acquire(
            self.state.as_ref(),
            key,
            &request.request_id,
            self.settings.lease_ttl,
        )
        .await?;

        let props = &request.resource_properties;
        let outcome = match request.request_type {
            RequestType::Create => self
                .create(key, props, &request.request_id)
                .await
                .map(|data| ("CreateKnowledgeBaseSuccessful".to_string(), Some(data))),
            RequestType::Update => self
                .update(key)
                .await
                .map(|data| ("UpdateKnowledgeBase successful".to_string(), Some(data))),
            RequestType::Delete => {
                let report = self.delete(key, &request.request_id).await;
                let reason = if report.is_success() {
                    "DeleteKnowledgeBase successful".to_string()
                } else {
                    format!("DeleteKnowledgeBase successful ({})", report)
                };
                Ok((reason, None))
            }
        };

        lease.release(self.state.as_ref()).await;
        outcome
    }

    /// Provision every resource in dependency order
    pub async fn create(
        &self,
        key: &NamedResourceKey,
        props: &ResourceProperties,
        nonce: &str,
    ) -> Result<ResponseData> {
        props.require_create_properties()?;
        let extra_principals = props.extra_principal_arns()?;

        let mut completed = Vec::new();
        match self
            .run_create(key, props, &extra_principals, nonce, &mut completed)
            .await
        {
            Ok(data) => Ok(data),
            Err(e) => {
                tracing::error!(key = %key, error = %e, completed = completed.len(), "Create failed");
                if self.settings.rollback_on_failure {
                    let report = self.rollback(key, completed, nonce).await;
                    tracing::warn!(key = %key, report = %report, "Rolled back partial create");
                }
                Err(e)
            }
        }
    }

    async fn run_create(
        &self,
        key: &NamedResourceKey,
        props: &ResourceProperties,
        extra_principals: &[String],
        nonce: &str,
        completed: &mut Vec<CompletedStep>,
    ) -> Result<ResponseData> {
        self.policies
            .create_access_policy(
                key,
                &props.knowledge_base_role_arn,
                &props.knowledge_base_custom_resource_role,
                extra_principals,
                &key.idempotency_token("access-policy", nonce),
            )
            .await?;
        completed.push(CompletedStep::AccessPolicy);

        self.policies
            .create_network_security_policy(key, &key.idempotency_token("network-policy", nonce))
            .await?;
        completed.push(CompletedStep::NetworkPolicy);

        self.policies
            .create_encryption_security_policy(
                key,
                &key.idempotency_token("encryption-policy", nonce),
            )
            .await?;
        completed.push(CompletedStep::EncryptionPolicy);

        let collection_id = self
            .collections
            .submit_collection(key, &key.idempotency_token("collection", nonce))
            .await?;
        completed.push(CompletedStep::Collection {
            id: collection_id.clone(),
        });
        let collection = self.collections.await_active(key, &collection_id).await?;

        match self.indexes.create_index(&collection.endpoint, key).await {
            IndexOutcome::Created => completed.push(CompletedStep::Index {
                endpoint: collection.endpoint.clone(),
            }),
            IndexOutcome::AlreadyExists => {}
            IndexOutcome::Failed(reason) => {
                tracing::warn!(key = %key, reason = %reason, "Continuing without a confirmed index");
            }
        }

        let knowledge_base = self
            .knowledge_bases
            .submit_knowledge_base(
                &props.knowledge_base_role_arn,
                key,
                &props.knowledge_base_embedding_model_arn,
                &collection.arn,
                &key.idempotency_token("knowledge-base", nonce),
            )
            .await?;
        completed.push(CompletedStep::KnowledgeBase {
            id: knowledge_base.id.clone(),
        });
        self.knowledge_bases
            .await_active(key, &knowledge_base.id)
            .await?;

        let data_source = self
            .data_sources
            .create_data_source(
                &props.knowledge_base_bucket_arn,
                &knowledge_base.id,
                key,
                &key.idempotency_token("data-source", nonce),
            )
            .await?;
        completed.push(CompletedStep::DataSource {
            knowledge_base_id: knowledge_base.id.clone(),
            data_source_id: data_source.id.clone(),
        });

        tracing::info!(key = %key, "Knowledge base stack created");
        Ok(ResponseData {
            collection_arn: Some(collection.arn),
            collection_id: Some(collection.id),
            collection_name: Some(collection.name),
            collection_endpoint: Some(collection.endpoint),
            data_source_id: Some(data_source.id),
            knowledge_base_id: Some(knowledge_base.id),
        })
    }

    /// Undo completed Create steps in reverse order. Persisted state is purged
    /// only when every undo succeeded; otherwise a later Delete still needs it.
    async fn rollback(
        &self,
        key: &NamedResourceKey,
        completed: Vec<CompletedStep>,
        nonce: &str,
    ) -> TeardownReport {
        let collection_token = key.idempotency_token("rollback-collection", nonce);
        let mut steps = Vec::new();

        for step in completed.into_iter().rev() {
            let step = match step {
                CompletedStep::DataSource {
                    knowledge_base_id,
                    data_source_id,
                } => TeardownStep::new("data-source", async move {
                    self.data_sources
                        .delete_data_source_by_id(&knowledge_base_id, &data_source_id)
                        .await
                }),
                CompletedStep::KnowledgeBase { id } => {
                    TeardownStep::new("knowledge-base", async move {
                        self.knowledge_bases.delete_knowledge_base_by_id(&id).await
                    })
                }
                CompletedStep::Index { endpoint } => TeardownStep::new("index", async move {
                    self.indexes.delete_index(&endpoint, key).await
                }),
                CompletedStep::Collection { id } => {
                    let token = collection_token.as_str();
                    TeardownStep::new("collection", async move {
                        self.collections.delete_collection_by_id(&id, token).await
                    })
                }
                CompletedStep::EncryptionPolicy => TeardownStep::new(
                    "encryption-policy",
                    self.policies
                        .delete_security_policy(key, SecurityPolicyType::Encryption),
                ),
                CompletedStep::NetworkPolicy => TeardownStep::new(
                    "network-policy",
                    self.policies
                        .delete_security_policy(key, SecurityPolicyType::Network),
                ),
                CompletedStep::AccessPolicy => {
                    TeardownStep::new("access-policy", self.policies.delete_access_policy(key))
                }
            };
            steps.push(step);
        }

        let mut report = TeardownReport::run_all(steps).await;
        if report.is_success() {
            for step in self.purge_steps(key) {
                report.attempt(step.name, step.action).await;
            }
        } else {
            tracing::warn!(key = %key, report = %report, "Keeping persisted identifiers for a later Delete");
        }
        report
    }

    /// Read back persisted identifiers. Makes no provider calls.
    pub async fn update(&self, key: &NamedResourceKey) -> Result<ResponseData> {
        let (collection, knowledge_base) = tokio::try_join!(
            self.collections.update_collection(key),
            self.knowledge_bases.update_knowledge_base(key),
        )?;

        Ok(ResponseData {
            collection_arn: Some(collection.arn),
            collection_id: Some(collection.id),
            collection_name: Some(collection.name),
            collection_endpoint: Some(collection.endpoint),
            data_source_id: Some(knowledge_base.data_source_id),
            knowledge_base_id: Some(knowledge_base.knowledge_base_id),
        })
    }

    /// Tear everything down in reverse dependency order, best-effort, then
    /// purge every persisted attribute
    pub async fn delete(&self, key: &NamedResourceKey, nonce: &str) -> TeardownReport {
        tracing::info!(key = %key, "Deleting knowledge base stack");
        let collection_token = key.idempotency_token("delete-collection", nonce);

        let mut steps = vec![
            TeardownStep::new("data-source", self.data_sources.delete_data_source(key)),
            TeardownStep::new(
                "knowledge-base",
                self.knowledge_bases.delete_knowledge_base(key),
            ),
            TeardownStep::new(
                "collection",
                self.collections.delete_collection(key, &collection_token),
            ),
            TeardownStep::new(
                "encryption-policy",
                self.policies
                    .delete_security_policy(key, SecurityPolicyType::Encryption),
            ),
            TeardownStep::new(
                "network-policy",
                self.policies
                    .delete_security_policy(key, SecurityPolicyType::Network),
            ),
            TeardownStep::new("access-policy", self.policies.delete_access_policy(key)),
        ];
        steps.extend(self.purge_steps(key));

        let report = TeardownReport::run_all(steps).await;
        if report.is_success() {
            tracing::info!(key = %key, duration_ms = report.duration_ms, "Delete completed");
        } else {
            tracing::warn!(key = %key, report = %report, "Delete completed with failures");
        }
        report
    }

    fn purge_steps<'a>(&'a self, key: &NamedResourceKey) -> Vec<TeardownStep<'a>> {
        Attribute::ALL
            .iter()
            .map(|attribute| {
                let path = key.path(*attribute);
                let state = &self.state;
                TeardownStep::new(format!("parameter {}", path), async move {
                    state.delete(&path).await
                })
            })
            .collect()
    }
}
