//! Recording fakes of the provider traits
//!
//! Enabled with the `test-utils` feature. Each fake records the calls it
//! receives as `"operation target"` strings and can be told to fail a given
//! operation.

use crate::error::ApiError;
use crate::provider::{
    ApiResult, CollectionDetail, CollectionStatus, DataSourceRequest, IngestionJob,
    KnowledgeBaseApi, KnowledgeBaseRequest, KnowledgeBaseStatus, KnowledgeBaseSummary,
    SearchServerlessApi, SecurityPolicyType, VectorIndexApi,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
struct CallLog {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl CallLog {
    fn record(&self, operation: &str, target: &str) -> ApiResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", operation, target));
        if self.failing.lock().unwrap().contains(operation) {
            return Err(ApiError::service(format!("{} rejected for {}", operation, target)));
        }
        Ok(())
    }

    fn fail(&self, operation: &str) {
        self.failing.lock().unwrap().insert(operation.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, operation: &str) -> usize {
        let prefix = format!("{} ", operation);
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }
}

/// Fake collection control plane. A created collection turns ACTIVE on the
/// `active_after`-th status lookup (1 means the first lookup).
pub struct FakeSearchApi {
    log: CallLog,
    active_after: Mutex<Option<u32>>,
    lookups: Mutex<HashMap<String, u32>>,
}

impl FakeSearchApi {
    pub fn new() -> Self {
        Self {
            log: CallLog::default(),
            active_after: Mutex::new(Some(1)),
            lookups: Mutex::new(HashMap::new()),
        }
    }

    /// `None` keeps collections in CREATING forever
    pub fn active_after(self, lookups: Option<u32>) -> Self {
        *self.active_after.lock().unwrap() = lookups;
        self
    }

    pub fn fail(&self, operation: &str) {
        self.log.fail(operation);
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.calls()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.log.count(operation)
    }

    pub fn collection_id(name: &str) -> String {
        format!("id-{}", name)
    }

    pub fn collection_arn(id: &str) -> String {
        format!("arn:aws:aoss:us-east-1:123456789012:collection/{}", id)
    }

    pub fn collection_endpoint(id: &str) -> String {
        format!("https://{}.us-east-1.aoss.amazonaws.com", id)
    }
}

impl Default for FakeSearchApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchServerlessApi for FakeSearchApi {
    async fn create_access_policy(&self, name: &str, _policy: &str, _client_token: &str) -> ApiResult<()> {
        self.log.record("create_access_policy", name)
    }

    async fn delete_access_policy(&self, name: &str) -> ApiResult<()> {
        self.log.record("delete_access_policy", name)
    }

    async fn create_security_policy(
        &self,
        policy_type: SecurityPolicyType,
        name: &str,
        _policy: &str,
        _client_token: &str,
    ) -> ApiResult<()> {
        self.log
            .record(&format!("create_{}_policy", policy_type), name)
    }

    async fn delete_security_policy(&self, policy_type: SecurityPolicyType, name: &str) -> ApiResult<()> {
        self.log
            .record(&format!("delete_{}_policy", policy_type), name)
    }

    async fn create_collection(&self, name: &str, _client_token: &str) -> ApiResult<String> {
        self.log.record("create_collection", name)?;
        Ok(Self::collection_id(name))
    }

    async fn get_collection(&self, id: &str) -> ApiResult<Option<CollectionDetail>> {
        self.log.record("get_collection", id)?;
        let seen = {
            let mut lookups = self.lookups.lock().unwrap();
            let seen = lookups.entry(id.to_string()).or_insert(0);
            *seen += 1;
            *seen
        };
        let active = self
            .active_after
            .lock()
            .unwrap()
            .is_some_and(|after| seen >= after);
        let name = id.trim_start_matches("id-").to_string();

        Ok(Some(CollectionDetail {
            id: id.to_string(),
            arn: Some(Self::collection_arn(id)),
            name: Some(name),
            endpoint: active.then(|| Self::collection_endpoint(id)),
            status: if active {
                CollectionStatus::Active
            } else {
                CollectionStatus::Creating
            },
        }))
    }

    async fn delete_collection(&self, id: &str, _client_token: &str) -> ApiResult<()> {
        self.log.record("delete_collection", id)
    }
}

/// Fake index data plane
#[derive(Default)]
pub struct FakeIndexApi {
    log: CallLog,
    indexes: Mutex<HashSet<String>>,
}

impl FakeIndexApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, operation: &str) {
        self.log.fail(operation);
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.calls()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.log.count(operation)
    }

    /// Pretend `index` was created by someone else
    pub fn add_index(&self, index: &str) {
        self.indexes.lock().unwrap().insert(index.to_string());
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.indexes.lock().unwrap().contains(index)
    }
}

#[async_trait]
impl VectorIndexApi for FakeIndexApi {
    async fn index_exists(&self, endpoint: &str, index: &str) -> ApiResult<bool> {
        self.log
            .record("index_exists", &format!("{}/{}", endpoint, index))?;
        Ok(self.has_index(index))
    }

    async fn create_index(&self, endpoint: &str, index: &str, _body: &serde_json::Value) -> ApiResult<()> {
        self.log
            .record("create_index", &format!("{}/{}", endpoint, index))?;
        self.indexes.lock().unwrap().insert(index.to_string());
        Ok(())
    }

    async fn delete_index(&self, endpoint: &str, index: &str) -> ApiResult<()> {
        self.log
            .record("delete_index", &format!("{}/{}", endpoint, index))?;
        self.indexes.lock().unwrap().remove(index);
        Ok(())
    }
}

/// Fake knowledge base service. Knowledge bases are ACTIVE on first lookup.
#[derive(Default)]
pub struct FakeKnowledgeBaseApi {
    log: CallLog,
    malformed_create: Mutex<bool>,
    requests: Mutex<Vec<KnowledgeBaseRequest>>,
}

impl FakeKnowledgeBaseApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, operation: &str) {
        self.log.fail(operation);
    }

    /// Answer knowledge base creation without a knowledge base
    pub fn malformed_create(&self) {
        *self.malformed_create.lock().unwrap() = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.calls()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.log.count(operation)
    }

    pub fn knowledge_base_requests(&self) -> Vec<KnowledgeBaseRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn knowledge_base_id(name: &str) -> String {
        format!("KB{}", name.to_uppercase().replace('-', ""))
    }

    pub fn data_source_id(name: &str) -> String {
        format!("DS{}", name.to_uppercase().replace('-', ""))
    }
}

#[async_trait]
impl KnowledgeBaseApi for FakeKnowledgeBaseApi {
    async fn create_knowledge_base(
        &self,
        request: &KnowledgeBaseRequest,
        _client_token: &str,
    ) -> ApiResult<Option<KnowledgeBaseSummary>> {
        self.log.record("create_knowledge_base", &request.name)?;
        self.requests.lock().unwrap().push(request.clone());
        if *self.malformed_create.lock().unwrap() {
            return Ok(None);
        }
        let id = Self::knowledge_base_id(&request.name);
        Ok(Some(KnowledgeBaseSummary {
            arn: format!("arn:aws:bedrock:us-east-1:123456789012:knowledge-base/{}", id),
            id,
            status: KnowledgeBaseStatus::Creating,
        }))
    }

    async fn get_knowledge_base(&self, id: &str) -> ApiResult<Option<KnowledgeBaseSummary>> {
        self.log.record("get_knowledge_base", id)?;
        Ok(Some(KnowledgeBaseSummary {
            id: id.to_string(),
            arn: format!("arn:aws:bedrock:us-east-1:123456789012:knowledge-base/{}", id),
            status: KnowledgeBaseStatus::Active,
        }))
    }

    async fn delete_knowledge_base(&self, id: &str) -> ApiResult<()> {
        self.log.record("delete_knowledge_base", id)
    }

    async fn create_data_source(&self, request: &DataSourceRequest, _client_token: &str) -> ApiResult<Option<String>> {
        self.log.record("create_data_source", &request.name)?;
        Ok(Some(Self::data_source_id(&request.name)))
    }

    async fn delete_data_source(&self, knowledge_base_id: &str, data_source_id: &str) -> ApiResult<()> {
        self.log.record(
            "delete_data_source",
            &format!("{}/{}", knowledge_base_id, data_source_id),
        )
    }

    async fn start_ingestion_job(
        &self,
        knowledge_base_id: &str,
        data_source_id: &str,
        _client_token: &str,
        _description: Option<&str>,
    ) -> ApiResult<Option<IngestionJob>> {
        self.log.record(
            "start_ingestion_job",
            &format!("{}/{}", knowledge_base_id, data_source_id),
        )?;
        Ok(Some(IngestionJob {
            id: "JOB1".to_string(),
            status: "STARTING".to_string(),
        }))
    }
}
