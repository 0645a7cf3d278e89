use kbforge_cloud::testing::{FakeIndexApi, FakeKnowledgeBaseApi, FakeSearchApi};
use kbforge_cloud::{
    LifecycleRequest, MemoryStateStore, ProvisionSettings, Provisioner, RequestType,
    ResourceProperties,
};
use std::sync::Arc;

pub struct Harness {
    pub search: Arc<FakeSearchApi>,
    pub index: Arc<FakeIndexApi>,
    pub knowledge_base: Arc<FakeKnowledgeBaseApi>,
    pub state: Arc<MemoryStateStore>,
    pub provisioner: Provisioner,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(FakeSearchApi::new(), ProvisionSettings::default())
    }

    pub fn with(search: FakeSearchApi, settings: ProvisionSettings) -> Self {
        let search = Arc::new(search);
        let index = Arc::new(FakeIndexApi::new());
        let knowledge_base = Arc::new(FakeKnowledgeBaseApi::new());
        let state = Arc::new(MemoryStateStore::new());
        let provisioner = Provisioner::new(
            search.clone(),
            index.clone(),
            knowledge_base.clone(),
            state.clone(),
            settings,
        );
        Self {
            search,
            index,
            knowledge_base,
            state,
            provisioner,
        }
    }
}

pub fn properties() -> ResourceProperties {
    ResourceProperties {
        name_prefix: "acme".to_string(),
        name_suffix: "ab12cd".to_string(),
        knowledge_base_bucket_arn: "arn:aws:s3:::acme-knowledge-base".to_string(),
        knowledge_base_role_arn: "arn:aws:iam::123456789012:role/acme-kb".to_string(),
        knowledge_base_custom_resource_role: "arn:aws:iam::123456789012:role/acme-cr"
            .to_string(),
        access_policy_arns: r#"["arn:aws:iam::123456789012:role/admin"]"#.to_string(),
        knowledge_base_embedding_model_arn:
            "arn:aws:bedrock:us-east-1::foundation-model/amazon.titan-embed-text-v2:0"
                .to_string(),
    }
}

pub fn request(request_type: RequestType, request_id: &str) -> LifecycleRequest {
    LifecycleRequest {
        request_type,
        resource_properties: properties(),
        stack_id: "arn:aws:cloudformation:us-east-1:123456789012:stack/acme/1".to_string(),
        request_id: request_id.to_string(),
        logical_resource_id: "KnowledgeBase".to_string(),
        physical_resource_id: None,
    }
}
