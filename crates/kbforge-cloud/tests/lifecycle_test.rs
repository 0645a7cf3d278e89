mod common;

use common::{Harness, request};
use kbforge_cloud::testing::FakeSearchApi;
use kbforge_cloud::{
    Attribute, NamedResourceKey, PollConfig, ProvisionSettings, RequestType, ResponseStatus,
    StateStore,
};
use std::time::Duration;

fn key() -> NamedResourceKey {
    NamedResourceKey::new("acme", "ab12cd").unwrap()
}

#[tokio::test]
async fn test_create_persists_and_returns_attributes() {
    let h = Harness::new();

    let response = h.provisioner.handle(&request(RequestType::Create, "req-1")).await;

    assert_eq!(response.status, ResponseStatus::Success, "{}", response.reason);
    assert_eq!(response.reason, "CreateKnowledgeBaseSuccessful");
    assert_eq!(response.physical_resource_id, "acme-ab12cd");
    assert_eq!(response.request_id, "req-1");

    let data = response.data.unwrap();
    assert!(!data.collection_arn.as_deref().unwrap_or_default().is_empty());
    assert_eq!(data.collection_name.as_deref(), Some("acme-ab12cd"));

    let state = h.state.snapshot().await;
    assert_eq!(
        state.get("/acme-ab12cd/collectionId"),
        data.collection_id.as_ref()
    );
    assert_eq!(
        state.get("/acme-ab12cd/collectionArn"),
        data.collection_arn.as_ref()
    );
    assert_eq!(
        state.get("/acme-ab12cd/collectionName"),
        data.collection_name.as_ref()
    );
    assert_eq!(
        state.get("/acme-ab12cd/collectionEndpoint"),
        data.collection_endpoint.as_ref()
    );
    assert_eq!(
        state.get("/acme-ab12cd/knowledgeBaseId"),
        data.knowledge_base_id.as_ref()
    );
    assert_eq!(
        state.get("/acme-ab12cd/dataSourceId"),
        data.data_source_id.as_ref()
    );
    assert!(state.contains_key("/acme-ab12cd/knowledgeBaseArn"));
    // lease released
    assert!(!state.contains_key("/acme-ab12cd/lease"));

    assert_eq!(
        h.search.calls()[..4],
        [
            "create_access_policy acme-ab12cd",
            "create_network_policy acme-ab12cd",
            "create_encryption_policy acme-ab12cd",
            "create_collection acme-ab12cd",
        ]
    );
    assert!(h.index.has_index("acme-ab12cd"));

    let kb_request = &h.knowledge_base.knowledge_base_requests()[0];
    assert_eq!(kb_request.vector_index_name, "acme-ab12cd");
    assert_eq!(kb_request.vector_field, "acme-vector");
    assert_eq!(kb_request.collection_arn, data.collection_arn.unwrap());
}

#[tokio::test]
async fn test_update_reads_back_without_provider_calls() {
    let h = Harness::new();
    let created = h.provisioner.handle(&request(RequestType::Create, "req-1")).await;
    assert!(created.is_success());

    let search_calls = h.search.calls().len();
    let index_calls = h.index.calls().len();
    let kb_calls = h.knowledge_base.calls().len();

    let updated = h.provisioner.handle(&request(RequestType::Update, "req-2")).await;

    assert_eq!(updated.status, ResponseStatus::Success);
    assert_eq!(updated.reason, "UpdateKnowledgeBase successful");
    assert_eq!(updated.data, created.data);
    assert_eq!(h.search.calls().len(), search_calls);
    assert_eq!(h.index.calls().len(), index_calls);
    assert_eq!(h.knowledge_base.calls().len(), kb_calls);
}

#[tokio::test]
async fn test_update_fails_when_state_missing() {
    let h = Harness::new();

    let response = h.provisioner.handle(&request(RequestType::Update, "req-1")).await;

    assert_eq!(response.status, ResponseStatus::Failed);
    assert!(response.reason.contains("/acme-ab12cd/"), "{}", response.reason);
    assert!(response.data.is_none());
}

#[tokio::test]
async fn test_update_fails_when_store_unreachable() {
    let h = Harness::new();
    h.provisioner.handle(&request(RequestType::Create, "req-1")).await;
    h.state.set_unavailable(true);

    let response = h.provisioner.handle(&request(RequestType::Update, "req-2")).await;

    assert_eq!(response.status, ResponseStatus::Failed);
    assert!(response.reason.contains("unavailable"));
}

#[tokio::test]
async fn test_delete_without_persisted_state_succeeds() {
    let h = Harness::new();

    let response = h.provisioner.handle(&request(RequestType::Delete, "req-1")).await;

    assert_eq!(response.status, ResponseStatus::Success);
    assert!(response.reason.starts_with("DeleteKnowledgeBase successful"));
    assert!(response.reason.contains("collection"), "{}", response.reason);
    // policies are addressed by name and still attempted
    assert_eq!(h.search.count("delete_access_policy"), 1);
    assert_eq!(h.search.count("delete_collection"), 0);
}

#[tokio::test]
async fn test_delete_removes_everything_and_is_repeatable() {
    let h = Harness::new();
    h.provisioner.handle(&request(RequestType::Create, "req-1")).await;

    let first = h.provisioner.handle(&request(RequestType::Delete, "req-2")).await;
    assert_eq!(first.status, ResponseStatus::Success);
    assert_eq!(first.reason, "DeleteKnowledgeBase successful");
    assert!(h.state.snapshot().await.is_empty());

    assert_eq!(
        h.search.calls()[h.search.calls().len() - 4..],
        [
            "delete_collection id-acme-ab12cd",
            "delete_encryption_policy acme-ab12cd",
            "delete_network_policy acme-ab12cd",
            "delete_access_policy acme-ab12cd",
        ]
    );
    assert_eq!(h.knowledge_base.count("delete_data_source"), 1);
    assert_eq!(h.knowledge_base.count("delete_knowledge_base"), 1);

    let second = h.provisioner.handle(&request(RequestType::Delete, "req-3")).await;
    assert_eq!(second.status, ResponseStatus::Success);
    assert!(second.reason.contains("failed"));
}

#[tokio::test]
async fn test_delete_purges_state_when_every_upstream_delete_fails() {
    let h = Harness::new();
    h.provisioner.handle(&request(RequestType::Create, "req-1")).await;
    for op in [
        "delete_access_policy",
        "delete_network_policy",
        "delete_encryption_policy",
        "delete_collection",
    ] {
        h.search.fail(op);
    }
    h.knowledge_base.fail("delete_knowledge_base");
    h.knowledge_base.fail("delete_data_source");

    let response = h.provisioner.handle(&request(RequestType::Delete, "req-2")).await;

    assert_eq!(response.status, ResponseStatus::Success);
    assert!(
        response.reason.contains("6 of 13 teardown steps failed"),
        "{}",
        response.reason
    );
    for attribute in Attribute::ALL {
        assert!(!h.state.contains(&key().path(attribute)).await);
    }
}

#[tokio::test]
async fn test_create_rolls_back_on_knowledge_base_failure() {
    let h = Harness::new();
    h.knowledge_base.fail("create_knowledge_base");

    let response = h.provisioner.handle(&request(RequestType::Create, "req-1")).await;

    assert_eq!(response.status, ResponseStatus::Failed);
    assert!(
        response.reason.starts_with("Failed to create knowledge base acme-ab12cd"),
        "{}",
        response.reason
    );
    assert!(response.data.is_none());

    assert_eq!(h.search.count("delete_collection"), 1);
    assert_eq!(h.search.count("delete_encryption_policy"), 1);
    assert_eq!(h.search.count("delete_network_policy"), 1);
    assert_eq!(h.search.count("delete_access_policy"), 1);
    assert_eq!(h.index.count("delete_index"), 1);
    assert_eq!(h.knowledge_base.count("delete_knowledge_base"), 0);
    assert!(h.state.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_create_without_rollback_keeps_completed_steps() {
    let settings = ProvisionSettings {
        rollback_on_failure: false,
        ..Default::default()
    };
    let h = Harness::with(FakeSearchApi::new(), settings);
    h.knowledge_base.fail("create_data_source");

    let response = h.provisioner.handle(&request(RequestType::Create, "req-1")).await;

    assert_eq!(response.status, ResponseStatus::Failed);
    assert!(response.reason.contains("data source"));
    assert_eq!(h.search.count("delete_collection"), 0);
    assert!(h.state.contains("/acme-ab12cd/knowledgeBaseId").await);
}

#[tokio::test]
async fn test_policy_failure_aborts_before_collection() {
    let h = Harness::new();
    h.search.fail("create_network_policy");

    let response = h.provisioner.handle(&request(RequestType::Create, "req-1")).await;

    assert_eq!(response.status, ResponseStatus::Failed);
    assert!(response.reason.contains("network policy"), "{}", response.reason);
    assert_eq!(h.search.count("create_collection"), 0);
    assert_eq!(h.search.count("delete_access_policy"), 1);
    assert_eq!(h.search.count("delete_network_policy"), 0);
}

#[tokio::test]
async fn test_rejected_index_creation_is_not_fatal() {
    let h = Harness::new();
    h.index.fail("create_index");

    let response = h.provisioner.handle(&request(RequestType::Create, "req-1")).await;

    assert_eq!(response.status, ResponseStatus::Success, "{}", response.reason);
    assert_eq!(h.index.count("create_index"), 1);
    assert!(!h.index.has_index("acme-ab12cd"));
}

#[tokio::test(start_paused = true)]
async fn test_collection_never_active_times_out() {
    let h = Harness::with(
        FakeSearchApi::new().active_after(None),
        ProvisionSettings::default(),
    );

    let response = h.provisioner.handle(&request(RequestType::Create, "req-1")).await;

    assert_eq!(response.status, ResponseStatus::Failed);
    assert_eq!(
        response.reason,
        "Timed out waiting for collection acme-ab12cd after 30 attempts"
    );
    assert_eq!(h.search.count("get_collection"), 30);
    // submitted collection is rolled back
    assert_eq!(h.search.count("delete_collection"), 1);
    assert_eq!(h.index.calls().len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_collection_active_on_later_attempt() {
    let settings = ProvisionSettings {
        collection_poll: PollConfig::new(Duration::from_secs(30), 30),
        ..Default::default()
    };
    let h = Harness::with(FakeSearchApi::new().active_after(Some(3)), settings);

    let started = tokio::time::Instant::now();
    let response = h.provisioner.handle(&request(RequestType::Create, "req-1")).await;

    assert!(response.is_success(), "{}", response.reason);
    assert_eq!(h.search.count("get_collection"), 3);
    assert!(started.elapsed() >= Duration::from_secs(60));
}

#[tokio::test]
async fn test_malformed_knowledge_base_response() {
    let h = Harness::new();
    h.knowledge_base.malformed_create();

    let response = h.provisioner.handle(&request(RequestType::Create, "req-1")).await;

    assert_eq!(response.status, ResponseStatus::Failed);
    assert!(response.reason.contains("missing the knowledge base id"));
}

#[tokio::test]
async fn test_concurrent_request_fails_fast_on_lease() {
    let h = Harness::new();
    h.provisioner.handle(&request(RequestType::Create, "req-1")).await;
    let lease = format!(
        r#"{{"holder":"req-other","acquired_at":"{}"}}"#,
        chrono::Utc::now().to_rfc3339()
    );
    h.state.put("/acme-ab12cd/lease", &lease).await.unwrap();

    let response = h.provisioner.handle(&request(RequestType::Delete, "req-2")).await;

    assert_eq!(response.status, ResponseStatus::Failed);
    assert!(response.reason.contains("locked by request req-other"));
    assert!(h.state.contains("/acme-ab12cd/collectionId").await);
}

#[tokio::test]
async fn test_invalid_name_is_rejected() {
    let h = Harness::new();
    let mut bad = request(RequestType::Create, "req-1");
    bad.resource_properties.name_prefix = "ACME".to_string();

    let response = h.provisioner.handle(&bad).await;

    assert_eq!(response.status, ResponseStatus::Failed);
    assert_eq!(response.physical_resource_id, "KnowledgeBase");
    assert!(h.search.calls().is_empty());
}

#[tokio::test]
async fn test_delete_with_invalid_name_succeeds() {
    let h = Harness::new();
    let mut bad = request(RequestType::Delete, "req-1");
    bad.resource_properties.name_prefix = "Acme".to_string();

    let response = h.provisioner.handle(&bad).await;

    assert_eq!(response.status, ResponseStatus::Success);
    assert!(
        response.reason.contains("nothing to delete"),
        "{}",
        response.reason
    );
    assert_eq!(response.physical_resource_id, "KnowledgeBase");
    assert!(h.search.calls().is_empty());
    assert!(h.knowledge_base.calls().is_empty());
}

#[tokio::test]
async fn test_failed_rollback_keeps_identifiers_for_delete() {
    let h = Harness::new();
    h.knowledge_base.fail("create_knowledge_base");
    h.search.fail("delete_collection");

    let created = h.provisioner.handle(&request(RequestType::Create, "req-1")).await;
    assert_eq!(created.status, ResponseStatus::Failed);
    assert_eq!(h.search.count("delete_collection"), 1);
    assert_eq!(
        h.state.get("/acme-ab12cd/collectionId").await.unwrap(),
        "id-acme-ab12cd"
    );

    let deleted = h.provisioner.handle(&request(RequestType::Delete, "req-2")).await;

    assert_eq!(deleted.status, ResponseStatus::Success);
    assert_eq!(h.search.count("delete_collection"), 2);
    assert!(h.state.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_rollback_keeps_index_it_did_not_create() {
    let h = Harness::new();
    h.index.add_index("acme-ab12cd");
    h.knowledge_base.fail("create_knowledge_base");

    let response = h.provisioner.handle(&request(RequestType::Create, "req-1")).await;

    assert_eq!(response.status, ResponseStatus::Failed);
    assert_eq!(h.index.count("create_index"), 0);
    assert_eq!(h.index.count("delete_index"), 0);
    assert!(h.index.has_index("acme-ab12cd"));
    assert_eq!(h.search.count("delete_collection"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_index_endpoint_is_not_fatal() {
    let h = Harness::new();
    h.index.fail("index_exists");

    let started = tokio::time::Instant::now();
    let response = h.provisioner.handle(&request(RequestType::Create, "req-1")).await;

    assert_eq!(response.status, ResponseStatus::Success, "{}", response.reason);
    assert_eq!(h.index.count("index_exists"), 30);
    assert_eq!(h.index.count("create_index"), 0);
    assert!(started.elapsed() >= Duration::from_secs(29 * 10));
    assert_eq!(h.knowledge_base.count("create_knowledge_base"), 1);
}

#[tokio::test]
async fn test_sync_starts_ingestion_job() {
    let h = Harness::new();

    let job = h
        .provisioner
        .data_sources()
        .sync_knowledge_base("KB1", "DS1", "token-0123456789abcdef0123456789abcdef", None)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(job.id, "JOB1");
    assert_eq!(h.knowledge_base.calls(), vec!["start_ingestion_job KB1/DS1"]);

    h.knowledge_base.fail("start_ingestion_job");
    let err = h
        .provisioner
        .data_sources()
        .sync_knowledge_base("KB1", "DS1", "token-0123456789abcdef0123456789abcdef", None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("ingestion job"));
}
