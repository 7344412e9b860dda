use mockito::{Matcher, ServerGuard};
use serde_json::{json, Value};
use std::time::Duration;

use tmc_provider::client::TmcClient;
use tmc_provider::config::PollSettings;
use tmc_provider::error::ProviderError;
use tmc_provider::resource_data::ResourceData;
use tmc_provider::resources::{ProviderContext, ResourceKind};

const CLUSTER_SCHEDULES: &str = "/v1alpha1/clusters/prod/dataprotection/schedules";
const GROUP_SCHEDULES: &str = "/v1alpha1/clustergroups/default/dataprotection/schedules";

async fn context(server: &ServerGuard) -> ProviderContext {
    let client = TmcClient::with_urls(&server.url(), &server.url(), "api-token");
    client.set_access_token("test-token").await;
    ProviderContext::with_client(
        client,
        PollSettings {
            interval: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
        },
    )
}

fn cluster_schedule() -> Value {
    json!({
        "name": "nightly",
        "backup_scope": "FULL_CLUSTER",
        "scope": [{"cluster": [{
            "cluster_name": "prod",
            "management_cluster_name": "attached",
            "provisioner_name": "attached"
        }]}],
        "spec": [{
            "schedule": [{"rate": "0 2 * * *"}],
            "template": [{"backup_ttl": "86400s", "excluded_namespaces": ["kube-system"]}]
        }]
    })
}

fn remote_schedule(phase: &str) -> String {
    json!({"schedule": {
        "fullName": {
            "managementClusterName": "attached",
            "provisionerName": "attached",
            "clusterName": "prod",
            "name": "nightly"
        },
        "meta": {"uid": "sch-1", "resourceVersion": "3"},
        "spec": {
            "schedule": {"rate": "0 2 * * *"},
            "template": {"ttl": "86400s", "excludedNamespaces": ["kube-system"]}
        },
        "status": {"phase": phase}
    }})
    .to_string()
}

fn data(attributes: Value) -> ResourceData {
    ResourceData::from_value("", attributes)
        .unwrap()
        .with_schema(ResourceKind::BackupSchedule.schema_keys())
}

#[tokio::test]
async fn test_create_cluster_schedule() {
    let mut server = mockito::Server::new_async().await;
    let post = server
        .mock("POST", CLUSTER_SCHEDULES)
        .match_header("authorization", "Bearer test-token")
        .match_body(Matcher::PartialJson(json!({"schedule": {
            "fullName": {
                "managementClusterName": "attached",
                "provisionerName": "attached",
                "clusterName": "prod",
                "name": "nightly"
            },
            "spec": {
                "schedule": {"rate": "0 2 * * *"},
                "template": {"ttl": "86400s", "excludedNamespaces": ["kube-system"]}
            }
        }})))
        .with_status(200)
        .with_body(remote_schedule("PENDING"))
        .expect(1)
        .create_async()
        .await;
    let get = server
        .mock("GET", format!("{}/nightly", CLUSTER_SCHEDULES).as_str())
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("fullName.managementClusterName".into(), "attached".into()),
            Matcher::UrlEncoded("fullName.provisionerName".into(), "attached".into()),
        ]))
        .with_status(200)
        .with_body(remote_schedule("ENABLED"))
        .expect_at_least(2)
        .create_async()
        .await;

    let ctx = context(&server).await;
    let mut state = data(cluster_schedule());
    ResourceKind::BackupSchedule.create(&ctx, &mut state).await.unwrap();

    assert_eq!(state.id(), "attached/attached/prod/nightly");
    assert_eq!(state.get("backup_scope"), Some(&json!("FULL_CLUSTER")));
    assert_eq!(state.get("status"), Some(&json!([{"phase": "ENABLED"}])));
    assert_eq!(state.get("meta"), Some(&json!([{"uid": "sch-1", "resource_version": "3"}])));
    assert_eq!(
        state.get("scope"),
        Some(&json!([{"cluster": [{
            "cluster_name": "prod",
            "management_cluster_name": "attached",
            "provisioner_name": "attached"
        }]}]))
    );
    post.assert_async().await;
    get.assert_async().await;
}

#[tokio::test]
async fn test_validation_errors_are_reported_before_any_request() {
    let mut server = mockito::Server::new_async().await;
    let post = server
        .mock("POST", CLUSTER_SCHEDULES)
        .expect(0)
        .create_async()
        .await;

    let mut attributes = cluster_schedule();
    attributes["backup_scope"] = json!("SET_NAMESPACES");
    attributes["spec"][0]["template"][0]["label_selector"] = json!([{"match_labels": {"app": "web"}}]);

    let ctx = context(&server).await;
    let err = ResourceKind::BackupSchedule
        .create(&ctx, &mut data(attributes))
        .await
        .unwrap_err();
    match err.root() {
        ProviderError::Validation(diags) => assert_eq!(diags.len(), 2),
        other => panic!("unexpected error {other}"),
    }
    assert!(err.to_string().starts_with("backup schedule attached/attached/prod/nightly"));
    post.assert_async().await;
}

#[tokio::test]
async fn test_missing_scope_is_a_configuration_error() {
    let server = mockito::Server::new_async().await;
    let mut attributes = cluster_schedule();
    attributes.as_object_mut().unwrap().remove("scope");

    let ctx = context(&server).await;
    let err = ResourceKind::BackupSchedule
        .create(&ctx, &mut data(attributes))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::UnknownScope { .. }));
    assert!(err.to_string().contains("cluster, cluster_group"));
}

#[tokio::test]
async fn test_failed_validation_phase_fails_create() {
    let mut server = mockito::Server::new_async().await;
    let _post = server
        .mock("POST", CLUSTER_SCHEDULES)
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;
    let get = server
        .mock("GET", format!("{}/nightly", CLUSTER_SCHEDULES).as_str())
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(remote_schedule("FAILEDVALIDATION"))
        .expect(1)
        .create_async()
        .await;

    let ctx = context(&server).await;
    let err = ResourceKind::BackupSchedule
        .create(&ctx, &mut data(cluster_schedule()))
        .await
        .unwrap_err();
    assert!(matches!(err.root(), ProviderError::FailedPhase { phase, .. } if phase == "FAILEDVALIDATION"));
    get.assert_async().await;
}

#[tokio::test]
async fn test_update_keeps_meta_identity_and_replaces_spec() {
    let mut server = mockito::Server::new_async().await;
    let _get = server
        .mock("GET", format!("{}/nightly", CLUSTER_SCHEDULES).as_str())
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(remote_schedule("ENABLED"))
        .create_async()
        .await;
    let put = server
        .mock("PUT", format!("{}/nightly", CLUSTER_SCHEDULES).as_str())
        .match_body(Matcher::PartialJson(json!({"schedule": {
            "meta": {"uid": "sch-1", "resourceVersion": "3"},
            "spec": {"paused": true, "schedule": {"rate": "0 3 * * *"}}
        }})))
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;

    let prior = cluster_schedule();
    let mut desired = prior.clone();
    desired["spec"][0]["paused"] = json!(true);
    desired["spec"][0]["schedule"] = json!([{"rate": "0 3 * * *"}]);
    let mut state = data(desired).with_prior(prior.as_object().cloned().unwrap());

    let ctx = context(&server).await;
    ResourceKind::BackupSchedule.update(&ctx, &mut state).await.unwrap();
    put.assert_async().await;
}

#[tokio::test]
async fn test_update_rejects_rename() {
    let server = mockito::Server::new_async().await;
    let prior = cluster_schedule();
    let mut desired = prior.clone();
    desired["name"] = json!("weekly");
    let mut state = data(desired).with_prior(prior.as_object().cloned().unwrap());

    let ctx = context(&server).await;
    let err = ResourceKind::BackupSchedule.update(&ctx, &mut state).await.unwrap_err();
    assert!(matches!(err, ProviderError::Validation(_)));
}

#[tokio::test]
async fn test_import_cluster_group_schedule() {
    let mut server = mockito::Server::new_async().await;
    let _get = server
        .mock("GET", format!("{}/nightly", GROUP_SCHEDULES).as_str())
        .with_status(200)
        .with_body(
            json!({"schedule": {
                "fullName": {"clusterGroupName": "default", "name": "nightly"},
                "spec": {"template": {"includedNamespaces": ["app"]}}
            }})
            .to_string(),
        )
        .create_async()
        .await;

    let ctx = context(&server).await;
    let mut state = data(json!({}));
    ResourceKind::BackupSchedule
        .import(&ctx, &mut state, "default/nightly")
        .await
        .unwrap();

    assert_eq!(state.id(), "default/nightly");
    assert_eq!(state.get("name"), Some(&json!("nightly")));
    assert_eq!(state.get("backup_scope"), Some(&json!("SET_NAMESPACES")));
    assert_eq!(
        state.get("scope"),
        Some(&json!([{"cluster_group": [{"cluster_group_name": "default"}]}]))
    );
}

#[tokio::test]
async fn test_read_of_deleted_schedule_clears_state() {
    let mut server = mockito::Server::new_async().await;
    let _get = server
        .mock("GET", format!("{}/nightly", CLUSTER_SCHEDULES).as_str())
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body(r#"{"error": "schedule not found"}"#)
        .create_async()
        .await;

    let ctx = context(&server).await;
    let mut state = data(cluster_schedule());
    state.set_id("attached/attached/prod/nightly");
    ResourceKind::BackupSchedule.read(&ctx, &mut state).await.unwrap();
    assert!(state.is_cleared());
}

#[tokio::test]
async fn test_delete_after_import_uses_id() {
    let mut server = mockito::Server::new_async().await;
    let delete = server
        .mock("DELETE", format!("{}/nightly", GROUP_SCHEDULES).as_str())
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let ctx = context(&server).await;
    let mut state = data(json!({}));
    state.set_id("default/nightly");
    ResourceKind::BackupSchedule.delete(&ctx, &mut state).await.unwrap();
    assert!(state.is_cleared());
    delete.assert_async().await;
}

#[tokio::test]
async fn test_data_source_rejects_writes() {
    let server = mockito::Server::new_async().await;
    let ctx = context(&server).await;
    let mut state = ResourceData::default();
    assert!(ResourceKind::Inspections.create(&ctx, &mut state).await.is_err());
    assert!(ResourceKind::GitRepository.import(&ctx, &mut state, "a/b").await.is_err());
}
