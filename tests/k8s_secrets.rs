//! Kubernetes-Secrets delivery with fake collaborators and a mock API server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use secrets_provider::access_token::{AccessToken, MemoryAccessToken};
use secrets_provider::errors::Stage;
use secrets_provider::handlers::{K8sSecretsHandler, SecretsHandler};
use secrets_provider::k8s::{KubeApiConfig, KubeSecretsClient, ManagedSecretsHandler};
use secrets_provider::observability::MemoryObserver;
use secrets_provider::secrets::SecretBytes;
use secrets_provider::{Error, ErrorKind};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{FakeManagedSecrets, StaticRetrieverFactory};

fn written_token() -> Arc<MemoryAccessToken> {
    let token = Arc::new(MemoryAccessToken::new());
    token.write(b"vault-token").expect("write token");
    token
}

fn stage_of(error: &Error) -> Option<Stage> {
    match error {
        Error::Stage { stage, .. } => Some(*stage),
        _ => None,
    }
}

#[tokio::test]
async fn test_values_fan_out_to_every_location() {
    let retriever = StaticRetrieverFactory::new(&[("db/user", "admin"), ("db/pass", "hunter2")]);
    let managed = Arc::new(FakeManagedSecrets::new(&[
        ("app-db", "username", "db/user"),
        ("app-db", "password", "db/pass"),
        ("backup-db", "password", "db/pass"),
    ]));
    let observer = Arc::new(MemoryObserver::new());

    let handler = K8sSecretsHandler::new(
        written_token(),
        Arc::new(retriever.clone()),
        managed.clone(),
        observer.clone(),
    );
    handler.handle_secrets(&CancellationToken::new()).await.expect("handle");

    assert_eq!(retriever.tokens(), vec![b"vault-token".to_vec()]);
    assert_eq!(
        retriever.requested(),
        vec![vec!["db/pass".to_string(), "db/user".to_string()]]
    );

    let patched = managed.patched.lock().expect("lock").clone().expect("patched");
    assert_eq!(patched["app-db"]["username"], b"admin");
    assert_eq!(patched["app-db"]["password"], b"hunter2");
    assert_eq!(patched["backup-db"]["password"], b"hunter2");
    assert_eq!(observer.names(), vec!["secrets_retrieved", "managed_secrets_patched"]);
}

#[tokio::test]
async fn test_missing_access_token_fails_first_stage() {
    let managed = Arc::new(FakeManagedSecrets::new(&[("app-db", "password", "db/pass")]));
    let handler = K8sSecretsHandler::new(
        Arc::new(MemoryAccessToken::new()),
        Arc::new(StaticRetrieverFactory::new(&[])),
        managed.clone(),
        Arc::new(MemoryObserver::new()),
    );

    let err = handler.handle_secrets(&CancellationToken::new()).await.expect_err("no token");
    assert_eq!(stage_of(&err), Some(Stage::ReadAccessToken));
    assert!(managed.patched.lock().expect("lock").is_none());
}

#[tokio::test]
async fn test_no_mappings_fails_before_retrieval() {
    let retriever = StaticRetrieverFactory::new(&[]);
    let handler = K8sSecretsHandler::new(
        written_token(),
        Arc::new(retriever.clone()),
        Arc::new(FakeManagedSecrets::new(&[])),
        Arc::new(MemoryObserver::new()),
    );

    let err = handler.handle_secrets(&CancellationToken::new()).await.expect_err("empty");
    assert_eq!(stage_of(&err), Some(Stage::CollectVariableIds));
    assert!(retriever.requested().is_empty());
}

#[tokio::test]
async fn test_retrieval_failure_persists_nothing() {
    let managed = Arc::new(FakeManagedSecrets::new(&[("app-db", "password", "db/missing")]));
    let handler = K8sSecretsHandler::new(
        written_token(),
        Arc::new(StaticRetrieverFactory::new(&[])),
        managed.clone(),
        Arc::new(MemoryObserver::new()),
    );

    let err = handler.handle_secrets(&CancellationToken::new()).await.expect_err("404");
    assert_eq!(stage_of(&err), Some(Stage::RetrieveSecrets));
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(managed.patched.lock().expect("lock").is_none());
}

#[tokio::test]
async fn test_patch_failure_is_reported_with_its_stage() {
    let mut managed = FakeManagedSecrets::new(&[("app-db", "password", "db/pass")]);
    managed.fail_patch = true;
    let handler = K8sSecretsHandler::new(
        written_token(),
        Arc::new(StaticRetrieverFactory::new(&[("db/pass", "hunter2")])),
        Arc::new(managed),
        Arc::new(MemoryObserver::new()),
    );

    let err = handler.handle_secrets(&CancellationToken::new()).await.expect_err("403");
    assert_eq!(stage_of(&err), Some(Stage::PatchManagedSecrets));
    assert!(err.to_string().starts_with("failed to patch managed secrets"));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let handler = K8sSecretsHandler::new(
        written_token(),
        Arc::new(StaticRetrieverFactory::new(&[("db/pass", "hunter2")])),
        Arc::new(FakeManagedSecrets::new(&[("app-db", "password", "db/pass")])),
        Arc::new(MemoryObserver::new()),
    );

    let err = handler.handle_secrets(&cancel).await.expect_err("cancelled");
    assert!(err.is_cancelled());
}

fn kube_client(server: &MockServer, names: &[&str]) -> KubeSecretsClient {
    KubeSecretsClient::new(
        KubeApiConfig {
            api_url: server.uri(),
            bearer_token: SecretBytes::from("sa-token"),
            trust_anchor: common::trust_anchor(),
            namespace: "apps".to_string(),
            request_timeout: Duration::from_secs(5),
        },
        names.iter().map(|name| name.to_string()).collect(),
    )
    .expect("client")
}

#[tokio::test]
async fn test_kube_client_reads_maps_and_patches_values() {
    let server = MockServer::start().await;
    let conjur_map = STANDARD.encode("username: db/user\npassword: db/pass\n");

    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/apps/secrets/app-db"))
        .and(header("Authorization", "Bearer sa-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metadata": { "name": "app-db" },
            "data": { "conjur-map": conjur_map }
        })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/v1/namespaces/apps/secrets/app-db"))
        .and(header("Content-Type", "application/merge-patch+json"))
        .and(body_json(json!({
            "data": {
                "username": STANDARD.encode("admin"),
                "password": STANDARD.encode("hunter2")
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = kube_client(&server, &["app-db"]);
    let handler = K8sSecretsHandler::new(
        written_token(),
        Arc::new(StaticRetrieverFactory::new(&[("db/user", "admin"), ("db/pass", "hunter2")])),
        Arc::new(client),
        Arc::new(MemoryObserver::new()),
    );
    handler.handle_secrets(&CancellationToken::new()).await.expect("handle");
}

#[tokio::test]
async fn test_kube_client_requires_conjur_map() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/apps/secrets/plain"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {} })))
        .mount(&server)
        .await;

    let err = kube_client(&server, &["plain"])
        .retrieve_managed_secrets()
        .await
        .expect_err("no map");
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.to_string().contains("conjur-map"));
}
