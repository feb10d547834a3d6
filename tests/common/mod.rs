//! Common test utilities for all integration tests.
//!
//! Provides trust material, authenticator configuration pointing at a mock
//! vault, and fake collaborators.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use secrets_provider::authn::{CommonAuthnConfig, JwtAuthnConfig, K8sAuthnConfig, Username};
use secrets_provider::config::TrustAnchor;
use secrets_provider::k8s::{ManagedSecretsHandler, ManagedSecretsMap};
use secrets_provider::secrets::{RetrieverFactory, SecretBytes, SecretsRetriever};
use secrets_provider::{Error, Result};
use tokio_util::sync::CancellationToken;

pub const ACCOUNT: &str = "myorg";

/// Self-signed CA PEM usable as a trust anchor.
pub fn trust_anchor() -> TrustAnchor {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .expect("generate certificate");
    TrustAnchor::from_pem(cert.cert.pem())
}

pub fn common_config(authn_url: &str, token_dir: &Path) -> CommonAuthnConfig {
    CommonAuthnConfig {
        authn_url: authn_url.to_string(),
        account: ACCOUNT.to_string(),
        trust_anchor: trust_anchor(),
        token_file_path: token_dir.join("access-token"),
        http_timeout: Duration::from_secs(5),
    }
}

pub fn jwt_config(server_uri: &str, dir: &Path, username: Option<&str>) -> JwtAuthnConfig {
    JwtAuthnConfig {
        common: common_config(&format!("{}/authn-jwt/my-service", server_uri), dir),
        username: username.map(str::to_string),
        jwt_token_path: dir.join("jwt"),
    }
}

pub fn k8s_config(server_uri: &str, dir: &Path) -> K8sAuthnConfig {
    K8sAuthnConfig {
        common: common_config(&format!("{}/authn-k8s/my-cluster", server_uri), dir),
        username: Username::parse("host/conjur/authn-k8s/my-cluster/apps/my-app").expect("username"),
        pod_namespace: "apps".to_string(),
        pod_name: "my-app-0".to_string(),
        client_cert_path: dir.join("client.pem"),
        client_cert_retry_count_limit: 5,
        client_cert_poll_interval: Duration::from_millis(20),
    }
}

/// Body of the vault's batch secrets response for `(path, value)` pairs.
pub fn batch_response(secrets: &[(&str, &str)]) -> serde_json::Value {
    let body: serde_json::Map<String, serde_json::Value> = secrets
        .iter()
        .map(|(path, value)| {
            (format!("{}:variable:{}", ACCOUNT, path), STANDARD.encode(value).into())
        })
        .collect();
    serde_json::Value::Object(body)
}

/// Retriever answering from a fixed table of variable paths, recording the
/// tokens it was created with and the paths it was asked for.
#[derive(Clone, Default)]
pub struct StaticRetrieverFactory {
    state: Arc<RetrieverState>,
}

#[derive(Default)]
struct RetrieverState {
    values: HashMap<String, String>,
    requested: Mutex<Vec<Vec<String>>>,
    tokens: Mutex<Vec<Vec<u8>>>,
}

impl StaticRetrieverFactory {
    pub fn new(values: &[(&str, &str)]) -> Self {
        Self {
            state: Arc::new(RetrieverState {
                values: values.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                ..RetrieverState::default()
            }),
        }
    }

    pub fn requested(&self) -> Vec<Vec<String>> {
        self.state.requested.lock().expect("lock").clone()
    }

    pub fn tokens(&self) -> Vec<Vec<u8>> {
        self.state.tokens.lock().expect("lock").clone()
    }
}

impl RetrieverFactory for StaticRetrieverFactory {
    fn create(&self, access_token: SecretBytes) -> Result<Box<dyn SecretsRetriever>> {
        self.state.tokens.lock().expect("lock").push(access_token.expose_secret().to_vec());
        Ok(Box::new(StaticRetriever { state: self.state.clone() }))
    }
}

struct StaticRetriever {
    state: Arc<RetrieverState>,
}

#[async_trait]
impl SecretsRetriever for StaticRetriever {
    async fn retrieve_secrets(
        &self,
        variable_paths: &[String],
        _cancel: &CancellationToken,
    ) -> Result<HashMap<String, SecretBytes>> {
        self.state.requested.lock().expect("lock").push(variable_paths.to_vec());
        variable_paths
            .iter()
            .map(|path| {
                let id = format!("{}:variable:{}", ACCOUNT, path);
                match self.state.values.get(path) {
                    Some(value) => Ok((id, SecretBytes::from(value.as_str()))),
                    None => Err(Error::Http {
                        context: "batch secret retrieval".into(),
                        status: 404,
                        body: format!("variable {} not found", id),
                    }),
                }
            })
            .collect()
    }
}

/// In-memory managed secrets store that records patches.
pub struct FakeManagedSecrets {
    pub mappings: Vec<(String, String, String)>,
    pub patched: Mutex<Option<HashMap<String, HashMap<String, Vec<u8>>>>>,
    pub fail_patch: bool,
}

impl FakeManagedSecrets {
    pub fn new(mappings: &[(&str, &str, &str)]) -> Self {
        Self {
            mappings: mappings
                .iter()
                .map(|(o, k, p)| (o.to_string(), k.to_string(), p.to_string()))
                .collect(),
            patched: Mutex::new(None),
            fail_patch: false,
        }
    }
}

#[async_trait]
impl ManagedSecretsHandler for FakeManagedSecrets {
    async fn retrieve_managed_secrets(&self) -> Result<ManagedSecretsMap> {
        let mut map = ManagedSecretsMap::new();
        for (object, key, path) in &self.mappings {
            map.add_mapping(object, key, path);
        }
        Ok(map)
    }

    async fn patch_managed_secrets(&self, secrets: &ManagedSecretsMap) -> Result<()> {
        if self.fail_patch {
            return Err(Error::Http { context: "patch".into(), status: 403, body: String::new() });
        }
        let snapshot = secrets
            .secrets
            .iter()
            .map(|(object, entries)| {
                let entries = entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.expose_secret().to_vec()))
                    .collect();
                (object.clone(), entries)
            })
            .collect();
        *self.patched.lock().expect("lock") = Some(snapshot);
        Ok(())
    }
}
