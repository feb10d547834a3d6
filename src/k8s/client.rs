use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{parse_conjur_map, ManagedSecretsHandler, ManagedSecretsMap, CONJUR_MAP_KEY};
use crate::config::TrustAnchor;
use crate::errors::{Error, Result};
use crate::secrets::SecretBytes;
use crate::transport;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Connection settings for the platform API server.
#[derive(Debug, Clone)]
pub struct KubeApiConfig {
    pub api_url: String,
    pub bearer_token: SecretBytes,
    pub trust_anchor: TrustAnchor,
    pub namespace: String,
    pub request_timeout: Duration,
}

impl KubeApiConfig {
    /// Settings for a pod talking to its own cluster through the mounted
    /// service account.
    pub fn in_cluster(namespace: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| Error::config("KUBERNETES_SERVICE_HOST is not set; not running in a cluster"))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());
        let host = if host.contains(':') { format!("[{}]", host) } else { host };

        let account_dir = Path::new(SERVICE_ACCOUNT_DIR);
        let token_path = account_dir.join("token");
        let token = std::fs::read(&token_path).map_err(|e| Error::io(&token_path, e))?;
        let token = String::from_utf8_lossy(&token).trim().to_string();

        Ok(Self {
            api_url: format!("https://{}:{}", host, port),
            bearer_token: SecretBytes::from(token),
            trust_anchor: TrustAnchor::from_file(account_dir.join("ca.crt"))?,
            namespace: namespace.into(),
            request_timeout,
        })
    }
}

#[derive(Debug, Deserialize)]
struct KubeSecret {
    #[serde(default)]
    data: HashMap<String, String>,
}

/// REST client for the managed secret objects of one namespace.
pub struct KubeSecretsClient {
    client: reqwest::Client,
    api_url: String,
    namespace: String,
    bearer_token: SecretBytes,
    secret_names: Vec<String>,
}

impl KubeSecretsClient {
    pub fn new(config: KubeApiConfig, secret_names: Vec<String>) -> Result<Self> {
        Ok(Self {
            client: transport::build_client(&config.trust_anchor, None, config.request_timeout)?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            namespace: config.namespace,
            bearer_token: config.bearer_token,
            secret_names,
        })
    }

    fn secret_url(&self, name: &str) -> String {
        format!("{}/api/v1/namespaces/{}/secrets/{}", self.api_url, self.namespace, name)
    }

    fn bearer(&self) -> String {
        String::from_utf8_lossy(self.bearer_token.expose_secret()).into_owned()
    }

    async fn read_secret(&self, name: &str) -> Result<KubeSecret> {
        let request = self.client.get(self.secret_url(name)).bearer_auth(self.bearer());
        let body = transport::send(request, &format!("read secret {:?}", name)).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl ManagedSecretsHandler for KubeSecretsClient {
    async fn retrieve_managed_secrets(&self) -> Result<ManagedSecretsMap> {
        let mut map = ManagedSecretsMap::new();

        for name in &self.secret_names {
            let secret = self.read_secret(name).await?;
            let encoded = secret.data.get(CONJUR_MAP_KEY).ok_or_else(|| {
                Error::config(format!("secret {:?} has no {} data entry", name, CONJUR_MAP_KEY))
            })?;
            let raw = STANDARD.decode(encoded).map_err(|e| {
                Error::data_integrity(format!("{} of secret {:?} is not base64: {}", CONJUR_MAP_KEY, name, e))
            })?;

            let pairs = parse_conjur_map(name, &raw)?;
            debug!(secret = %name, keys = pairs.len(), "Read managed secret mapping");
            for (data_key, path) in pairs {
                map.add_mapping(name, &data_key, &path);
            }
        }

        Ok(map)
    }

    async fn patch_managed_secrets(&self, secrets: &ManagedSecretsMap) -> Result<()> {
        let mut names: Vec<&String> = secrets.secrets.keys().collect();
        names.sort();

        for name in names {
            let entries = &secrets.secrets[name];
            if entries.is_empty() {
                continue;
            }

            let data: serde_json::Map<String, serde_json::Value> = entries
                .iter()
                .map(|(key, value)| (key.clone(), STANDARD.encode(value.expose_secret()).into()))
                .collect();

            let request = self
                .client
                .patch(self.secret_url(name))
                .bearer_auth(self.bearer())
                .header(CONTENT_TYPE, "application/merge-patch+json")
                .body(json!({ "data": data }).to_string());
            transport::send(request, &format!("patch secret {:?}", name)).await?;
            info!(secret = %name, keys = entries.len(), "Patched managed secret");
        }

        Ok(())
    }
}
