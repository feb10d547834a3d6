//! Batch secret retrieval from the vault.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::header::{HeaderValue, ACCEPT_ENCODING, AUTHORIZATION};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::SecretBytes;
use crate::config::{SecretsConfig, TrustAnchor};
use crate::errors::{Error, Result};
use crate::transport;

/// Fetches secret values by variable path.
#[async_trait]
pub trait SecretsRetriever: Send + Sync {
    /// Retrieve every path in one request. The result is keyed by full
    /// variable identifier (`<account>:variable:<path>`).
    async fn retrieve_secrets(
        &self,
        variable_paths: &[String],
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, SecretBytes>>;
}

/// Builds a retriever authorized by a freshly read access token.
pub trait RetrieverFactory: Send + Sync {
    fn create(&self, access_token: SecretBytes) -> Result<Box<dyn SecretsRetriever>>;
}

/// `<account>:variable:<path>`
pub fn variable_id(account: &str, path: &str) -> String {
    format!("{}:variable:{}", account, path)
}

/// Extract the variable path from a full variable identifier.
///
/// The identifier must have exactly three `:`-separated parts.
pub fn parse_variable_id(id: &str) -> Result<String> {
    let parts: Vec<&str> = id.split(':').collect();
    match parts.as_slice() {
        [_, _, path] => Ok(path.to_string()),
        _ => Err(Error::data_integrity(format!(
            "malformed variable id {:?}: expected <account>:variable:<path>",
            id
        ))),
    }
}

/// Creates [`ConjurSecretsRetriever`]s sharing one HTTPS client.
#[derive(Debug, Clone)]
pub struct ConjurRetrieverFactory {
    client: reqwest::Client,
    appliance_url: String,
    account: String,
}

impl ConjurRetrieverFactory {
    pub fn new(
        appliance_url: impl Into<String>,
        account: impl Into<String>,
        trust_anchor: &TrustAnchor,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: transport::build_client(trust_anchor, None, timeout)?,
            appliance_url: appliance_url.into().trim_end_matches('/').to_string(),
            account: account.into(),
        })
    }

    pub fn from_config(config: &SecretsConfig) -> Result<Self> {
        Self::new(
            config.appliance_url.clone(),
            config.account.clone(),
            &config.trust_anchor,
            config.http_timeout,
        )
    }
}

impl RetrieverFactory for ConjurRetrieverFactory {
    fn create(&self, access_token: SecretBytes) -> Result<Box<dyn SecretsRetriever>> {
        let encoded = STANDARD.encode(access_token.expose_secret());
        let mut authorization = HeaderValue::from_str(&format!("Token token=\"{}\"", encoded))
            .map_err(|e| Error::data_integrity(format!("access token is not a valid header: {}", e)))?;
        authorization.set_sensitive(true);

        Ok(Box::new(ConjurSecretsRetriever {
            client: self.client.clone(),
            appliance_url: self.appliance_url.clone(),
            account: self.account.clone(),
            authorization,
        }))
    }
}

/// Retriever for the vault's batch secrets endpoint.
pub struct ConjurSecretsRetriever {
    client: reqwest::Client,
    appliance_url: String,
    account: String,
    authorization: HeaderValue,
}

impl ConjurSecretsRetriever {
    async fn fetch(&self, variable_ids: String) -> Result<HashMap<String, SecretBytes>> {
        let request = self
            .client
            .get(format!("{}/secrets", self.appliance_url))
            .query(&[("variable_ids", variable_ids)])
            .header(AUTHORIZATION, self.authorization.clone())
            .header(ACCEPT_ENCODING, "base64");

        let body = transport::send(request, "batch secret retrieval").await?;
        let encoded: HashMap<String, String> = serde_json::from_slice(&body)?;

        encoded
            .into_iter()
            .map(|(id, value)| {
                let decoded = STANDARD.decode(value.as_bytes()).map_err(|e| {
                    Error::data_integrity(format!("value of {:?} is not valid base64: {}", id, e))
                })?;
                Ok((id, SecretBytes::new(decoded)))
            })
            .collect()
    }
}

#[async_trait]
impl SecretsRetriever for ConjurSecretsRetriever {
    async fn retrieve_secrets(
        &self,
        variable_paths: &[String],
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, SecretBytes>> {
        if variable_paths.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<String> =
            variable_paths.iter().map(|path| variable_id(&self.account, path)).collect();
        debug!(count = ids.len(), "Retrieving secrets");

        transport::cancellable(cancel, "batch secret retrieval", self.fetch(ids.join(","))).await
    }
}
