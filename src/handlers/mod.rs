//! # Secrets Handlers
//!
//! A handler runs one retrieve-and-deliver cycle for a destination, using
//! whatever access token the authenticator last stored.

mod k8s_secrets;
mod push_to_file;

pub use k8s_secrets::{update_managed_secrets, variable_ids_to_retrieve, K8sSecretsHandler};
pub use push_to_file::PushToFileHandler;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::Result;

/// Delivers secrets to one destination.
#[async_trait]
pub trait SecretsHandler: Send + Sync {
    async fn handle_secrets(&self, cancel: &CancellationToken) -> Result<()>;
}
