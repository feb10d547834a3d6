//! # Secrets Provider
//!
//! Wires configuration into an authenticator and a secrets handler and runs
//! one authenticate, retrieve and deliver cycle.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument};

use crate::authn::{new_authenticator, Authenticator};
use crate::config::{Config, SecretsDestination};
use crate::errors::{Error, Result};
use crate::handlers::{K8sSecretsHandler, PushToFileHandler, SecretsHandler};
use crate::k8s::{KubeApiConfig, KubeSecretsClient};
use crate::observability::{Event, Observer};
use crate::secrets::{new_secret_groups, ConjurRetrieverFactory};

/// One authenticator paired with one destination handler.
pub struct SecretsProvider {
    authenticator: Box<dyn Authenticator>,
    handler: Box<dyn SecretsHandler>,
    destination: SecretsDestination,
}

impl SecretsProvider {
    pub fn new(
        authenticator: Box<dyn Authenticator>,
        handler: Box<dyn SecretsHandler>,
        destination: SecretsDestination,
    ) -> Self {
        Self { authenticator, handler, destination }
    }

    /// Build the provider selected by `config`.
    ///
    /// In file mode the secret groups are resolved first, so annotation
    /// mistakes are reported before anything touches the filesystem or
    /// the network.
    pub fn from_config(config: &Config, observer: Arc<dyn Observer>) -> Result<Self> {
        let secrets = &config.secrets;

        match secrets.destination {
            SecretsDestination::File => {
                let groups = new_secret_groups(&secrets.secrets_base_path, &secrets.annotations)?;
                observer.observe(&Event::SecretGroupsResolved { count: groups.len() });

                let authenticator = new_authenticator(&config.authn, observer.clone())?;
                let handler = PushToFileHandler::new(
                    groups,
                    authenticator.access_token(),
                    Arc::new(ConjurRetrieverFactory::from_config(secrets)?),
                    observer,
                )?;
                Ok(Self::new(authenticator, Box::new(handler), SecretsDestination::File))
            }
            SecretsDestination::K8sSecrets => {
                let namespace = secrets.pod_namespace.clone().ok_or_else(|| {
                    Error::config("MY_POD_NAMESPACE is required for the k8s_secrets destination")
                })?;
                let kube = KubeSecretsClient::new(
                    KubeApiConfig::in_cluster(namespace, secrets.http_timeout)?,
                    secrets.k8s_secrets.clone(),
                )?;

                let authenticator = new_authenticator(&config.authn, observer.clone())?;
                let handler = K8sSecretsHandler::new(
                    authenticator.access_token(),
                    Arc::new(ConjurRetrieverFactory::from_config(secrets)?),
                    Arc::new(kube),
                    observer,
                );
                Ok(Self::new(authenticator, Box::new(handler), SecretsDestination::K8sSecrets))
            }
        }
    }

    pub fn destination(&self) -> SecretsDestination {
        self.destination
    }

    /// Authenticate, then deliver secrets. The first failure ends the cycle.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        let span = tracing::info_span!(
            "provide_secrets",
            destination = %self.destination,
            authn_type = %self.authenticator.authn_type()
        );

        async {
            self.authenticator.authenticate_with_cancel(cancel).await?;
            self.handler.handle_secrets(cancel).await?;
            info!("Secrets provided");
            Ok(())
        }
        .instrument(span)
        .await
    }
}
