use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};

use super::SecretsHandler;
use crate::access_token::AccessToken;
use crate::config::SecretsDestination;
use crate::errors::{Error, Result, Stage};
use crate::k8s::{ManagedSecretsHandler, ManagedSecretsMap};
use crate::observability::{Event, Observer};
use crate::secrets::{parse_variable_id, RetrieverFactory, SecretBytes};
use crate::transport;

/// Fills platform-managed secret objects with vault values.
pub struct K8sSecretsHandler {
    access_token: Arc<dyn AccessToken>,
    retriever_factory: Arc<dyn RetrieverFactory>,
    managed_secrets: Arc<dyn ManagedSecretsHandler>,
    observer: Arc<dyn Observer>,
}

impl K8sSecretsHandler {
    pub fn new(
        access_token: Arc<dyn AccessToken>,
        retriever_factory: Arc<dyn RetrieverFactory>,
        managed_secrets: Arc<dyn ManagedSecretsHandler>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self { access_token, retriever_factory, managed_secrets, observer }
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        let token = self.access_token.read().map_err(|e| e.at_stage(Stage::ReadAccessToken))?;
        let retriever =
            self.retriever_factory.create(token).map_err(|e| e.at_stage(Stage::CreateRetriever))?;

        let mut managed = transport::cancellable(
            cancel,
            "retrieve managed secrets",
            self.managed_secrets.retrieve_managed_secrets(),
        )
        .await
        .map_err(|e| e.at_stage(Stage::RetrieveManagedSecrets))?;

        let paths = variable_ids_to_retrieve(&managed.path_map)
            .map_err(|e| e.at_stage(Stage::CollectVariableIds))?;

        let retrieved = retriever
            .retrieve_secrets(&paths, cancel)
            .await
            .map_err(|e| e.at_stage(Stage::RetrieveSecrets))?;
        self.observer.observe(&Event::SecretsRetrieved {
            destination: SecretsDestination::K8sSecrets,
            count: retrieved.len(),
        });

        update_managed_secrets(&mut managed, retrieved)
            .map_err(|e| e.at_stage(Stage::UpdateManagedSecrets))?;

        transport::cancellable(
            cancel,
            "patch managed secrets",
            self.managed_secrets.patch_managed_secrets(&managed),
        )
        .await
        .map_err(|e| e.at_stage(Stage::PatchManagedSecrets))?;

        self.observer.observe(&Event::ManagedSecretsPatched { count: managed.secrets.len() });
        Ok(())
    }
}

#[async_trait]
impl SecretsHandler for K8sSecretsHandler {
    async fn handle_secrets(&self, cancel: &CancellationToken) -> Result<()> {
        let span = crate::retrieval_span!(SecretsDestination::K8sSecrets);
        self.run(cancel).instrument(span).await
    }
}

/// Distinct variable paths referenced by the mapping, sorted.
pub fn variable_ids_to_retrieve(path_map: &HashMap<String, Vec<String>>) -> Result<Vec<String>> {
    if path_map.is_empty() {
        return Err(Error::config("managed secrets do not reference any vault variables"));
    }
    let mut paths: Vec<String> = path_map.keys().cloned().collect();
    paths.sort();
    Ok(paths)
}

/// Write every retrieved value into each location its variable feeds.
pub fn update_managed_secrets(
    managed: &mut ManagedSecretsMap,
    retrieved: HashMap<String, SecretBytes>,
) -> Result<()> {
    for (id, value) in retrieved {
        let path = parse_variable_id(&id)?;
        let Some(locations) = managed.path_map.get(&path).cloned() else {
            debug!(variable = %path, "Retrieved variable has no managed location");
            continue;
        };
        for location in locations {
            managed.set_value(&location, value.clone())?;
        }
    }
    Ok(())
}
