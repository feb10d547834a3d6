use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::SecretsHandler;
use crate::access_token::AccessToken;
use crate::config::SecretsDestination;
use crate::errors::{Error, GroupErrors, Result, Stage};
use crate::observability::{Event, Observer};
use crate::secrets::{new_secret_groups, parse_variable_id, RetrieverFactory, Secret, SecretBytes, SecretGroup};

/// Renders secret groups into files.
pub struct PushToFileHandler {
    groups: Vec<SecretGroup>,
    access_token: Arc<dyn AccessToken>,
    retriever_factory: Arc<dyn RetrieverFactory>,
    observer: Arc<dyn Observer>,
}

impl PushToFileHandler {
    pub fn new(
        groups: Vec<SecretGroup>,
        access_token: Arc<dyn AccessToken>,
        retriever_factory: Arc<dyn RetrieverFactory>,
        observer: Arc<dyn Observer>,
    ) -> Result<Self> {
        if groups.is_empty() {
            return Err(Error::config("no secret groups are declared in the pod annotations"));
        }
        Ok(Self { groups, access_token, retriever_factory, observer })
    }

    /// Resolve the groups declared in `annotations`; every configuration
    /// error is reported here, before any network or file I/O.
    pub fn from_annotations(
        secrets_base_path: &Path,
        annotations: &HashMap<String, String>,
        access_token: Arc<dyn AccessToken>,
        retriever_factory: Arc<dyn RetrieverFactory>,
        observer: Arc<dyn Observer>,
    ) -> Result<Self> {
        let groups = new_secret_groups(secrets_base_path, annotations)?;
        observer.observe(&Event::SecretGroupsResolved { count: groups.len() });
        Self::new(groups, access_token, retriever_factory, observer)
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        let token = self.access_token.read().map_err(|e| e.at_stage(Stage::ReadAccessToken))?;
        let retriever =
            self.retriever_factory.create(token).map_err(|e| e.at_stage(Stage::CreateRetriever))?;

        let paths: Vec<String> = self
            .groups
            .iter()
            .flat_map(|group| group.resolved_secret_specs())
            .map(|spec| spec.path)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let retrieved = retriever
            .retrieve_secrets(&paths, cancel)
            .await
            .map_err(|e| e.at_stage(Stage::RetrieveSecrets))?;
        self.observer.observe(&Event::SecretsRetrieved {
            destination: SecretsDestination::File,
            count: retrieved.len(),
        });

        let mut values: HashMap<String, SecretBytes> = HashMap::with_capacity(retrieved.len());
        for (id, value) in retrieved {
            let path = parse_variable_id(&id).map_err(|e| e.at_stage(Stage::RetrieveSecrets))?;
            values.insert(path, value);
        }

        let mut errors = GroupErrors::new();
        for group in &self.groups {
            if cancel.is_cancelled() {
                return Err(Error::cancelled("push secrets to file"));
            }

            let span = crate::group_span!(group.name, path = %group.file_path.display());
            let result = span.in_scope(|| group.push_to_file(&secrets_for_group(group, &values)));
            match result {
                Ok(()) => self.observer.observe(&Event::SecretFileWritten {
                    group: &group.name,
                    path: &group.file_path,
                }),
                Err(error) => {
                    self.observer.observe(&Event::SecretGroupFailed { group: &group.name, error: &error });
                    errors.push(error);
                }
            }
        }

        errors.into_result().map_err(|e| e.at_stage(Stage::PushToFile))
    }
}

/// Bind retrieved values to the group's aliases. Specs without a value are
/// left out, which push-time validation reports.
fn secrets_for_group(group: &SecretGroup, values: &HashMap<String, SecretBytes>) -> Vec<Secret> {
    group
        .resolved_secret_specs()
        .into_iter()
        .filter_map(|spec| {
            values.get(&spec.path).map(|value| Secret { alias: spec.alias, value: value.clone() })
        })
        .collect()
}

#[async_trait]
impl SecretsHandler for PushToFileHandler {
    async fn handle_secrets(&self, cancel: &CancellationToken) -> Result<()> {
        let span = crate::retrieval_span!(SecretsDestination::File, groups = self.groups.len());
        self.run(cancel).instrument(span).await
    }
}
