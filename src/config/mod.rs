//! # Configuration Management
//!
//! Environment-driven configuration for the secrets provider. Every loader
//! has a `from_env()` entry point and a `from_lookup()` variant that accepts
//! any key lookup, which is what the tests use.

pub mod settings;
pub mod tls;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use validator::Validate;

pub use settings::{LogFormat, ObservabilityConfig};
pub use tls::TrustAnchor;

use crate::authn::config::{optional, parse_or, required, DEFAULT_HTTP_TIMEOUT_SECS};
use crate::authn::AuthnConfig;
use crate::errors::{Error, Result};
use crate::secrets::annotations::parse_annotations_file;

pub const DEFAULT_SECRETS_BASE_PATH: &str = "/conjur/secrets";
pub const DEFAULT_ANNOTATIONS_FILE: &str = "/conjur/podinfo/annotations";

pub const SECRETS_DESTINATION_ANNOTATION: &str = "conjur.org/secrets-destination";
pub const K8S_SECRETS_ANNOTATION: &str = "conjur.org/k8s-secrets";

/// Where retrieved secrets are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretsDestination {
    /// Render secret groups into files on a shared volume.
    File,
    /// Patch platform-managed secret objects.
    K8sSecrets,
}

impl FromStr for SecretsDestination {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "file" => Ok(SecretsDestination::File),
            "k8s_secrets" => Ok(SecretsDestination::K8sSecrets),
            other => Err(Error::config(format!(
                "secrets destination {:?} is invalid; expected \"file\" or \"k8s_secrets\"",
                other
            ))),
        }
    }
}

impl fmt::Display for SecretsDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretsDestination::File => f.write_str("file"),
            SecretsDestination::K8sSecrets => f.write_str("k8s_secrets"),
        }
    }
}

/// Secret retrieval and delivery settings.
#[derive(Debug, Clone, Validate)]
pub struct SecretsConfig {
    #[validate(url(message = "CONJUR_APPLIANCE_URL must be a valid URL"))]
    pub appliance_url: String,

    #[validate(length(min = 1, message = "CONJUR_ACCOUNT cannot be empty"))]
    pub account: String,

    pub destination: SecretsDestination,

    /// Names of the platform secret objects to patch (`k8s_secrets` only).
    pub k8s_secrets: Vec<String>,

    pub pod_namespace: Option<String>,

    /// Root directory secret files must stay inside (`file` only).
    pub secrets_base_path: PathBuf,

    /// Pod annotations read from the Downward API file, if present.
    pub annotations: HashMap<String, String>,

    pub trust_anchor: TrustAnchor,

    pub http_timeout: Duration,
}

impl SecretsConfig {
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let annotations_file = optional(lookup, "ANNOTATIONS_FILE")
            .unwrap_or_else(|| DEFAULT_ANNOTATIONS_FILE.to_string());
        let annotations = load_annotations(Path::new(&annotations_file))?;

        let destination = optional(lookup, "SECRETS_DESTINATION")
            .or_else(|| annotations.get(SECRETS_DESTINATION_ANNOTATION).cloned())
            .ok_or_else(|| {
                Error::config(format!(
                    "SECRETS_DESTINATION or the {} annotation is required",
                    SECRETS_DESTINATION_ANNOTATION
                ))
            })?
            .parse::<SecretsDestination>()?;

        let pod_namespace = optional(lookup, "MY_POD_NAMESPACE");

        let k8s_secrets = match destination {
            SecretsDestination::K8sSecrets => {
                if pod_namespace.is_none() {
                    return Err(Error::config(
                        "MY_POD_NAMESPACE is required when secrets destination is k8s_secrets",
                    ));
                }
                k8s_secret_names(lookup, &annotations)?
            }
            SecretsDestination::File => Vec::new(),
        };

        let config = Self {
            appliance_url: required(lookup, "CONJUR_APPLIANCE_URL")?
                .trim_end_matches('/')
                .to_string(),
            account: required(lookup, "CONJUR_ACCOUNT")?,
            destination,
            k8s_secrets,
            pod_namespace,
            secrets_base_path: optional(lookup, "SECRETS_BASE_PATH")
                .unwrap_or_else(|| DEFAULT_SECRETS_BASE_PATH.to_string())
                .into(),
            annotations,
            trust_anchor: TrustAnchor::from_lookup(lookup)?,
            http_timeout: Duration::from_secs(parse_or(
                lookup,
                "CONJUR_HTTP_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?),
        };
        config.validate()?;
        Ok(config)
    }
}

fn load_annotations(path: &Path) -> Result<HashMap<String, String>> {
    if path.exists() {
        parse_annotations_file(path)
    } else {
        Ok(HashMap::new())
    }
}

fn k8s_secret_names(
    lookup: &dyn Fn(&str) -> Option<String>,
    annotations: &HashMap<String, String>,
) -> Result<Vec<String>> {
    let names: Vec<String> = if let Some(value) = optional(lookup, "K8S_SECRETS") {
        value.split(',').map(|name| name.trim().to_string()).collect()
    } else if let Some(value) = annotations.get(K8S_SECRETS_ANNOTATION) {
        serde_yaml::from_str::<Vec<String>>(value).map_err(|e| {
            Error::config(format!("{} annotation must be a YAML list: {}", K8S_SECRETS_ANNOTATION, e))
        })?
    } else {
        Vec::new()
    };

    let names: Vec<String> = names.into_iter().filter(|name| !name.is_empty()).collect();
    if names.is_empty() {
        return Err(Error::config(format!(
            "K8S_SECRETS or the {} annotation must name at least one secret",
            K8S_SECRETS_ANNOTATION
        )));
    }
    Ok(names)
}

/// Complete provider configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub authn: AuthnConfig,
    pub secrets: SecretsConfig,
}

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self { authn: AuthnConfig::from_lookup(lookup)?, secrets: SecretsConfig::from_lookup(lookup)? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";

    fn lookup_from(vars: Vec<(&'static str, String)>) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        move |key| vars.get(key).cloned()
    }

    fn base_vars(annotations: &Path) -> Vec<(&'static str, String)> {
        vec![
            ("CONJUR_APPLIANCE_URL", "https://conjur.example.com/".to_string()),
            ("CONJUR_AUTHN_URL", "https://conjur.example.com/authn-jwt/svc".to_string()),
            ("CONJUR_ACCOUNT", "myorg".to_string()),
            ("CONJUR_SSL_CERTIFICATE", PEM.to_string()),
            ("ANNOTATIONS_FILE", annotations.display().to_string()),
        ]
    }

    #[test]
    fn test_destination_from_annotation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("annotations");
        let mut file = std::fs::File::create(&path).expect("create");
        writeln!(file, "conjur.org/secrets-destination=\"file\"").expect("write");

        let config = Config::from_lookup(&lookup_from(base_vars(&path))).expect("config");
        assert_eq!(config.secrets.destination, SecretsDestination::File);
        assert_eq!(config.secrets.appliance_url, "https://conjur.example.com");
        assert_eq!(config.secrets.secrets_base_path, PathBuf::from(DEFAULT_SECRETS_BASE_PATH));
    }

    #[test]
    fn test_missing_destination_is_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Config::from_lookup(&lookup_from(base_vars(&dir.path().join("missing"))))
            .expect_err("no destination");
        assert!(err.to_string().contains("SECRETS_DESTINATION"));
    }

    #[test]
    fn test_k8s_secrets_list_from_env() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut vars = base_vars(&dir.path().join("missing"));
        vars.push(("SECRETS_DESTINATION", "k8s_secrets".to_string()));
        vars.push(("MY_POD_NAMESPACE", "apps".to_string()));
        vars.push(("K8S_SECRETS", "db-credentials, api-keys,".to_string()));

        let config = Config::from_lookup(&lookup_from(vars)).expect("config");
        assert_eq!(config.secrets.k8s_secrets, vec!["db-credentials", "api-keys"]);
    }

    #[test]
    fn test_k8s_secrets_required_for_k8s_destination() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut vars = base_vars(&dir.path().join("missing"));
        vars.push(("SECRETS_DESTINATION", "k8s_secrets".to_string()));
        vars.push(("MY_POD_NAMESPACE", "apps".to_string()));

        let err = Config::from_lookup(&lookup_from(vars)).expect_err("no secrets");
        assert!(err.to_string().contains("K8S_SECRETS"));
    }

    #[test]
    fn test_invalid_destination() {
        assert!("vault".parse::<SecretsDestination>().is_err());
    }
}
