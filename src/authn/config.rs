//! Authenticator configuration.
//!
//! The authenticator variant is derived from the authentication URL: a path
//! containing `authn-jwt` selects JWT, `authn-k8s` selects platform identity.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use validator::Validate;

use crate::config::TrustAnchor;
use crate::errors::{Error, Result};

pub const DEFAULT_TOKEN_FILE_PATH: &str = "/run/conjur/access-token";
pub const DEFAULT_JWT_TOKEN_PATH: &str = "/var/run/secrets/tokens/jwt";
pub const DEFAULT_CLIENT_CERT_PATH: &str = "/etc/conjur/ssl/client.pem";
pub const DEFAULT_CLIENT_CERT_RETRY_COUNT_LIMIT: u32 = 10;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Supported authenticator variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthnType {
    Jwt,
    Kubernetes,
}

impl AuthnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthnType::Jwt => "authn-jwt",
            AuthnType::Kubernetes => "authn-k8s",
        }
    }

    /// Detect the variant from an authentication URL.
    pub fn from_authn_url(authn_url: &str) -> Result<Self> {
        if authn_url.contains("authn-jwt") {
            Ok(AuthnType::Jwt)
        } else if authn_url.contains("authn-k8s") {
            Ok(AuthnType::Kubernetes)
        } else {
            Err(Error::config(format!(
                "unrecognized authenticator type in CONJUR_AUTHN_URL {:?}",
                authn_url
            )))
        }
    }
}

impl fmt::Display for AuthnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host identity split into the prefix sent as `Host-Id-Prefix` (dotted,
/// `host.<policy>.<path>`) and the suffix used as the certificate common name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Username {
    full: String,
    prefix: String,
    suffix: String,
}

impl Username {
    pub fn parse(username: &str) -> Result<Self> {
        let username = username.trim();
        let (prefix, suffix) = username
            .strip_prefix("host/")
            .and_then(|_| username.rsplit_once('/'))
            .filter(|(_, suffix)| !suffix.is_empty())
            .ok_or_else(|| {
                Error::config(format!(
                    "username {:?} must be a host identity of the form host/<policy path>/<id>",
                    username
                ))
            })?;

        Ok(Self {
            full: username.to_string(),
            prefix: prefix.replace('/', "."),
            suffix: suffix.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.full
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

/// Settings shared by every authenticator variant.
#[derive(Debug, Clone, Validate)]
pub struct CommonAuthnConfig {
    #[validate(url(message = "CONJUR_AUTHN_URL must be a valid URL"))]
    pub authn_url: String,

    #[validate(length(min = 1, message = "CONJUR_ACCOUNT cannot be empty"))]
    pub account: String,

    pub trust_anchor: TrustAnchor,

    pub token_file_path: PathBuf,

    pub http_timeout: Duration,
}

impl CommonAuthnConfig {
    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let config = Self {
            authn_url: required(lookup, "CONJUR_AUTHN_URL")?.trim_end_matches('/').to_string(),
            account: required(lookup, "CONJUR_ACCOUNT")?,
            trust_anchor: TrustAnchor::from_lookup(lookup)?,
            token_file_path: optional(lookup, "CONJUR_AUTHN_TOKEN_FILE")
                .unwrap_or_else(|| DEFAULT_TOKEN_FILE_PATH.to_string())
                .into(),
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

/// JWT authenticator settings.
#[derive(Debug, Clone)]
pub struct JwtAuthnConfig {
    pub common: CommonAuthnConfig,
    /// Identity appended to the authenticate URL; `None` lets the vault
    /// derive the identity from the token claims.
    pub username: Option<String>,
    pub jwt_token_path: PathBuf,
}

/// Platform-identity (Kubernetes) authenticator settings.
#[derive(Debug, Clone)]
pub struct K8sAuthnConfig {
    pub common: CommonAuthnConfig,
    pub username: Username,
    pub pod_namespace: String,
    pub pod_name: String,
    pub client_cert_path: PathBuf,
    pub client_cert_retry_count_limit: u32,
    pub client_cert_poll_interval: Duration,
}

/// Authenticator configuration; one variant per supported authenticator.
#[derive(Debug, Clone)]
pub enum AuthnConfig {
    Jwt(JwtAuthnConfig),
    Kubernetes(K8sAuthnConfig),
}

impl AuthnConfig {
    /// Load authenticator configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// Load authenticator configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let authn_url = required(lookup, "CONJUR_AUTHN_URL")?;
        let authn_type = AuthnType::from_authn_url(&authn_url)?;
        let common = CommonAuthnConfig::from_lookup(lookup)?;

        match authn_type {
            AuthnType::Jwt => Ok(AuthnConfig::Jwt(JwtAuthnConfig {
                common,
                username: optional(lookup, "CONJUR_AUTHN_LOGIN"),
                jwt_token_path: optional(lookup, "JWT_TOKEN_PATH")
                    .unwrap_or_else(|| DEFAULT_JWT_TOKEN_PATH.to_string())
                    .into(),
            })),
            AuthnType::Kubernetes => {
                let version = optional(lookup, "CONJUR_VERSION").unwrap_or_else(|| "5".into());
                if version != "5" {
                    return Err(Error::config(format!(
                        "CONJUR_VERSION {:?} is not supported; only version 5 is supported",
                        version
                    )));
                }

                Ok(AuthnConfig::Kubernetes(K8sAuthnConfig {
                    common,
                    username: Username::parse(&required(lookup, "CONJUR_AUTHN_LOGIN")?)?,
                    pod_namespace: required(lookup, "MY_POD_NAMESPACE")?,
                    pod_name: required(lookup, "MY_POD_NAME")?,
                    client_cert_path: optional(lookup, "CONJUR_CLIENT_CERT_PATH")
                        .unwrap_or_else(|| DEFAULT_CLIENT_CERT_PATH.to_string())
                        .into(),
                    client_cert_retry_count_limit: parse_or(
                        lookup,
                        "CONJUR_CLIENT_CERT_RETRY_COUNT_LIMIT",
                        DEFAULT_CLIENT_CERT_RETRY_COUNT_LIMIT,
                    )?,
                    client_cert_poll_interval: Duration::from_secs(1),
                }))
            }
        }
    }

    pub fn authn_type(&self) -> AuthnType {
        match self {
            AuthnConfig::Jwt(_) => AuthnType::Jwt,
            AuthnConfig::Kubernetes(_) => AuthnType::Kubernetes,
        }
    }

    pub fn common(&self) -> &CommonAuthnConfig {
        match self {
            AuthnConfig::Jwt(config) => &config.common,
            AuthnConfig::Kubernetes(config) => &config.common,
        }
    }
}

pub(crate) fn optional(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

pub(crate) fn required(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    optional(lookup, key).ok_or_else(|| Error::config(format!("{} is required", key)))
}

pub(crate) fn parse_or<T: FromStr>(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match optional(lookup, key) {
        Some(value) => value
            .parse()
            .map_err(|_| Error::config(format!("{} has invalid value {:?}", key, value))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    const PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";

    #[test]
    fn test_jwt_config_from_lookup() {
        let lookup = lookup_from(&[
            ("CONJUR_AUTHN_URL", "https://conjur.example.com/authn-jwt/my-service/"),
            ("CONJUR_ACCOUNT", "myorg"),
            ("CONJUR_SSL_CERTIFICATE", PEM),
        ]);
        let config = AuthnConfig::from_lookup(&lookup).expect("config");
        let AuthnConfig::Jwt(jwt) = config else { panic!("expected JWT config") };
        assert_eq!(jwt.common.authn_url, "https://conjur.example.com/authn-jwt/my-service");
        assert_eq!(jwt.username, None);
        assert_eq!(jwt.jwt_token_path, PathBuf::from(DEFAULT_JWT_TOKEN_PATH));
        assert_eq!(jwt.common.token_file_path, PathBuf::from(DEFAULT_TOKEN_FILE_PATH));
    }

    #[test]
    fn test_k8s_config_requires_pod_identity() {
        let lookup = lookup_from(&[
            ("CONJUR_AUTHN_URL", "https://conjur.example.com/authn-k8s/cluster"),
            ("CONJUR_ACCOUNT", "myorg"),
            ("CONJUR_AUTHN_LOGIN", "host/conjur/authn-k8s/cluster/apps/app"),
            ("CONJUR_SSL_CERTIFICATE", PEM),
        ]);
        let err = AuthnConfig::from_lookup(&lookup).expect_err("missing namespace");
        assert!(err.to_string().contains("MY_POD_NAMESPACE"));
    }

    #[test]
    fn test_k8s_rejects_encrypted_token_version() {
        let lookup = lookup_from(&[
            ("CONJUR_AUTHN_URL", "https://conjur.example.com/authn-k8s/cluster"),
            ("CONJUR_ACCOUNT", "myorg"),
            ("CONJUR_AUTHN_LOGIN", "host/apps/app"),
            ("CONJUR_SSL_CERTIFICATE", PEM),
            ("MY_POD_NAMESPACE", "default"),
            ("MY_POD_NAME", "app-0"),
            ("CONJUR_VERSION", "4"),
        ]);
        let err = AuthnConfig::from_lookup(&lookup).expect_err("v4");
        assert!(err.to_string().contains("CONJUR_VERSION"));
    }

    #[test]
    fn test_unrecognized_authenticator_url() {
        let lookup = lookup_from(&[
            ("CONJUR_AUTHN_URL", "https://conjur.example.com/authn-ldap/corp"),
            ("CONJUR_ACCOUNT", "myorg"),
            ("CONJUR_SSL_CERTIFICATE", PEM),
        ]);
        let err = AuthnConfig::from_lookup(&lookup).expect_err("ldap");
        assert!(err.to_string().contains("unrecognized authenticator type"));
    }

    #[test]
    fn test_invalid_authn_url_fails_validation() {
        let lookup = lookup_from(&[
            ("CONJUR_AUTHN_URL", "authn-jwt/not a url"),
            ("CONJUR_ACCOUNT", "myorg"),
            ("CONJUR_SSL_CERTIFICATE", PEM),
        ]);
        assert!(AuthnConfig::from_lookup(&lookup).is_err());
    }

    #[test]
    fn test_username_split() {
        let username = Username::parse("host/conjur/authn-k8s/cluster/apps/app").expect("parse");
        assert_eq!(username.prefix(), "host.conjur.authn-k8s.cluster.apps");
        assert_eq!(username.suffix(), "app");
        assert!(Username::parse("admin").is_err());
        assert!(Username::parse("host/").is_err());
    }
}
