//! # Platform-Managed Secrets
//!
//! The Kubernetes-Secrets destination patches platform secret objects. Each
//! object declares which vault variables feed which of its data keys in a
//! `conjur-map` entry:
//!
//! ```yaml
//! DB_PASSWORD: prod/db/password
//! DB_USER: prod/db/user
//! ```

mod client;

pub use client::{KubeApiConfig, KubeSecretsClient};

use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::{Error, Result};
use crate::secrets::SecretBytes;

/// Data key holding the variable mapping of a managed secret.
pub const CONJUR_MAP_KEY: &str = "conjur-map";

/// Managed secret objects and where each vault variable goes.
#[derive(Debug, Clone, Default)]
pub struct ManagedSecretsMap {
    /// Object name to data key to value. Only entries to be patched.
    pub secrets: HashMap<String, HashMap<String, SecretBytes>>,
    /// Variable path to the `<object>:<dataKey>` locations it feeds.
    pub path_map: HashMap<String, Vec<String>>,
}

impl ManagedSecretsMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// `<object>:<dataKey>`
    pub fn location(object: &str, data_key: &str) -> String {
        format!("{}:{}", object, data_key)
    }

    /// Split a location back into object name and data key.
    pub fn split_location(location: &str) -> Result<(&str, &str)> {
        location
            .split_once(':')
            .filter(|(object, key)| !object.is_empty() && !key.is_empty())
            .ok_or_else(|| {
                Error::data_integrity(format!(
                    "malformed location {:?}: expected <object>:<dataKey>",
                    location
                ))
            })
    }

    /// Record that `path` feeds `data_key` of `object`.
    pub fn add_mapping(&mut self, object: &str, data_key: &str, path: &str) {
        self.secrets.entry(object.to_string()).or_default();
        self.path_map
            .entry(path.to_string())
            .or_default()
            .push(Self::location(object, data_key));
    }

    /// Store `value` at a location.
    pub fn set_value(&mut self, location: &str, value: SecretBytes) -> Result<()> {
        let (object, data_key) = Self::split_location(location)?;
        self.secrets.entry(object.to_string()).or_default().insert(data_key.to_string(), value);
        Ok(())
    }
}

/// Reads and patches platform secret objects.
#[async_trait]
pub trait ManagedSecretsHandler: Send + Sync {
    /// Read the managed objects and build their variable mapping.
    async fn retrieve_managed_secrets(&self) -> Result<ManagedSecretsMap>;

    /// Write the values in `secrets` into their objects.
    async fn patch_managed_secrets(&self, secrets: &ManagedSecretsMap) -> Result<()>;
}

/// Parse a `conjur-map` entry into `(dataKey, variablePath)` pairs.
pub fn parse_conjur_map(object: &str, raw: &[u8]) -> Result<Vec<(String, String)>> {
    let text = std::str::from_utf8(raw).map_err(|_| {
        Error::config(format!("{} of secret {:?} is not valid UTF-8", CONJUR_MAP_KEY, object))
    })?;

    let map: serde_yaml::Mapping = serde_yaml::from_str(text).map_err(|e| {
        Error::config(format!("{} of secret {:?} is not a YAML mapping: {}", CONJUR_MAP_KEY, object, e))
    })?;
    if map.is_empty() {
        return Err(Error::config(format!("{} of secret {:?} is empty", CONJUR_MAP_KEY, object)));
    }

    map.into_iter()
        .map(|(key, path)| match (key, path) {
            (serde_yaml::Value::String(key), serde_yaml::Value::String(path)) => Ok((key, path)),
            _ => Err(Error::config(format!(
                "{} of secret {:?} must map data keys to variable paths",
                CONJUR_MAP_KEY, object
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locations_round_trip() {
        let location = ManagedSecretsMap::location("db-credentials", "password");
        assert_eq!(
            ManagedSecretsMap::split_location(&location).expect("split"),
            ("db-credentials", "password")
        );
        assert!(ManagedSecretsMap::split_location("no-separator").is_err());
        assert!(ManagedSecretsMap::split_location(":key").is_err());
    }

    #[test]
    fn test_one_path_can_feed_many_locations() {
        let mut map = ManagedSecretsMap::new();
        map.add_mapping("a", "password", "db/password");
        map.add_mapping("b", "pw", "db/password");
        assert_eq!(map.path_map["db/password"], vec!["a:password", "b:pw"]);
        assert!(map.secrets["a"].is_empty());
    }

    #[test]
    fn test_parse_conjur_map() {
        let pairs = parse_conjur_map("db", b"user: db/user\npassword: db/password\n").expect("map");
        assert_eq!(pairs[0], ("user".to_string(), "db/user".to_string()));
        assert!(parse_conjur_map("db", b"- not a map").is_err());
        assert!(parse_conjur_map("db", b"{}").is_err());
        assert!(parse_conjur_map("db", b"port: 5432").is_err());
    }
}
