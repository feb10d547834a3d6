//! Secret spec declarations.
//!
//! A group annotation lists the secrets to fetch as YAML, either as a
//! mapping of `alias: path` or as a sequence whose items are bare paths or
//! single-entry `alias: path` mappings:
//!
//! ```yaml
//! - db/url
//! - password: db/password
//! ```

use std::collections::BTreeSet;

use serde_yaml::Value;

use crate::errors::{Error, Result};

/// Longest allowed final path segment of a variable path.
pub const MAX_VARIABLE_NAME_LEN: usize = 126;

/// Binding of an alias to a vault variable path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretSpec {
    pub alias: String,
    pub path: String,
}

impl SecretSpec {
    pub fn new(alias: impl Into<String>, path: impl Into<String>) -> Self {
        Self { alias: alias.into(), path: path.into() }
    }
}

/// Parse a YAML secret spec declaration, preserving declaration order.
pub fn parse_secret_specs(declaration: &str) -> Result<Vec<SecretSpec>> {
    let value: Value = serde_yaml::from_str(declaration)?;

    let specs = match value {
        Value::Null => Vec::new(),
        Value::Mapping(mapping) => mapping
            .into_iter()
            .map(|(alias, path)| spec_from_pair(alias, path))
            .collect::<Result<Vec<_>>>()?,
        Value::Sequence(items) => {
            items.into_iter().map(spec_from_item).collect::<Result<Vec<_>>>()?
        }
        other => {
            return Err(Error::config(format!(
                "secret specs must be a YAML list or mapping, got {}",
                value_kind(&other)
            )))
        }
    };

    if specs.is_empty() {
        return Err(Error::config("no secret specs declared"));
    }

    let mut seen = BTreeSet::new();
    let duplicates: BTreeSet<&str> = specs
        .iter()
        .filter(|spec| !seen.insert(spec.alias.as_str()))
        .map(|spec| spec.alias.as_str())
        .collect();
    if !duplicates.is_empty() {
        return Err(Error::config(format!("duplicate secret aliases {:?}", duplicates)));
    }

    Ok(specs)
}

fn spec_from_item(item: Value) -> Result<SecretSpec> {
    match item {
        Value::String(path) => {
            let alias = path.rsplit('/').next().unwrap_or_default().to_string();
            if alias.is_empty() {
                return Err(Error::config(format!(
                    "cannot derive an alias from secret path {:?}",
                    path
                )));
            }
            Ok(SecretSpec { alias, path })
        }
        Value::Mapping(mapping) if mapping.len() == 1 => {
            let Some((alias, path)) = mapping.into_iter().next() else {
                return Err(Error::config("empty secret spec mapping"));
            };
            spec_from_pair(alias, path)
        }
        Value::Mapping(mapping) => Err(Error::config(format!(
            "secret spec list items must map exactly one alias, found {}",
            mapping.len()
        ))),
        other => Err(Error::config(format!(
            "secret spec list items must be strings or mappings, got {}",
            value_kind(&other)
        ))),
    }
}

fn spec_from_pair(alias: Value, path: Value) -> Result<SecretSpec> {
    let alias = match alias {
        Value::String(alias) if !alias.trim().is_empty() => alias,
        other => {
            return Err(Error::config(format!(
                "secret alias must be a non-empty string, got {}",
                value_kind(&other)
            )))
        }
    };
    let Value::String(path) = path else {
        return Err(Error::config(format!("secret path for alias {:?} must be a string", alias)));
    };
    Ok(SecretSpec { alias, path })
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Check every spec path, returning one error per invalid path.
pub fn validate_secret_paths(specs: &[SecretSpec]) -> Vec<Error> {
    specs.iter().filter_map(|spec| validate_secret_path(&spec.path).err()).collect()
}

fn validate_secret_path(path: &str) -> Result<()> {
    let invalid = |reason: &str| Err(Error::config(format!("invalid secret path {:?}: {}", path, reason)));

    if path.trim().is_empty() {
        return invalid("path is empty");
    }
    if path.ends_with('/') {
        return invalid("path must not end with '/'");
    }
    if path.trim_start_matches('/').split('/').any(str::is_empty) {
        return invalid("path contains an empty segment");
    }
    let name = path.rsplit('/').next().unwrap_or(path);
    if name.chars().count() > MAX_VARIABLE_NAME_LEN {
        return invalid(&format!("variable name exceeds {} characters", MAX_VARIABLE_NAME_LEN));
    }
    Ok(())
}
