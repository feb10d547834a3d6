//! Secret groups.
//!
//! A secret group is declared by pod annotations sharing a group-name
//! suffix:
//!
//! | Annotation | Meaning |
//! |---|---|
//! | `conjur.org/conjur-secrets.<group>` | YAML secret specs (required) |
//! | `conjur.org/conjur-secrets-policy-path.<group>` | prefix joined onto every spec path |
//! | `conjur.org/secret-file-path.<group>` | destination relative to the secrets directory |
//! | `conjur.org/secret-file-template.<group>` | custom Tera template |
//! | `conjur.org/secret-file-format.<group>` | `yaml`, `json`, `dotenv` or `bash` |
//! | `conjur.org/secret-file-permissions.<group>` | octal file mode, default `0664` |

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::path::absolute_file_path_for_group;
use super::push::{validate_secrets_against_specs, write_secret_file};
use super::spec::{parse_secret_specs, validate_secret_paths};
use super::templates::{check_template, file_template_for_format, render_template, FileFormat};
use super::{Secret, SecretSpec};
use crate::errors::{Error, GroupErrors, Result};

pub const SECRETS_ANNOTATION_PREFIX: &str = "conjur.org/conjur-secrets.";
pub const POLICY_PATH_ANNOTATION_PREFIX: &str = "conjur.org/conjur-secrets-policy-path.";
pub const FILE_PATH_ANNOTATION_PREFIX: &str = "conjur.org/secret-file-path.";
pub const FILE_TEMPLATE_ANNOTATION_PREFIX: &str = "conjur.org/secret-file-template.";
pub const FILE_FORMAT_ANNOTATION_PREFIX: &str = "conjur.org/secret-file-format.";
pub const FILE_PERMISSIONS_ANNOTATION_PREFIX: &str = "conjur.org/secret-file-permissions.";

pub const DEFAULT_FILE_PERMISSIONS: u32 = 0o664;

/// A named set of secrets rendered into one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretGroup {
    pub name: String,
    /// Absolute destination inside the secrets directory.
    pub file_path: PathBuf,
    /// Custom template; when absent one is derived from `file_format`.
    pub file_template: Option<String>,
    pub file_format: FileFormat,
    pub policy_path_prefix: Option<String>,
    pub file_permissions: u32,
    pub secret_specs: Vec<SecretSpec>,
}

impl SecretGroup {
    /// Specs with the policy path prefix applied. Does not modify the group.
    pub fn resolved_secret_specs(&self) -> Vec<SecretSpec> {
        let Some(prefix) = self.policy_path_prefix.as_deref() else {
            return self.secret_specs.clone();
        };

        self.secret_specs
            .iter()
            .map(|spec| SecretSpec {
                alias: spec.alias.clone(),
                path: format!(
                    "{}/{}",
                    prefix.trim_end_matches('/'),
                    spec.path.trim_start_matches('/')
                ),
            })
            .collect()
    }

    /// The custom template, or the one derived from the file format.
    pub fn template(&self) -> Result<String> {
        match &self.file_template {
            Some(template) => Ok(template.clone()),
            None => file_template_for_format(self.file_format, &self.secret_specs),
        }
    }

    /// Render `secrets` and write them to the group's file.
    ///
    /// The secrets must correspond one-to-one with the group's specs by
    /// alias. Rendering completes before the file is opened, so a failing
    /// template leaves any existing file untouched.
    pub fn push_to_file(&self, secrets: &[Secret]) -> Result<()> {
        validate_secrets_against_specs(secrets, &self.secret_specs)
            .map_err(|e| in_group(&self.name, e))?;
        let template = self.template()?;
        let rendered = render_template(&self.name, &template, secrets)?;
        write_secret_file(&self.file_path, self.file_permissions, rendered.as_bytes())?;
        debug!(group = %self.name, path = %self.file_path.display(), "Pushed secrets to file");
        Ok(())
    }
}

/// Resolve every secret group declared in `annotations`.
///
/// All configuration errors across all groups are collected and returned
/// together. Groups are returned sorted by name.
pub fn new_secret_groups(
    secrets_base_path: &Path,
    annotations: &HashMap<String, String>,
) -> Result<Vec<SecretGroup>> {
    let names: BTreeSet<&str> = annotations
        .keys()
        .filter_map(|key| key.strip_prefix(SECRETS_ANNOTATION_PREFIX))
        .collect();

    let mut errors = GroupErrors::new();
    let mut groups = Vec::with_capacity(names.len());

    for name in names {
        match new_secret_group(secrets_base_path, name, annotations) {
            Ok(group) => groups.push(group),
            Err(group_errors) => errors.extend(group_errors),
        }
    }

    errors.into_result()?;
    groups.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(groups)
}

/// Name the group in errors that do not already carry it.
fn in_group(name: &str, error: Error) -> Error {
    match error {
        Error::Config(message) => Error::config(format!("secret group {:?}: {}", name, message)),
        Error::DataIntegrity(message) => {
            Error::data_integrity(format!("secret group {:?}: {}", name, message))
        }
        Error::Yaml(source) => {
            Error::config(format!("secret group {:?}: invalid secret specs: {}", name, source))
        }
        other => other,
    }
}

fn new_secret_group(
    base: &Path,
    name: &str,
    annotations: &HashMap<String, String>,
) -> std::result::Result<SecretGroup, Vec<Error>> {
    let group_error = |error: Error| in_group(name, error);

    if name.is_empty() {
        return Err(vec![Error::config(format!(
            "annotation {:?} is missing a group name",
            SECRETS_ANNOTATION_PREFIX
        ))]);
    }

    let annotation = |prefix: &str| annotations.get(&format!("{}{}", prefix, name)).map(String::as_str);

    let declaration = annotation(SECRETS_ANNOTATION_PREFIX).unwrap_or_default();
    let secret_specs = parse_secret_specs(declaration).map_err(|e| vec![group_error(e)])?;

    let mut errors: Vec<Error> = validate_secret_paths(&secret_specs).into_iter().map(&group_error).collect();

    let format_annotation = annotation(FILE_FORMAT_ANNOTATION_PREFIX).filter(|f| !f.trim().is_empty());
    let file_format = match format_annotation {
        Some(format) => format.parse().unwrap_or_else(|e| {
            errors.push(group_error(e));
            FileFormat::default()
        }),
        None => FileFormat::default(),
    };

    let file_permissions = match annotation(FILE_PERMISSIONS_ANNOTATION_PREFIX) {
        Some(mode) => parse_file_permissions(mode).unwrap_or_else(|e| {
            errors.push(group_error(e));
            DEFAULT_FILE_PERMISSIONS
        }),
        None => DEFAULT_FILE_PERMISSIONS,
    };

    let file_template = annotation(FILE_TEMPLATE_ANNOTATION_PREFIX)
        .filter(|template| !template.trim().is_empty())
        .map(str::to_string);

    let file_path = absolute_file_path_for_group(
        base,
        name,
        annotation(FILE_PATH_ANNOTATION_PREFIX),
        file_template.is_some(),
        file_format,
    )
    .unwrap_or_else(|e| {
        errors.push(group_error(e));
        PathBuf::new()
    });

    // An explicit format must fit the aliases even when a custom template overrides it.
    if file_template.is_none() || format_annotation.is_some() {
        if let Err(e) = file_template_for_format(file_format, &secret_specs) {
            errors.push(group_error(e));
        }
    }
    if let Some(template) = &file_template {
        if let Err(e) = check_template(name, template, &secret_specs) {
            errors.push(group_error(e));
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(SecretGroup {
        name: name.to_string(),
        file_path,
        file_template,
        file_format,
        policy_path_prefix: annotation(POLICY_PATH_ANNOTATION_PREFIX)
            .map(str::trim)
            .filter(|prefix| !prefix.is_empty())
            .map(str::to_string),
        file_permissions,
        secret_specs,
    })
}

fn parse_file_permissions(mode: &str) -> Result<u32> {
    let mode = mode.trim();
    let digits = mode.strip_prefix("0o").unwrap_or(mode);
    match u32::from_str_radix(digits, 8) {
        Ok(bits) if bits <= 0o777 => Ok(bits),
        _ => Err(Error::config(format!(
            "file permissions {:?} must be an octal mode no greater than 0777",
            mode
        ))),
    }
}
