//! Writing rendered secret groups to disk.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::Path;

use super::{Secret, SecretSpec};
use crate::errors::{Error, Result};

/// Require a one-to-one match between secrets and specs by alias.
pub fn validate_secrets_against_specs(secrets: &[Secret], specs: &[SecretSpec]) -> Result<()> {
    if secrets.len() != specs.len() {
        return Err(Error::data_integrity(format!(
            "number of secrets ({}) does not match number of secret specs ({})",
            secrets.len(),
            specs.len()
        )));
    }

    let present: HashSet<&str> = secrets.iter().map(|secret| secret.alias.as_str()).collect();
    let mut missing: Vec<&str> = specs
        .iter()
        .map(|spec| spec.alias.as_str())
        .filter(|alias| !present.contains(alias))
        .collect();

    if !missing.is_empty() {
        missing.sort_unstable();
        return Err(Error::data_integrity(format!(
            "some secret specs are not present in secrets {:?}",
            missing
        )));
    }

    Ok(())
}

/// Write `contents` to `path` with exactly `mode` permissions, creating
/// parent directories as needed and replacing any previous content.
pub fn write_secret_file(path: &Path, mode: u32, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }

    let mut file = options.open(path).map_err(|e| Error::io(path, e))?;

    // The creation mode is filtered by the umask and ignored for existing files.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(mode)).map_err(|e| Error::io(path, e))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    file.write_all(contents).map_err(|e| Error::io(path, e))?;
    file.flush().map_err(|e| Error::io(path, e))
}
