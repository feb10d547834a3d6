//! Destination path resolution for secret files.
//!
//! Every secret file must land strictly inside the secrets base directory.
//! Paths are resolved lexically; nothing here touches the filesystem.

use std::path::{Component, Path, PathBuf};

use super::templates::FileFormat;
use crate::errors::{Error, Result};

/// Resolve the absolute destination of a group's secret file.
///
/// `file_path` is the annotation value, relative to `base`. A missing or
/// empty value, or one ending in `/`, names a directory; the file name is
/// then `<group>.<format>`. Directory intent combined with a custom template
/// is rejected because the format of a templated file is unknown.
pub fn absolute_file_path_for_group(
    base: &Path,
    group: &str,
    file_path: Option<&str>,
    has_template: bool,
    format: FileFormat,
) -> Result<PathBuf> {
    let file_path = file_path.unwrap_or_default();

    if file_path.starts_with('/') || Path::new(file_path).is_absolute() {
        return Err(Error::config(format!(
            "file path {:?} for secret group {:?} must be relative to {}",
            file_path,
            group,
            base.display()
        )));
    }

    let relative = if file_path.is_empty() || file_path.ends_with('/') {
        if has_template {
            return Err(Error::config(format!(
                "file path {:?} for secret group {:?} must include a file name when a custom template is used",
                file_path, group
            )));
        }
        format!("{}{}.{}", file_path, group, format)
    } else {
        file_path.to_string()
    };

    let base = lexical_clean(base);
    let resolved = lexical_clean(&base.join(&relative));
    if resolved == base || !resolved.starts_with(&base) {
        return Err(Error::config(format!(
            "file path {:?} for secret group {:?} escapes the secrets directory {}",
            file_path,
            group,
            base.display()
        )));
    }

    Ok(resolved)
}

/// Normalize `.` and `..` components without consulting the filesystem.
/// `..` at the root stays at the root.
pub fn lexical_clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    let mut normals = 0usize;

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                cleaned.push(component.as_os_str());
                normals = 0;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if normals > 0 {
                    cleaned.pop();
                    normals -= 1;
                } else if !cleaned.has_root() {
                    cleaned.push("..");
                }
            }
            Component::Normal(part) => {
                cleaned.push(part);
                normals += 1;
            }
        }
    }

    cleaned
}
