use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::AccessToken;
use crate::errors::{Error, Result};
use crate::secrets::SecretBytes;

const TOKEN_FILE_MODE: u32 = 0o600;

/// Token store backed by a file shared with the application container.
#[derive(Debug, Clone)]
pub struct FileAccessToken {
    path: PathBuf,
}

impl FileAccessToken {
    /// Open the store, creating the token's directory when needed.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AccessToken for FileAccessToken {
    fn read(&self) -> Result<SecretBytes> {
        let data = fs::read(&self.path).map_err(|e| Error::io(&self.path, e))?;
        if data.is_empty() {
            return Err(Error::data_integrity(format!(
                "access token file {} is empty",
                self.path.display()
            )));
        }
        Ok(SecretBytes::new(data))
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(TOKEN_FILE_MODE);
        }
        let mut file = options.open(&self.path).map_err(|e| Error::io(&self.path, e))?;
        // Tighten a pre-existing file before the token lands in it.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(TOKEN_FILE_MODE))
                .map_err(|e| Error::io(&self.path, e))?;
        }
        file.write_all(data).map_err(|e| Error::io(&self.path, e))?;
        debug!(path = %self.path.display(), bytes = data.len(), "Wrote access token");
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(&self.path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let token = FileAccessToken::new(dir.path().join("run/access-token")).expect("store");
        token.write(b"{\"protected\":\"abc\"}").expect("write");
        assert_eq!(token.read().expect("read").expose_secret(), b"{\"protected\":\"abc\"}");
    }

    #[test]
    fn test_missing_file_error_names_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("access-token");
        let token = FileAccessToken::new(&path).expect("store");
        let err = token.read().expect_err("missing token");
        assert!(err.to_string().contains(&path.display().to_string()));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let token = FileAccessToken::new(dir.path().join("access-token")).expect("store");
        token.write(b"value").expect("write");
        token.delete().expect("delete");
        token.delete().expect("second delete");
        assert!(token.read().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_token_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let token = FileAccessToken::new(dir.path().join("access-token")).expect("store");
        token.write(b"value").expect("write");
        let mode = fs::metadata(token.path()).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, TOKEN_FILE_MODE);
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_token_file_is_tightened_to_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("access-token");
        fs::write(&path, b"old").expect("seed");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).expect("chmod");

        let token = FileAccessToken::new(&path).expect("store");
        token.write(b"new").expect("write");

        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, TOKEN_FILE_MODE);
        assert_eq!(token.read().expect("read").expose_secret(), b"new");
    }
}
