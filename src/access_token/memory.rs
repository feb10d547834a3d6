use std::sync::RwLock;

use super::AccessToken;
use crate::errors::{Error, Result};
use crate::secrets::SecretBytes;

/// Process-local token store.
#[derive(Debug, Default)]
pub struct MemoryAccessToken {
    token: RwLock<Option<SecretBytes>>,
}

impl MemoryAccessToken {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccessToken for MemoryAccessToken {
    fn read(&self) -> Result<SecretBytes> {
        let guard =
            self.token.read().map_err(|_| Error::internal("access token lock poisoned"))?;
        guard.clone().ok_or(Error::MissingAccessToken)
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        let mut guard =
            self.token.write().map_err(|_| Error::internal("access token lock poisoned"))?;
        *guard = Some(SecretBytes::from(data));
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        let mut guard =
            self.token.write().map_err(|_| Error::internal("access token lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}
