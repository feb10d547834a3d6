//! # Authentication
//!
//! Authenticators exchange a workload credential for a short-lived vault
//! access token and store it in an [`AccessToken`]. Two variants exist:
//!
//! - [`JwtAuthenticator`]: posts a projected service-account JWT.
//! - [`K8sAuthenticator`]: obtains a client certificate through a CSR and
//!   authenticates over mutual TLS.
//!
//! Use [`new_authenticator`] to construct the variant selected by
//! configuration.

pub mod config;
mod jwt;
mod k8s;
mod session_key;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use config::{AuthnConfig, AuthnType, CommonAuthnConfig, JwtAuthnConfig, K8sAuthnConfig, Username};
pub use jwt::JwtAuthenticator;
pub use k8s::K8sAuthenticator;
pub use session_key::{SessionKey, SESSION_KEY_BITS};

use crate::access_token::{AccessToken, FileAccessToken};
use crate::errors::Result;
use crate::observability::Observer;

/// Exchanges a workload credential for a vault access token.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate with no way to cancel.
    async fn authenticate(&self) -> Result<()> {
        self.authenticate_with_cancel(&CancellationToken::new()).await
    }

    /// Authenticate, aborting with a cancellation error when `cancel` fires.
    ///
    /// On success the access token store holds the vault's response body.
    async fn authenticate_with_cancel(&self, cancel: &CancellationToken) -> Result<()>;

    /// The store this authenticator writes to.
    fn access_token(&self) -> Arc<dyn AccessToken>;

    fn authn_type(&self) -> AuthnType;
}

/// Build the authenticator selected by `config`, storing tokens in the
/// configured token file.
pub fn new_authenticator(
    config: &AuthnConfig,
    observer: Arc<dyn Observer>,
) -> Result<Box<dyn Authenticator>> {
    let access_token = FileAccessToken::new(&config.common().token_file_path)?;
    new_authenticator_with_access_token(config, Arc::new(access_token), observer)
}

/// Build the authenticator selected by `config` around an existing store.
pub fn new_authenticator_with_access_token(
    config: &AuthnConfig,
    access_token: Arc<dyn AccessToken>,
    observer: Arc<dyn Observer>,
) -> Result<Box<dyn Authenticator>> {
    match config {
        AuthnConfig::Jwt(config) => Ok(Box::new(JwtAuthenticator::new_with_access_token(
            config.clone(),
            access_token,
            observer,
        )?)),
        AuthnConfig::Kubernetes(config) => Ok(Box::new(K8sAuthenticator::new_with_access_token(
            config.clone(),
            access_token,
            observer,
        )?)),
    }
}

/// Escape an identity for use as a single URL path segment.
pub(crate) fn escape_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_segment_encodes_slashes() {
        assert_eq!(escape_segment("host/apps/my app"), "host%2Fapps%2Fmy+app");
    }
}
