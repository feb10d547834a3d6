use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use zeroize::Zeroizing;

use super::{escape_segment, AuthnType, Authenticator, JwtAuthnConfig, SessionKey};
use crate::access_token::AccessToken;
use crate::errors::{Error, Result};
use crate::observability::{Event, Observer};
use crate::transport;

/// Authenticates by posting a projected service-account JWT.
pub struct JwtAuthenticator {
    config: JwtAuthnConfig,
    client: reqwest::Client,
    access_token: Arc<dyn AccessToken>,
    session_key: SessionKey,
    observer: Arc<dyn Observer>,
}

impl JwtAuthenticator {
    /// Construct the authenticator. Fails when the trust anchor is unusable
    /// or the session key cannot be generated.
    pub fn new_with_access_token(
        config: JwtAuthnConfig,
        access_token: Arc<dyn AccessToken>,
        observer: Arc<dyn Observer>,
    ) -> Result<Self> {
        let client =
            transport::build_client(&config.common.trust_anchor, None, config.common.http_timeout)?;
        let session_key = SessionKey::generate()?;
        observer.observe(&Event::SessionKeyGenerated {
            authn_type: AuthnType::Jwt,
            fingerprint: &session_key.fingerprint()?,
        });

        Ok(Self { config, client, access_token, session_key, observer })
    }

    pub fn session_key(&self) -> &SessionKey {
        &self.session_key
    }

    /// `<authnURL>/<account>[/<identity>]/authenticate`
    fn authenticate_url(&self) -> String {
        let common = &self.config.common;
        match self.config.username.as_deref() {
            Some(identity) => format!(
                "{}/{}/{}/authenticate",
                common.authn_url,
                escape_segment(&common.account),
                escape_segment(identity)
            ),
            None => format!("{}/{}/authenticate", common.authn_url, escape_segment(&common.account)),
        }
    }

    async fn send_authentication_request(&self, jwt: &str) -> Result<Vec<u8>> {
        let form = [("jwt", jwt)];
        let request = self.client.post(self.authenticate_url()).form(&form);
        transport::send(request, "JWT authentication request").await
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        let jwt = load_jwt(&self.config.jwt_token_path).await?;
        self.observer.observe(&Event::JwtLoaded { path: &self.config.jwt_token_path });

        let token = transport::cancellable(
            cancel,
            "JWT authentication",
            self.send_authentication_request(&jwt),
        )
        .await?;
        let token = Zeroizing::new(token);

        self.access_token.write(&token)?;
        self.observer.observe(&Event::AuthenticationSucceeded {
            authn_type: AuthnType::Jwt,
            token_bytes: token.len(),
        });
        Ok(())
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate_with_cancel(&self, cancel: &CancellationToken) -> Result<()> {
        self.observer.observe(&Event::AuthenticationStarted { authn_type: AuthnType::Jwt });
        let span = crate::authn_span!(AuthnType::Jwt, self.config.common.authn_url);

        let result = self.run(cancel).instrument(span).await;
        if let Err(error) = &result {
            self.observer.observe(&Event::AuthenticationFailed { authn_type: AuthnType::Jwt, error });
        }
        result
    }

    fn access_token(&self) -> Arc<dyn AccessToken> {
        Arc::clone(&self.access_token)
    }

    fn authn_type(&self) -> AuthnType {
        AuthnType::Jwt
    }
}

/// Read the JWT, trimming the trailing newline projected files carry.
async fn load_jwt(path: &Path) -> Result<Zeroizing<String>> {
    let raw = Zeroizing::new(tokio::fs::read_to_string(path).await.map_err(|e| Error::io(path, e))?);
    let jwt = raw.trim();
    if jwt.is_empty() {
        return Err(Error::config(format!("JWT file {} is empty", path.display())));
    }
    Ok(Zeroizing::new(jwt.to_string()))
}
