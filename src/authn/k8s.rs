use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use rsa::pkcs1v15::{Signature, SigningKey};
use sha2::Sha256;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};
use x509_cert::builder::{Builder, RequestBuilder};
use x509_cert::der::asn1::Ia5String;
use x509_cert::der::pem::LineEnding;
use x509_cert::der::{DecodePem, EncodePem};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::SubjectAltName;
use x509_cert::name::Name;
use x509_cert::Certificate;
use zeroize::Zeroizing;

use super::{escape_segment, AuthnType, Authenticator, K8sAuthnConfig, SessionKey};
use crate::access_token::AccessToken;
use crate::errors::{Error, Result};
use crate::observability::{Event, Observer};
use crate::transport;

/// A cached client certificate is renewed when it expires within this window.
const CERT_RENEWAL_WINDOW: Duration = Duration::from_secs(60);

/// Authenticates with a vault-issued client certificate obtained by sending
/// a CSR for the pod's identity.
pub struct K8sAuthenticator {
    config: K8sAuthnConfig,
    client: reqwest::Client,
    access_token: Arc<dyn AccessToken>,
    session_key: SessionKey,
    client_cert: Mutex<Option<Vec<u8>>>,
    observer: Arc<dyn Observer>,
}

impl K8sAuthenticator {
    pub fn new_with_access_token(
        config: K8sAuthnConfig,
        access_token: Arc<dyn AccessToken>,
        observer: Arc<dyn Observer>,
    ) -> Result<Self> {
        let client =
            transport::build_client(&config.common.trust_anchor, None, config.common.http_timeout)?;
        let session_key = SessionKey::generate()?;
        observer.observe(&Event::SessionKeyGenerated {
            authn_type: AuthnType::Kubernetes,
            fingerprint: &session_key.fingerprint()?,
        });

        Ok(Self {
            config,
            client,
            access_token,
            session_key,
            client_cert: Mutex::new(None),
            observer,
        })
    }

    pub fn session_key(&self) -> &SessionKey {
        &self.session_key
    }

    fn spiffe_id(&self) -> String {
        format!(
            "spiffe://cluster.local/namespace/{}/podname/{}",
            self.config.pod_namespace, self.config.pod_name
        )
    }

    fn authenticate_url(&self) -> String {
        let common = &self.config.common;
        format!(
            "{}/{}/{}/authenticate",
            common.authn_url,
            escape_segment(&common.account),
            escape_segment(self.config.username.as_str())
        )
    }

    /// Request a client certificate and wait for the vault to inject it.
    async fn login(&self, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let csr = generate_csr(
            &self.session_key,
            self.config.username.suffix(),
            &self.spiffe_id(),
        )?;

        // A leftover certificate from an earlier login must not be mistaken
        // for the one about to be injected.
        remove_if_present(&self.config.client_cert_path)?;

        let request = self
            .client
            .post(format!("{}/inject_client_cert", self.config.common.authn_url))
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .header("Host-Id-Prefix", self.config.username.prefix())
            .body(csr);
        transport::cancellable(
            cancel,
            "client certificate request",
            transport::send(request, "client certificate request"),
        )
        .await?;
        self.observer
            .observe(&Event::ClientCertificateRequested { username: self.config.username.as_str() });

        let cert = self.wait_for_client_cert(cancel).await?;
        remove_if_present(&self.config.client_cert_path)?;
        self.observer
            .observe(&Event::ClientCertificateInjected { path: &self.config.client_cert_path });
        Ok(cert)
    }

    async fn wait_for_client_cert(&self, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let path = &self.config.client_cert_path;
        let limit = self.config.client_cert_retry_count_limit;

        for attempt in 0..=limit {
            match tokio::fs::read(path).await {
                Ok(data) if !data.is_empty() => return Ok(data),
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::io(path, e)),
            }

            if attempt < limit {
                debug!(path = %path.display(), attempt, "Waiting for client certificate");
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(Error::cancelled("waiting for client certificate"));
                    }
                    _ = tokio::time::sleep(self.config.client_cert_poll_interval) => {}
                }
            }
        }

        Err(Error::io(
            path,
            std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("client certificate was not injected after {} retries", limit),
            ),
        ))
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        let mut cached = self.client_cert.lock().await;
        let cert = match cached.take() {
            Some(cert) if !expires_within(&cert, CERT_RENEWAL_WINDOW) => cert,
            _ => self.login(cancel).await?,
        };
        let cert = cached.insert(cert);

        let key_pem = self.session_key.private_key_pem()?;
        let identity = transport::client_identity(cert, key_pem.as_bytes())?;
        let client = transport::build_client(
            &self.config.common.trust_anchor,
            Some(identity),
            self.config.common.http_timeout,
        )?;
        drop(cached);

        let token = transport::cancellable(
            cancel,
            "Kubernetes authentication",
            transport::send(client.post(self.authenticate_url()), "Kubernetes authentication request"),
        )
        .await?;
        let token = Zeroizing::new(token);

        self.access_token.write(&token)?;
        self.observer.observe(&Event::AuthenticationSucceeded {
            authn_type: AuthnType::Kubernetes,
            token_bytes: token.len(),
        });
        Ok(())
    }
}

#[async_trait]
impl Authenticator for K8sAuthenticator {
    async fn authenticate_with_cancel(&self, cancel: &CancellationToken) -> Result<()> {
        self.observer.observe(&Event::AuthenticationStarted { authn_type: AuthnType::Kubernetes });
        let span = crate::authn_span!(AuthnType::Kubernetes, self.config.common.authn_url);

        let result = self.run(cancel).instrument(span).await;
        if let Err(error) = &result {
            self.observer
                .observe(&Event::AuthenticationFailed { authn_type: AuthnType::Kubernetes, error });
        }
        result
    }

    fn access_token(&self) -> Arc<dyn AccessToken> {
        Arc::clone(&self.access_token)
    }

    fn authn_type(&self) -> AuthnType {
        AuthnType::Kubernetes
    }
}

/// PEM PKCS#10 request for `common_name` carrying `spiffe_id` as a URI SAN.
pub(crate) fn generate_csr(key: &SessionKey, common_name: &str, spiffe_id: &str) -> Result<String> {
    let csr_error = |e: &dyn std::fmt::Display| Error::internal(format!("failed to build CSR: {}", e));

    let subject = Name::from_str(&format!("CN={}", common_name)).map_err(|e| csr_error(&e))?;
    let signer = SigningKey::<Sha256>::new(key.private_key().clone());
    let mut builder = RequestBuilder::new(subject, &signer).map_err(|e| csr_error(&e))?;

    let uri = Ia5String::new(spiffe_id).map_err(|e| csr_error(&e))?;
    builder
        .add_extension(&SubjectAltName(vec![GeneralName::UniformResourceIdentifier(uri)]))
        .map_err(|e| csr_error(&e))?;

    let request = builder.build::<Signature>().map_err(|e| csr_error(&e))?;
    request.to_pem(LineEnding::LF).map_err(|e| csr_error(&e))
}

/// True when the certificate expires within `window`, or cannot be parsed.
fn expires_within(cert_pem: &[u8], window: Duration) -> bool {
    let Ok(cert) = Certificate::from_pem(cert_pem) else {
        return true;
    };
    let not_after = cert.tbs_certificate.validity.not_after.to_system_time();
    match SystemTime::now().checked_add(window) {
        Some(deadline) => not_after <= deadline,
        None => true,
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x509_cert::request::CertReq;

    #[test]
    fn test_csr_carries_common_name() {
        let key = SessionKey::generate().expect("key");
        let pem = generate_csr(&key, "my-app", "spiffe://cluster.local/namespace/apps/podname/my-app-0")
            .expect("csr");
        assert!(pem.starts_with("-----BEGIN CERTIFICATE REQUEST-----"));

        let request = CertReq::from_pem(pem.as_bytes()).expect("parse csr");
        assert_eq!(request.info.subject.to_string(), "CN=my-app");
        assert_eq!(request.info.attributes.len(), 1);
    }

    #[test]
    fn test_unparseable_certificate_counts_as_expired() {
        assert!(expires_within(b"not a certificate", CERT_RENEWAL_WINDOW));
    }

    #[test]
    fn test_fresh_certificate_is_not_expired() {
        let cert = rcgen::generate_simple_self_signed(vec!["my-app".to_string()])
            .expect("generate certificate");
        assert!(!expires_within(cert.cert.pem().as_bytes(), CERT_RENEWAL_WINDOW));
    }
}
