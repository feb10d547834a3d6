//! HTTPS plumbing shared by the authenticators, the secrets retriever and
//! the platform API client.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Identity, RequestBuilder};
use tokio_util::sync::CancellationToken;

use crate::config::TrustAnchor;
use crate::errors::{Error, Result, TlsError};

const MAX_ERROR_BODY_CHARS: usize = 256;

/// Build an HTTPS client trusting only the given anchor, optionally
/// presenting a client identity for mutual TLS.
pub fn build_client(
    trust_anchor: &TrustAnchor,
    identity: Option<Identity>,
    timeout: Duration,
) -> Result<Client> {
    let mut builder = Client::builder().use_rustls_tls().timeout(timeout);
    for certificate in trust_anchor.certificates()? {
        builder = builder.add_root_certificate(certificate);
    }
    if let Some(identity) = identity {
        builder = builder.identity(identity);
    }
    builder.build().map_err(|source| TlsError::ClientBuild { source }.into())
}

/// Client identity from a PEM certificate and a PKCS#8 PEM private key.
pub fn client_identity(cert_pem: &[u8], key_pem: &[u8]) -> Result<Identity> {
    let mut bundle = Vec::with_capacity(cert_pem.len() + key_pem.len() + 1);
    bundle.extend_from_slice(cert_pem);
    if !cert_pem.ends_with(b"\n") {
        bundle.push(b'\n');
    }
    bundle.extend_from_slice(key_pem);
    Identity::from_pem(&bundle).map_err(|e| TlsError::InvalidIdentity(e.to_string()).into())
}

/// Run `future` unless `cancel` fires first.
pub async fn cancellable<T, F>(cancel: &CancellationToken, operation: &str, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::cancelled(operation)),
        result = future => result,
    }
}

/// Send a request and return the body of a 2xx response.
///
/// Any other status is an [`Error::Http`] carrying a truncated body.
pub async fn send(request: RequestBuilder, context: &str) -> Result<Vec<u8>> {
    let response = request.send().await.map_err(|e| Error::transport(context, e))?;
    let status = response.status();
    let body = response.bytes().await.map_err(|e| Error::transport(context, e))?;

    if !status.is_success() {
        let body: String =
            String::from_utf8_lossy(&body).chars().take(MAX_ERROR_BODY_CHARS).collect();
        return Err(Error::Http { context: context.to_string(), status: status.as_u16(), body });
    }

    Ok(body.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn trust_anchor() -> TrustAnchor {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
            .expect("generate certificate");
        TrustAnchor::from_pem(cert.cert.pem())
    }

    #[tokio::test]
    async fn test_send_returns_body_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("payload"))
            .mount(&server)
            .await;

        let client = build_client(&trust_anchor(), None, Duration::from_secs(5)).expect("client");
        let body = send(client.get(format!("{}/ok", server.uri())), "fetch").await.expect("body");
        assert_eq!(body, b"payload");
    }

    #[tokio::test]
    async fn test_send_maps_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("denied"))
            .mount(&server)
            .await;

        let client = build_client(&trust_anchor(), None, Duration::from_secs(5)).expect("client");
        let err = send(client.get(server.uri()), "fetch").await.expect_err("401");
        assert!(matches!(err, Error::Http { status: 401, .. }));
        assert!(err.to_string().contains("denied"));
    }

    #[tokio::test]
    async fn test_cancellable_prefers_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<()> = cancellable(&cancel, "wait", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;
        assert!(result.expect_err("cancelled").is_cancelled());
    }

    #[test]
    fn test_invalid_trust_anchor_fails_client_construction() {
        let anchor = TrustAnchor::from_pem("garbage");
        assert!(build_client(&anchor, None, Duration::from_secs(5)).is_err());
    }
}
