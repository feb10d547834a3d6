use std::path::PathBuf;

use crate::{errors::TlsError, Result};

/// PEM trust material for the vault's TLS endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct TrustAnchor {
    pem: Vec<u8>,
    origin: String,
}

impl TrustAnchor {
    /// Build a trust anchor from inline PEM text.
    pub fn from_pem(pem: impl Into<Vec<u8>>) -> Self {
        Self { pem: pem.into(), origin: "CONJUR_SSL_CERTIFICATE".to_string() }
    }

    /// Read the trust anchor from a PEM file.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let pem = std::fs::read(&path)
            .map_err(|source| TlsError::CertificateReadError { path: path.clone(), source })?;
        Ok(Self { pem, origin: path.display().to_string() })
    }

    /// Resolve the trust anchor from environment-style lookups.
    ///
    /// Inline PEM (`CONJUR_SSL_CERTIFICATE`) takes precedence over a file
    /// path (`CONJUR_CERT_FILE`).
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(pem) = lookup("CONJUR_SSL_CERTIFICATE").filter(|v| !v.trim().is_empty()) {
            return Ok(Self::from_pem(pem));
        }

        let path = lookup("CONJUR_CERT_FILE")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(TlsError::MissingCertificate)?;

        Self::from_file(path)
    }

    pub fn pem(&self) -> &[u8] {
        &self.pem
    }

    /// Parse every certificate in the bundle.
    pub fn certificates(&self) -> Result<Vec<reqwest::Certificate>> {
        let certificates = reqwest::Certificate::from_pem_bundle(&self.pem).map_err(|source| {
            TlsError::InvalidCertificatePem { origin: self.origin.clone(), source }
        })?;

        if certificates.is_empty() {
            return Err(TlsError::EmptyCertificateChain { origin: self.origin.clone() }.into());
        }

        Ok(certificates)
    }
}

impl std::fmt::Debug for TrustAnchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustAnchor")
            .field("origin", &self.origin)
            .field("bytes", &self.pem.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    fn test_ca_pem() -> String {
        rcgen::generate_simple_self_signed(vec!["conjur.example.com".to_string()])
            .expect("generate certificate")
            .cert
            .pem()
    }

    #[test]
    fn test_missing_trust_anchor() {
        let err = TrustAnchor::from_lookup(&lookup_from(&[])).expect_err("missing");
        assert!(err.to_string().contains("not configured"));
    }

    #[test]
    fn test_inline_pem_takes_precedence() {
        let pem = test_ca_pem();
        let lookup = lookup_from(&[
            ("CONJUR_SSL_CERTIFICATE", pem.as_str()),
            ("CONJUR_CERT_FILE", "/does/not/exist.pem"),
        ]);
        let anchor = TrustAnchor::from_lookup(&lookup).expect("anchor");
        assert_eq!(anchor.certificates().expect("certificates").len(), 1);
    }

    #[test]
    fn test_unreadable_cert_file() {
        let lookup = lookup_from(&[("CONJUR_CERT_FILE", "/does/not/exist.pem")]);
        let err = TrustAnchor::from_lookup(&lookup).expect_err("unreadable");
        assert!(err.to_string().contains("/does/not/exist.pem"));
    }

    #[test]
    fn test_pem_without_certificates_is_rejected() {
        let anchor = TrustAnchor::from_pem("not a certificate");
        assert!(anchor.certificates().is_err());
    }
}
