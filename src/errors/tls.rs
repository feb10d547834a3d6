use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading the vault's TLS trust anchor.
#[derive(Debug, Error)]
pub enum TlsError {
    /// Neither inline PEM nor a certificate file was configured.
    #[error("TLS trust anchor is not configured (set CONJUR_SSL_CERTIFICATE or CONJUR_CERT_FILE)")]
    MissingCertificate,

    /// The certificate file could not be read.
    #[error("Failed to read certificate at {path}: {source}")]
    CertificateReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No certificates were found in the supplied PEM.
    #[error("Certificate from {origin} does not contain any certificates")]
    EmptyCertificateChain { origin: String },

    /// The certificate PEM contents were invalid or unreadable.
    #[error("Certificate from {origin} is not a valid PEM: {source}")]
    InvalidCertificatePem {
        origin: String,
        #[source]
        source: reqwest::Error,
    },

    /// A client identity (certificate + key) could not be assembled.
    #[error("Invalid client identity: {0}")]
    InvalidIdentity(String),

    /// The HTTPS client could not be built from the trust material.
    #[error("Failed to build HTTPS client: {source}")]
    ClientBuild {
        #[source]
        source: reqwest::Error,
    },
}
