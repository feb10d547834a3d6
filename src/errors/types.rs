//! # Error Types
//!
//! The crate [`Error`], its [`ErrorKind`] classification, orchestration
//! [`Stage`]s and the [`GroupErrors`] aggregate.

use std::fmt;
use std::path::PathBuf;

use super::tls::TlsError;

/// Custom result type for secrets provider operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed configuration; retrying will not help.
    Configuration,
    /// Network failures and non-success responses from remote services.
    Transport,
    /// The caller's cancellation signal fired.
    Cancellation,
    /// Secrets and specs disagree, or a value cannot be interpreted.
    DataIntegrity,
    /// Local filesystem failures.
    Io,
    /// Bugs and failures of local primitives (key generation, encoding).
    Internal,
}

/// Pipeline stage an orchestration error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ReadAccessToken,
    CreateRetriever,
    RetrieveManagedSecrets,
    CollectVariableIds,
    RetrieveSecrets,
    UpdateManagedSecrets,
    PatchManagedSecrets,
    PushToFile,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Stage::ReadAccessToken => "read access token",
            Stage::CreateRetriever => "create secrets retriever",
            Stage::RetrieveManagedSecrets => "retrieve managed secrets",
            Stage::CollectVariableIds => "collect variable ids",
            Stage::RetrieveSecrets => "retrieve secrets",
            Stage::UpdateManagedSecrets => "update managed secrets",
            Stage::PatchManagedSecrets => "patch managed secrets",
            Stage::PushToFile => "push secrets to file",
        };
        f.write_str(stage)
    }
}

/// Main error type for the secrets provider
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Every error collected across secret groups; classified by the first
    #[error("{0}")]
    SecretGroups(GroupErrors),

    /// TLS trust material errors
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// Network transport errors
    #[error("Transport error: {context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    /// A remote service answered with a non-success status
    #[error("{context}: unexpected status {status}: {body}")]
    Http { context: String, status: u16, body: String },

    /// The operation observed the caller's cancellation signal
    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    /// Secrets, specs or payloads are inconsistent
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// The in-memory access token has never been written
    #[error("Access token has not been written")]
    MissingAccessToken,

    /// I/O errors with the path that caused them
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Template parsing or rendering errors
    #[error("Template error in secret group {group:?}: {message}")]
    Template { group: String, message: String },

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failure wrapped with the orchestration stage it occurred in
    #[error("failed to {stage}: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new data integrity error
    pub fn data_integrity<S: Into<String>>(message: S) -> Self {
        Self::DataIntegrity(message.into())
    }

    /// Create a new cancellation error for the named operation
    pub fn cancelled<S: Into<String>>(operation: S) -> Self {
        Self::Cancelled { operation: operation.into() }
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(context: S, source: reqwest::Error) -> Self {
        Self::Transport { context: context.into(), source }
    }

    /// Create a new I/O error bound to a path
    pub fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// Create a new template error for a secret group
    pub fn template<G: Into<String>, M: fmt::Display>(group: G, message: M) -> Self {
        Self::Template { group: group.into(), message: message.to_string() }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Wrap this error with the stage it occurred in
    pub fn at_stage(self, stage: Stage) -> Self {
        Self::Stage { stage, source: Box::new(self) }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SecretGroups(errors) => {
                errors.iter().next().map_or(ErrorKind::Configuration, Error::kind)
            }
            Error::Config(_)
            | Error::Tls(_)
            | Error::Yaml(_)
            | Error::Template { .. } => ErrorKind::Configuration,
            Error::Transport { .. } | Error::Http { .. } => ErrorKind::Transport,
            Error::Cancelled { .. } => ErrorKind::Cancellation,
            Error::DataIntegrity(_) | Error::Json(_) | Error::MissingAccessToken => {
                ErrorKind::DataIntegrity
            }
            Error::Io { .. } => ErrorKind::Io,
            Error::Stage { source, .. } => source.kind(),
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True when the error was caused by the caller's cancellation signal
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancellation
    }

    /// True when repeating the same operation might succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http { status, .. } => *status >= 500 || *status == 429,
            Error::Stage { source, .. } => source.is_retryable(),
            _ => matches!(self.kind(), ErrorKind::Transport | ErrorKind::Io),
        }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Config(format!("Validation failed: {}", errors))
    }
}

/// Aggregate of secret group configuration errors, reported together.
#[derive(Debug, Default)]
pub struct GroupErrors(Vec<Error>);

impl GroupErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: Error) {
        self.0.push(error);
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = Error>) {
        self.0.extend(errors);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Error> {
        self.0.iter()
    }

    /// `Ok(())` when nothing was collected, otherwise the aggregate error
    pub fn into_result(self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(Error::SecretGroups(self))
        }
    }
}

impl IntoIterator for GroupErrors {
    type Item = Error;
    type IntoIter = std::vec::IntoIter<Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for GroupErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} secret group error(s):", self.0.len())?;
        for error in &self.0 {
            write!(f, "\n  - {}", error)?;
        }
        Ok(())
    }
}
