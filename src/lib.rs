//! # Secrets Provider
//!
//! A sidecar that authenticates a workload to a secrets vault and delivers
//! the secrets declared in its pod annotations, either as rendered files on
//! a shared volume or as values patched into platform-managed secrets.
//!
//! ## Architecture
//!
//! ```text
//! Authenticator → AccessToken → SecretsHandler → files | managed secrets
//!      ↓                              ↓
//! session key, CSR            batch retrieval, templates
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use secrets_provider::{observability::TracingObserver, Config, Result, SecretsProvider};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::from_env()?;
//!     let provider = SecretsProvider::from_config(&config, Arc::new(TracingObserver))?;
//!     provider.run(&CancellationToken::new()).await
//! }
//! ```

pub mod access_token;
pub mod authn;
pub mod cli;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod k8s;
pub mod observability;
pub mod provider;
pub mod secrets;
pub mod transport;

// Re-export commonly used types and traits
pub use config::Config;
pub use errors::{Error, ErrorKind, Result};
pub use provider::SecretsProvider;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
