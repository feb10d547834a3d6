//! # Command Line Interface
//!
//! Flags for the `secrets-provider` binary. Every flag falls back to an
//! environment variable so the sidecar can be configured from its pod spec.

use std::time::Duration;

use clap::Parser;

use crate::config::{LogFormat, ObservabilityConfig};

/// Default bound on one authenticate-retrieve-deliver cycle.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Parser)]
#[command(name = "secrets-provider")]
#[command(about = "Authenticates to a secrets vault and delivers secrets to files or platform secrets")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides it
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log record format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Abort the cycle after this many seconds
    #[arg(long, env = "SECRETS_PROVIDER_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,
}

impl Cli {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn observability_config(&self) -> ObservabilityConfig {
        ObservabilityConfig {
            log_level: self.log_level.clone(),
            log_format: self.log_format,
            ..ObservabilityConfig::default()
        }
    }
}
