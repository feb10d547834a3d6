use std::fmt;
use std::str::FromStr;

use validator::Validate;

use crate::errors::{Error, Result};

/// Output format for log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::config(format!("unknown log format {:?}", other))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Validate)]
pub struct ObservabilityConfig {
    /// Service name attached to startup logs
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides it
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: crate::APP_NAME.to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl ObservabilityConfig {
    /// Load logging settings from `LOG_LEVEL` and `LOG_FORMAT`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level.trim().to_string();
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            config.log_format = format.parse()?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn json_logging(&self) -> bool {
        self.log_format == LogFormat::Json
    }
}
