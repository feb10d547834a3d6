//! # Observability Infrastructure
//!
//! Structured logging for the secrets provider plus the [`Observer`] event
//! sink the core logic reports progress through.

pub mod events;
pub mod logging;

pub use events::{Event, MemoryObserver, NoopObserver, Observer, TracingObserver};
pub use logging::log_config_info;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this twice
/// returns a configuration error instead of panicking.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| Error::config(format!("Invalid log level {:?}: {}", config.log_level, e)))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logging() {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };

    result.map_err(|e| Error::config(format!("Failed to initialize logging: {}", e)))
}
