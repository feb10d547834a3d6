//! Structured progress events.
//!
//! Core logic never logs directly about its progress; it reports [`Event`]s
//! to an injected [`Observer`]. The binary installs [`TracingObserver`],
//! tests use [`MemoryObserver`].

use std::path::Path;
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::authn::AuthnType;
use crate::config::SecretsDestination;
use crate::errors::Error;

/// Something noteworthy happened in the provider.
#[derive(Debug)]
pub enum Event<'a> {
    AuthenticationStarted { authn_type: AuthnType },
    SessionKeyGenerated { authn_type: AuthnType, fingerprint: &'a str },
    JwtLoaded { path: &'a Path },
    ClientCertificateRequested { username: &'a str },
    ClientCertificateInjected { path: &'a Path },
    AuthenticationSucceeded { authn_type: AuthnType, token_bytes: usize },
    AuthenticationFailed { authn_type: AuthnType, error: &'a Error },
    SecretGroupsResolved { count: usize },
    SecretsRetrieved { destination: SecretsDestination, count: usize },
    SecretFileWritten { group: &'a str, path: &'a Path },
    SecretGroupFailed { group: &'a str, error: &'a Error },
    ManagedSecretsPatched { count: usize },
}

impl Event<'_> {
    /// Stable name of the event kind.
    pub fn name(&self) -> &'static str {
        match self {
            Event::AuthenticationStarted { .. } => "authentication_started",
            Event::SessionKeyGenerated { .. } => "session_key_generated",
            Event::JwtLoaded { .. } => "jwt_loaded",
            Event::ClientCertificateRequested { .. } => "client_certificate_requested",
            Event::ClientCertificateInjected { .. } => "client_certificate_injected",
            Event::AuthenticationSucceeded { .. } => "authentication_succeeded",
            Event::AuthenticationFailed { .. } => "authentication_failed",
            Event::SecretGroupsResolved { .. } => "secret_groups_resolved",
            Event::SecretsRetrieved { .. } => "secrets_retrieved",
            Event::SecretFileWritten { .. } => "secret_file_written",
            Event::SecretGroupFailed { .. } => "secret_group_failed",
            Event::ManagedSecretsPatched { .. } => "managed_secrets_patched",
        }
    }
}

/// Sink for provider events.
pub trait Observer: Send + Sync {
    fn observe(&self, event: &Event<'_>);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn observe(&self, _event: &Event<'_>) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn observe(&self, event: &Event<'_>) {
        match event {
            Event::AuthenticationStarted { authn_type } => {
                info!(authn_type = %authn_type, "Authenticating with vault")
            }
            Event::SessionKeyGenerated { authn_type, fingerprint } => {
                debug!(authn_type = %authn_type, fingerprint = %fingerprint, "Generated session key")
            }
            Event::JwtLoaded { path } => debug!(path = %path.display(), "Loaded JWT"),
            Event::ClientCertificateRequested { username } => {
                info!(username = %username, "Requested client certificate")
            }
            Event::ClientCertificateInjected { path } => {
                debug!(path = %path.display(), "Client certificate injected")
            }
            Event::AuthenticationSucceeded { authn_type, token_bytes } => {
                info!(authn_type = %authn_type, token_bytes, "Authentication succeeded")
            }
            Event::AuthenticationFailed { authn_type, error } => {
                warn!(authn_type = %authn_type, error = %error, "Authentication failed")
            }
            Event::SecretGroupsResolved { count } => {
                info!(groups = count, "Resolved secret groups")
            }
            Event::SecretsRetrieved { destination, count } => {
                info!(destination = %destination, secrets = count, "Retrieved secrets")
            }
            Event::SecretFileWritten { group, path } => {
                info!(group = %group, path = %path.display(), "Wrote secret file")
            }
            Event::SecretGroupFailed { group, error } => {
                warn!(group = %group, error = %error, "Secret group failed")
            }
            Event::ManagedSecretsPatched { count } => {
                info!(secrets = count, "Patched managed secrets")
            }
        }
    }
}

/// Records event names in memory.
#[derive(Debug, Default)]
pub struct MemoryObserver {
    events: Mutex<Vec<String>>,
}

impl MemoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every recorded event, oldest first.
    pub fn names(&self) -> Vec<String> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl Observer for MemoryObserver {
    fn observe(&self, event: &Event<'_>) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.name().to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_memory_observer_records_in_order() {
        let observer = MemoryObserver::new();
        observer.observe(&Event::AuthenticationStarted { authn_type: AuthnType::Jwt });
        observer.observe(&Event::SecretGroupsResolved { count: 2 });
        assert_eq!(observer.names(), vec!["authentication_started", "secret_groups_resolved"]);
    }

    #[traced_test]
    #[test]
    fn test_tracing_observer_logs_fields() {
        TracingObserver.observe(&Event::SecretFileWritten {
            group: "database",
            path: Path::new("/conjur/secrets/database.yaml"),
        });
        assert!(logs_contain("Wrote secret file"));
        assert!(logs_contain("database"));
    }
}
