//! # Structured Logging
//!
//! Span macros for the provider's long-running operations. Every span carries
//! an `operation_id` so interleaved retries can be told apart in JSON logs.

/// Create a tracing span for an authentication attempt.
///
/// ```rust,ignore
/// let span = authn_span!("authn-jwt", "https://conjur/authn-jwt/svc");
/// ```
#[macro_export]
macro_rules! authn_span {
    ($authn_type:expr, $authn_url:expr) => {
        tracing::info_span!(
            "authenticate",
            authn_type = %$authn_type,
            authn_url = %$authn_url,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
}

/// Create a tracing span for a secrets handling cycle.
#[macro_export]
macro_rules! retrieval_span {
    ($destination:expr) => {
        tracing::info_span!(
            "handle_secrets",
            destination = %$destination,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($destination:expr, $($field:tt)*) => {
        tracing::info_span!(
            "handle_secrets",
            destination = %$destination,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for work on a single secret group.
#[macro_export]
macro_rules! group_span {
    ($group:expr) => {
        tracing::debug_span!("secret_group", group = %$group)
    };
    ($group:expr, $($field:tt)*) => {
        tracing::debug_span!("secret_group", group = %$group, $($field)*)
    };
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::Config) {
    tracing::info!(
        authn_type = %config.authn.authn_type(),
        authn_url = %config.authn.common().authn_url,
        account = %config.secrets.account,
        appliance_url = %config.secrets.appliance_url,
        destination = %config.secrets.destination,
        "Secrets provider configuration"
    );
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_macros_compile() {
        let _span = authn_span!("authn-jwt", "https://conjur.example.com/authn-jwt/svc");
        let _span = retrieval_span!("file");
        let _span = retrieval_span!("k8s_secrets", secrets = 2);
        let _span = group_span!("database");
        let _span = group_span!("database", path = "/conjur/secrets/db.yaml");
    }
}
