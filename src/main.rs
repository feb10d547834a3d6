use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use secrets_provider::{
    cli::Cli,
    observability::{init_logging, log_config_info, TracingObserver},
    Config, Result, SecretsProvider, APP_NAME, VERSION,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if it exists (optional - won't fail if missing)
    // This must happen before any config is read from environment
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let cli = Cli::parse();
    if let Err(e) = init_logging(&cli.observability_config()) {
        eprintln!("Failed to initialise logging: {}", e);
        return ExitCode::FAILURE;
    }

    info!(app_name = APP_NAME, version = VERSION, "Starting secrets provider");

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, kind = ?e.kind(), retryable = e.is_retryable(), "Secrets provider failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config = Config::from_env()?;
    log_config_info(&config);

    let provider = SecretsProvider::from_config(&config, Arc::new(TracingObserver))?;

    let cancel = CancellationToken::new();
    let watchdog = tokio::spawn(cancel_on_shutdown(cancel.clone(), cli.timeout()));

    let result = provider.run(&cancel).await;
    watchdog.abort();
    result
}

/// Cancel the cycle on Ctrl-C or once `timeout` elapses.
async fn cancel_on_shutdown(cancel: CancellationToken, timeout: std::time::Duration) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, cancelling"),
        _ = tokio::time::sleep(timeout) => {
            warn!(timeout_secs = timeout.as_secs(), "Secrets provider timed out, cancelling");
        }
    }
    cancel.cancel();
}
