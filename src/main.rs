//! relayd: path-addressed reverse-proxy relay.
//!
//! ```text
//!   Client ── GET /http://example.com/a?x=1 ──▶ frontend ── rewrite
//!                                                   ├─ resolved  ──▶ http://example.com/a?x=1
//!                                                   └─ malformed ──▶ diagnostic backend (200 OK)
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use relay::config::{self, RelayConfig};
use relay::lifecycle::signals::shutdown_signal;
use relay::observability::{logging, metrics};
use relay::Relay;

#[derive(Parser, Debug)]
#[command(name = "relayd")]
#[command(about = "Relay each request to the URL written in its path", long_about = None)]
struct Cli {
    /// Address:port on which to listen.
    #[arg(short, long)]
    listen: Option<String>,

    /// Optional TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter (overridden by RUST_LOG).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn resolve_config(&self) -> Result<RelayConfig, config::ConfigError> {
        let mut config = match &self.config {
            Some(path) => config::load_config(path)?,
            None => RelayConfig::default(),
        };

        if let Some(listen) = &self.listen {
            config.listener.bind_address = listen.clone();
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }

        config::validate_config(&config).map_err(config::ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("relayd: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&config.observability.log_level) {
        eprintln!("relayd: invalid log filter: {}", e);
        return ExitCode::FAILURE;
    }

    if config.observability.metrics_enabled {
        // Validation guarantees the address parses.
        if let Ok(addr) = config.observability.metrics_address.parse() {
            if let Err(e) = metrics::init_metrics(addr) {
                tracing::error!(error = %e, "Failed to start metrics endpoint");
                return ExitCode::FAILURE;
            }
        }
    }

    let shutdown_deadline = config.timeouts.shutdown();
    let bind_address = config.listener.bind_address.clone();
    let relay = Arc::new(Relay::new(config));

    tracing::info!(address = %bind_address, "Starting relay");
    let mut serving = tokio::spawn({
        let relay = Arc::clone(&relay);
        async move { relay.start().await }
    });

    tokio::select! {
        finished = &mut serving => {
            // start only returns early on failure
            match finished {
                Ok(Ok(())) => return ExitCode::SUCCESS,
                Ok(Err(e)) => tracing::error!(error = %e, "Failed to start relay"),
                Err(e) => tracing::error!(error = %e, "Relay task failed"),
            }
            return ExitCode::FAILURE;
        }
        signal = shutdown_signal() => match signal {
            Ok(name) => tracing::info!(signal = name, "Shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signals"),
        },
    }

    if let Err(e) = relay.shutdown(shutdown_deadline).await {
        tracing::error!(error = %e, "Failed to shutdown relay frontend");
        return ExitCode::FAILURE;
    }

    match serving.await {
        Ok(Ok(())) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Relay stopped with error");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "Relay task failed");
            ExitCode::FAILURE
        }
    }
}
