//! vmbackup entry point.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vmbackup_engine::BackupError;

use vmbackup_cli::cli::Args;
use vmbackup_cli::commands;
use vmbackup_cli::config::{Config, DEFAULT_CONFIG_PATH};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "vmbackup failed");
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let (config, source) = match &args.config {
        // Explicit config file provided
        Some(config_path) => (Config::load(config_path)?, Some(config_path.clone())),
        // Try default location, fall back to defaults
        None => match Config::load(DEFAULT_CONFIG_PATH) {
            Ok(cfg) => (cfg, Some(DEFAULT_CONFIG_PATH.to_string())),
            Err(_) => (Config::default(), None),
        },
    };
    let config = config.with_cli_overrides(&args);
    config.validate(args.command.needs_platform())?;

    // Initialize logging
    if config.logging.json {
        vmbackup_common::init_logging_json(&config.logging.level)?;
    } else {
        vmbackup_common::init_logging(&config.logging.level, config.logging.file.as_deref())?;
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting vmbackup");
    match source {
        Some(path) => info!(config_path = %path, "Configuration loaded"),
        None => info!("No config file found, using CLI arguments and defaults"),
    }

    // Commands without a cancellation point keep the default SIGINT behaviour.
    let cancel = CancellationToken::new();
    if args.command.is_cancellable() {
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling");
                on_signal.cancel();
            }
        });
    }

    commands::run(args.command, &config, cancel).await
}

/// Process exit code for a failed run.
fn exit_code(err: &anyhow::Error) -> u8 {
    let code = err
        .downcast_ref::<BackupError>()
        .map(BackupError::exit_code)
        .unwrap_or(2);
    u8::try_from(code).ok().filter(|c| *c != 0).unwrap_or(2)
}
