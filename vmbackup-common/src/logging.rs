//! Logging initialization using tracing.

use std::ffi::OsStr;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Default location of the persistent log file.
pub const DEFAULT_LOG_FILE: &str = "/var/log/ovirt-vm-backup/vmbackup.log";

/// Initialize the tracing subscriber with the specified log level.
///
/// Events always go to stderr. When `log_file` is set, a second layer
/// writes the same events (without ANSI colours) to a daily-rolling file
/// next to that path.
///
/// # Arguments
/// * `level` - Log level string (trace, debug, info, warn, error)
/// * `log_file` - Optional path of the log file
pub fn init_logging(level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let file_layer = match log_file {
        Some(path) => {
            let (dir, file_name) = split_log_path(path)?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, file_name);
            Some(fmt::layer().with_writer(appender).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Initialize logging with JSON output format on stderr.
/// Suitable for runs driven by a scheduler that collects structured logs.
pub fn init_logging_json(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Split a log file path into the directory and file name the rolling
/// appender expects.
fn split_log_path(path: &Path) -> Result<(&Path, &OsStr)> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("Log file path has no file name: {}", path.display()))?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    Ok((dir, file_name))
}
