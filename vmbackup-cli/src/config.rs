//! Configuration management for vmbackup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;
use vmbackup_engine::PollPolicy;
use vmbackup_platform::OvirtConfig;

use crate::cli::Args;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/vmbackup/vmbackup.yaml";

/// Largest accepted `polling.backoff_factor`.
pub const MAX_BACKOFF_FACTOR: f64 = 10.0;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Management platform connection
    pub platform: PlatformConfig,
    /// Waiting for asynchronous remote operations
    pub polling: PollingConfig,
    /// Backup settings
    pub backup: BackupConfig,
    /// Restore settings
    pub restore: RestoreConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as a map.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(ref url) = args.url {
            self.platform.url = url.clone();
        }

        if let Some(ref username) = args.username {
            self.platform.username = username.clone();
        }

        if let Some(ref password) = args.password {
            self.platform.password = password.clone();
        }

        if args.insecure {
            self.platform.insecure = true;
        }

        if args.dev {
            self.platform.backend = PlatformBackend::Mock;
        }

        if let Some(timeout) = args.poll_timeout {
            self.polling.timeout_secs = timeout;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }

        if let Some(ref file) = args.log_file {
            self.logging.file = Some(file.clone());
        }

        if args.log_json {
            self.logging.json = true;
        }

        self
    }

    /// Validate the configuration.
    ///
    /// `remote` requires usable engine connection settings.
    pub fn validate(&self, remote: bool) -> std::result::Result<(), ConfigError> {
        if remote && self.platform.backend == PlatformBackend::Ovirt {
            if self.platform.url.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "platform.url".to_string(),
                    message: "must be set (config file, --url or VMBACKUP_URL)".to_string(),
                });
            }
            if !self.platform.url.starts_with("http://") && !self.platform.url.starts_with("https://") {
                return Err(ConfigError::InvalidValue {
                    field: "platform.url".to_string(),
                    message: "must be an http(s) URL".to_string(),
                });
            }
        }

        if self.polling.interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "polling.interval_ms".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if self.polling.max_interval_ms < self.polling.interval_ms {
            return Err(ConfigError::InvalidValue {
                field: "polling.max_interval_ms".to_string(),
                message: "must not be less than polling.interval_ms".to_string(),
            });
        }

        let factor = self.polling.backoff_factor;
        if !factor.is_finite() || !(1.0..=MAX_BACKOFF_FACTOR).contains(&factor) {
            return Err(ConfigError::InvalidValue {
                field: "polling.backoff_factor".to_string(),
                message: format!("must be between 1.0 and {}", MAX_BACKOFF_FACTOR),
            });
        }

        if self.restore.archive.program.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "restore.archive.program".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                message: format!("must be one of: {:?}", valid_levels),
            });
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Platform backend type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformBackend {
    /// oVirt/RHV REST API
    #[default]
    Ovirt,
    /// In-memory mock for development
    Mock,
}

/// Management platform connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Backend type
    pub backend: PlatformBackend,
    /// API entry point
    pub url: String,
    /// User name including the profile
    pub username: String,
    /// Password
    pub password: String,
    /// Skip TLS certificate verification
    pub insecure: bool,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        let ovirt = OvirtConfig::default();
        Self {
            backend: PlatformBackend::default(),
            url: ovirt.url,
            username: ovirt.username,
            password: ovirt.password,
            insecure: ovirt.insecure,
            timeout_secs: ovirt.timeout_secs,
        }
    }
}

impl PlatformConfig {
    /// Connection settings for the oVirt client.
    pub fn ovirt(&self) -> OvirtConfig {
        OvirtConfig {
            url: self.url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            insecure: self.insecure,
            timeout_secs: self.timeout_secs,
        }
    }
}

/// Polling configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// First delay between status probes, in milliseconds
    pub interval_ms: u64,
    /// Delay cap after backoff, in milliseconds
    pub max_interval_ms: u64,
    /// Delay multiplier per probe
    pub backoff_factor: f64,
    /// Overall deadline in seconds; 0 waits indefinitely
    pub timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        let policy = PollPolicy::default();
        Self {
            interval_ms: policy.interval.as_millis() as u64,
            max_interval_ms: policy.max_interval.as_millis() as u64,
            backoff_factor: policy.backoff_factor,
            timeout_secs: policy.timeout.map(|t| t.as_secs()).unwrap_or(0),
        }
    }
}

impl PollingConfig {
    /// The poll policy described by this configuration.
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.interval_ms),
            max_interval: Duration::from_millis(self.max_interval_ms),
            backoff_factor: self.backoff_factor,
            timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
        }
    }
}

/// Backup configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Template clones are bound to
    pub template: String,
    /// Directory OVF files are written to
    pub output_dir: PathBuf,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            template: vmbackup_engine::export::DEFAULT_TEMPLATE.to_string(),
            output_dir: PathBuf::from("."),
        }
    }
}

/// Restore configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    /// Local directory backups are retrieved into
    pub path: PathBuf,
    /// Directory holding the export domain
    pub export_path: PathBuf,
    /// Archive client
    pub archive: ArchiveConfig,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(vmbackup_engine::restore::DEFAULT_BACKUP_ROOT),
            export_path: PathBuf::from(vmbackup_engine::restore::DEFAULT_EXPORT_ROOT),
            archive: ArchiveConfig::default(),
        }
    }
}

/// Archive client command.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Program to run
    pub program: String,
    /// Arguments placed before `retrieve <path>/ -subdir=yes`
    pub args: Vec<String>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            program: "sudo".to_string(),
            args: vec!["dsmc".to_string()],
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log file, rotated daily. Unset logs to stderr only.
    pub file: Option<PathBuf>,
    /// JSON lines on stderr instead of text (no log file)
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            json: false,
        }
    }
}
