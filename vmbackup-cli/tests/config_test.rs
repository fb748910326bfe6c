//! Configuration loading and validation tests.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use vmbackup_cli::cli::Args;
use vmbackup_cli::config::{Config, ConfigError, PlatformBackend};

/// Defaults are valid for local commands but need an engine URL for remote ones.
#[test]
fn test_default_config() {
    let config = Config::default();
    assert!(config.validate(false).is_ok());
    assert!(matches!(
        config.validate(true),
        Err(ConfigError::InvalidValue { ref field, .. }) if field == "platform.url"
    ));
    assert_eq!(config.restore.path, PathBuf::from("/data/restore"));
    assert_eq!(config.restore.archive.program, "sudo");
    assert_eq!(config.restore.archive.args, vec!["dsmc"]);
    assert_eq!(config.backup.template, "Blank");
}

#[test]
fn test_config_yaml_parsing() {
    let yaml = r#"
platform:
  url: https://engine.example.com/ovirt-engine/api
  username: backup@internal
  password: secret
  insecure: true

polling:
  interval_ms: 2000
  max_interval_ms: 30000
  backoff_factor: 2.0
  timeout_secs: 7200

backup:
  output_dir: /var/lib/vmbackup/ovf

restore:
  path: /srv/restore
  export_path: /srv/export
  archive:
    program: dsmc
    args: []

logging:
  level: debug
  file: /var/log/ovirt-vm-backup/restore.log
"#;

    let config = Config::from_yaml(yaml).unwrap();
    assert!(config.validate(true).is_ok());

    assert_eq!(config.platform.backend, PlatformBackend::Ovirt);
    assert_eq!(config.platform.username, "backup@internal");
    assert!(config.platform.insecure);
    // Unset keys keep their defaults.
    assert_eq!(config.platform.timeout_secs, 60);
    assert_eq!(config.backup.template, "Blank");

    let policy = config.polling.policy();
    assert_eq!(policy.interval, Duration::from_secs(2));
    assert_eq!(policy.max_interval, Duration::from_secs(30));
    assert_eq!(policy.timeout, Some(Duration::from_secs(7200)));

    assert_eq!(config.restore.export_path, PathBuf::from("/srv/export"));
    assert!(config.restore.archive.args.is_empty());
    assert_eq!(config.logging.file, Some(PathBuf::from("/var/log/ovirt-vm-backup/restore.log")));

    let ovirt = config.platform.ovirt();
    assert_eq!(ovirt.url, "https://engine.example.com/ovirt-engine/api");
    assert_eq!(ovirt.password, "secret");
}

#[test]
fn test_empty_yaml_is_default() {
    let config = Config::from_yaml("").unwrap();
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_invalid_yaml() {
    assert!(Config::from_yaml("polling: [1, 2").is_err());
    assert!(Config::from_yaml("platform:\n  backend: vmware\n").is_err());
}

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vmbackup.yaml");
    std::fs::write(&path, "platform:\n  backend: mock\n").unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.platform.backend, PlatformBackend::Mock);
    // The mock backend needs no URL.
    assert!(config.validate(true).is_ok());

    assert!(Config::load(dir.path().join("missing.yaml")).is_err());
}

#[test]
fn test_validation_rejects_bad_values() {
    let mut config = Config::default();
    config.polling.interval_ms = 0;
    assert!(config.validate(false).is_err());

    let mut config = Config::default();
    config.polling.backoff_factor = 0.5;
    assert!(config.validate(false).is_err());

    let mut config = Config::default();
    config.polling.max_interval_ms = 10;
    assert!(config.validate(false).is_err());

    let mut config = Config::default();
    config.logging.level = "verbose".to_string();
    assert!(config.validate(false).is_err());

    let mut config = Config::default();
    config.platform.url = "engine.example.com".to_string();
    assert!(config.validate(true).is_err());
}

#[test]
fn test_cli_overrides() {
    let args = Args::try_parse_from([
        "vmbackup",
        "--url", "https://other.example.com/ovirt-engine/api",
        "--insecure",
        "--poll-timeout", "0",
        "--log-level", "warn",
        "--dev",
        "status", "web01",
    ]).unwrap();

    let config = Config::default().with_cli_overrides(&args);
    assert_eq!(config.platform.url, "https://other.example.com/ovirt-engine/api");
    assert!(config.platform.insecure);
    assert_eq!(config.platform.backend, PlatformBackend::Mock);
    assert_eq!(config.polling.policy().timeout, None);
    assert_eq!(config.logging.level, "warn");
}
