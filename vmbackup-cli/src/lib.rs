//! # vmbackup CLI
//!
//! Command-line front end: argument parsing, YAML configuration and
//! subcommand wiring.
//!
//! ## Usage
//! ```bash
//! vmbackup --config /etc/vmbackup/vmbackup.yaml backup web01
//! vmbackup restore job42 --path /data/restore --export-path /export
//! ```

pub mod cli;
pub mod commands;
pub mod config;
