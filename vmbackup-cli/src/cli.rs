//! Command-line argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// vmbackup - snapshot/export backup and export-domain restore for oVirt VMs
#[derive(Parser, Debug)]
#[command(name = "vmbackup")]
#[command(about = "Snapshot/export backup and export-domain restore for oVirt/RHV virtual machines")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long, env = "VMBACKUP_CONFIG", global = true)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Log file, rotated daily (bare flag: /var/log/ovirt-vm-backup/vmbackup.log)
    #[arg(long, global = true, num_args = 0..=1, default_missing_value = vmbackup_common::DEFAULT_LOG_FILE)]
    pub log_file: Option<PathBuf>,

    /// Log JSON lines to stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Engine API URL, e.g. https://engine.example.com/ovirt-engine/api
    #[arg(long, env = "VMBACKUP_URL", global = true)]
    pub url: Option<String>,

    /// Engine user, e.g. admin@internal
    #[arg(short, long, env = "VMBACKUP_USERNAME", global = true)]
    pub username: Option<String>,

    /// Engine password
    #[arg(long, env = "VMBACKUP_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Give up waiting for a remote operation after this many seconds (0 = wait forever)
    #[arg(long, global = true)]
    pub poll_timeout: Option<u64>,

    /// Enable development mode (in-memory mock platform)
    #[arg(long, global = true)]
    pub dev: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Snapshot a VM, export a clone of the snapshot, then delete the snapshot
    Backup {
        /// VM to back up
        vm: String,

        /// Name of the exported clone (default: <vm>-backup-<timestamp>)
        #[arg(long)]
        name: Option<String>,

        /// Snapshot description (default: <vm>-<timestamp>)
        #[arg(long)]
        description: Option<String>,

        /// Directory the OVF files are written to
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Create or delete a snapshot
    Snapshot {
        #[command(subcommand)]
        action: SnapshotCommand,
    },

    /// Write a snapshot's OVF as <vm>.ovf and <vm>.xml
    Ovf {
        vm: String,
        description: String,

        /// Directory the OVF files are written to
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Show whether a VM exists and its power state
    Status { vm: String },

    /// Show the export domain of a VM's data center
    ExportDomain { vm: String },

    /// Retrieve a backup from the archive and move it into the export domain
    Restore {
        /// Directory under the backup path to retrieve
        dir: String,

        /// Local directory backups are retrieved into
        #[arg(long)]
        path: Option<PathBuf>,

        /// Directory holding the export domain
        #[arg(long)]
        export_path: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum SnapshotCommand {
    /// Create a snapshot and wait until it is ready
    Create { vm: String, description: String },
    /// Delete the snapshot with this description
    Delete { vm: String, description: String },
}

impl Command {
    /// Whether the command talks to the engine.
    pub fn needs_platform(&self) -> bool {
        !matches!(self, Command::Restore { .. })
    }

    /// Whether Ctrl-C should cancel the command's polls instead of
    /// terminating the process. Restore never polls.
    pub fn is_cancellable(&self) -> bool {
        !matches!(self, Command::Restore { .. })
    }
}
