//! Full backup workflow: snapshot, OVF, clone, export, cleanup.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};
use vmbackup_platform::{Platform, StorageDomainInfo, VmInfo};

use crate::error::{BackupError, Result};
use crate::export::{ExportOrchestrator, OvfArtifacts, DEFAULT_TEMPLATE};
use crate::poll::PollPolicy;
use crate::snapshot::SnapshotManager;

/// Timestamp format used in default snapshot descriptions and clone names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M";

/// Per-run options. Unset names default to timestamped ones.
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    /// Name of the clone to export
    pub clone_name: Option<String>,
    /// Snapshot description
    pub description: Option<String>,
}

/// Names resolved for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupNames {
    pub description: String,
    pub clone_name: String,
}

impl BackupNames {
    /// Resolve names, filling unset ones from `now`.
    pub fn resolve(vm_name: &str, options: &BackupOptions, now: DateTime<Local>) -> Self {
        let stamp = now.format(TIMESTAMP_FORMAT).to_string();
        Self {
            description: options
                .description
                .clone()
                .unwrap_or_else(|| format!("{}-{}", vm_name, stamp)),
            clone_name: options
                .clone_name
                .clone()
                .unwrap_or_else(|| format!("{}-backup-{}", vm_name, stamp)),
        }
    }
}

/// Outcome of a successful backup.
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub names: BackupNames,
    pub export_domain: StorageDomainInfo,
    pub clone: VmInfo,
    pub ovf: OvfArtifacts,
}

/// Sequences the snapshot and export managers into one backup run.
pub struct BackupWorkflow {
    snapshots: SnapshotManager,
    export: ExportOrchestrator,
}

impl BackupWorkflow {
    pub fn new(platform: Arc<dyn Platform>, policy: PollPolicy, cancel: CancellationToken) -> Self {
        Self {
            snapshots: SnapshotManager::new(platform.clone(), policy.clone(), cancel.clone()),
            export: ExportOrchestrator::new(platform, policy, cancel),
        }
    }

    /// Set the clone template and the OVF output directory.
    pub fn with_export_settings(mut self, template: Option<&str>, output_dir: Option<PathBuf>) -> Self {
        self.export = self.export.with_template(template.unwrap_or(DEFAULT_TEMPLATE));
        if let Some(dir) = output_dir {
            self.export = self.export.with_output_dir(dir);
        }
        self
    }

    /// Back up a VM into its data center's export domain.
    ///
    /// Preconditions are checked before anything is created. If a step
    /// after snapshot creation fails, the snapshot (and the clone, if it
    /// was created) are left in place.
    #[instrument(skip(self, options), fields(vm = %vm_name))]
    pub async fn run(&self, vm_name: &str, options: &BackupOptions) -> Result<BackupReport> {
        let names = BackupNames::resolve(vm_name, options, Local::now());

        if !self.export.vm_exists(vm_name).await? {
            return Err(BackupError::NotFound(format!("vm {}", vm_name)));
        }
        if self.export.vm_exists(&names.clone_name).await? {
            return Err(BackupError::AlreadyExists(format!("vm {}", names.clone_name)));
        }
        let export_domain = self.export
            .locate_export_domain(vm_name)
            .await?
            .ok_or_else(|| BackupError::NotFound(format!("export domain for vm {}", vm_name)))?;

        info!(
            description = %names.description,
            clone = %names.clone_name,
            export_domain = %export_domain.name,
            "Starting backup"
        );

        self.snapshots.create_snapshot(vm_name, &names.description).await?;

        let result = self.after_snapshot(vm_name, &names, &export_domain).await;
        let (ovf, clone) = match result {
            Ok(done) => done,
            Err(e) => {
                error!(
                    description = %names.description,
                    error = %e,
                    "Backup failed after snapshot creation; snapshot left in place"
                );
                return Err(e);
            }
        };

        self.snapshots.delete_snapshot(vm_name, &names.description).await?;
        info!(clone = %clone.name, "Backup complete");

        Ok(BackupReport { names, export_domain, clone, ovf })
    }

    async fn after_snapshot(
        &self,
        vm_name: &str,
        names: &BackupNames,
        export_domain: &StorageDomainInfo,
    ) -> Result<(OvfArtifacts, VmInfo)> {
        let ovf = self.export.fetch_ovf(vm_name, &names.description).await?;
        let clone = self.export
            .materialize_export(vm_name, &names.clone_name, &names.description)
            .await?;
        self.export.export_vm_to_domain(&clone, export_domain).await?;
        Ok((ovf, clone))
    }
}
