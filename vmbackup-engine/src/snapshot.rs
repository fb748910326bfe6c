//! Snapshot lifecycle: create, wait for `ok`, delete.
//!
//! Snapshots are addressed by (VM name, description). Descriptions are not
//! unique on the platform; when several snapshots share one, the first in
//! the platform's listing order wins and a warning is logged. Callers should
//! use unique (timestamped) descriptions.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use vmbackup_platform::{Platform, SnapshotInfo, SnapshotStatus, VmInfo};

use crate::error::{BackupError, Result};
use crate::poll::{poll_until, PollPolicy};

/// Pick the first snapshot with a matching description.
pub fn select_snapshot(snapshots: Vec<SnapshotInfo>, description: &str) -> Option<SnapshotInfo> {
    let mut matches = snapshots.into_iter().filter(|s| s.description == description);
    let first = matches.next()?;
    let others = matches.count();
    if others > 0 {
        warn!(
            description = %description,
            count = others + 1,
            chosen = %first.id,
            "Several snapshots share this description; using the first listed"
        );
    }
    Some(first)
}

/// Creates, resolves and deletes snapshots.
pub struct SnapshotManager {
    platform: Arc<dyn Platform>,
    policy: PollPolicy,
    cancel: CancellationToken,
}

impl SnapshotManager {
    pub fn new(platform: Arc<dyn Platform>, policy: PollPolicy, cancel: CancellationToken) -> Self {
        Self { platform, policy, cancel }
    }

    /// Resolve a VM by name.
    pub async fn vm(&self, vm_name: &str) -> Result<VmInfo> {
        self.platform
            .find_vm(vm_name)
            .await?
            .ok_or_else(|| BackupError::NotFound(format!("vm {}", vm_name)))
    }

    /// Resolve a snapshot by description.
    ///
    /// With `all_content` the snapshot carries its OVF configuration.
    #[instrument(skip(self), fields(vm = %vm_name, description = %description))]
    pub async fn find_snapshot(
        &self,
        vm_name: &str,
        description: &str,
        all_content: bool,
    ) -> Result<(VmInfo, SnapshotInfo)> {
        let vm = self.vm(vm_name).await?;
        let snapshots = self.platform.list_snapshots(&vm.id, all_content).await?;
        let snapshot = select_snapshot(snapshots, description).ok_or_else(|| {
            BackupError::NotFound(format!("snapshot '{}' of vm {}", description, vm_name))
        })?;
        Ok((vm, snapshot))
    }

    /// Create a snapshot and wait until it is `ok`.
    #[instrument(skip(self), fields(vm = %vm_name, description = %description))]
    pub async fn create_snapshot(&self, vm_name: &str, description: &str) -> Result<SnapshotInfo> {
        let vm = self.vm(vm_name).await?;
        info!(vm_id = %vm.id, "Creating snapshot");
        self.platform.add_snapshot(&vm.id, description).await?;

        // Resolved by description, like every later lookup.
        let snapshots = self.platform.list_snapshots(&vm.id, false).await?;
        let snapshot = select_snapshot(snapshots, description).ok_or_else(|| {
            BackupError::NotFound(format!("snapshot '{}' of vm {}", description, vm_name))
        })?;

        let platform = &self.platform;
        let vm_id = vm.id.as_str();
        let snapshot_id = snapshot.id.as_str();
        let stats = poll_until(
            &format!("snapshot '{}' of {}", description, vm_name),
            &self.policy,
            &self.cancel,
            SnapshotStatus::Ok,
            move || async move {
                Ok::<_, BackupError>(platform.get_snapshot(vm_id, snapshot_id).await?.status)
            },
        )
        .await?;

        info!(snapshot_id = %snapshot.id, attempts = stats.attempts, "Snapshot ready");
        Ok(SnapshotInfo { status: SnapshotStatus::Ok, ..snapshot })
    }

    /// Delete the snapshot with the given description.
    #[instrument(skip(self), fields(vm = %vm_name, description = %description))]
    pub async fn delete_snapshot(&self, vm_name: &str, description: &str) -> Result<()> {
        let (vm, snapshot) = self.find_snapshot(vm_name, description, false).await?;
        info!(snapshot_id = %snapshot.id, "Deleting snapshot");
        self.platform.delete_snapshot(&vm.id, &snapshot.id).await?;
        Ok(())
    }
}
