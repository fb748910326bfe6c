//! Export orchestration.
//!
//! Turns a snapshot into a standalone VM bound to the Blank template, pushes
//! VMs into the data center's export domain, and writes a snapshot's OVF to
//! disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use vmbackup_platform::{
    Platform, PlatformError, StorageDomainInfo, VmCloneSpec, VmInfo, VmPowerState,
};

use crate::error::{BackupError, Result};
use crate::ovf::{pretty_print, OvfDescriptor};
use crate::poll::{poll_until, PollPolicy};
use crate::snapshot::SnapshotManager;

/// Default name of the template clones are bound to.
pub const DEFAULT_TEMPLATE: &str = "Blank";

/// Files written by [`ExportOrchestrator::fetch_ovf`].
#[derive(Debug, Clone)]
pub struct OvfArtifacts {
    /// Raw OVF as stored in the snapshot (`<vm>.ovf`)
    pub ovf_path: PathBuf,
    /// Indented rendering of the same document (`<vm>.xml`)
    pub xml_path: PathBuf,
    /// The parsed descriptor
    pub descriptor: OvfDescriptor,
}

/// Export orchestrator.
pub struct ExportOrchestrator {
    platform: Arc<dyn Platform>,
    snapshots: SnapshotManager,
    policy: PollPolicy,
    cancel: CancellationToken,
    template: String,
    output_dir: PathBuf,
}

impl ExportOrchestrator {
    /// Create an orchestrator using the Blank template and writing OVF files
    /// to the current directory.
    pub fn new(platform: Arc<dyn Platform>, policy: PollPolicy, cancel: CancellationToken) -> Self {
        Self {
            snapshots: SnapshotManager::new(platform.clone(), policy.clone(), cancel.clone()),
            platform,
            policy,
            cancel,
            template: DEFAULT_TEMPLATE.to_string(),
            output_dir: PathBuf::from("."),
        }
    }

    /// Template clones are bound to.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Directory `fetch_ovf` writes into.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Whether a VM with this name exists.
    pub async fn vm_exists(&self, name: &str) -> Result<bool> {
        match self.platform.find_vm(name).await {
            Ok(vm) => Ok(vm.is_some()),
            Err(PlatformError::VmNotFound(_)) | Err(PlatformError::NotFound(_)) => Ok(false),
            Err(PlatformError::Request { status: 404, .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Current power state of a VM.
    pub async fn vm_power_state(&self, name: &str) -> Result<VmPowerState> {
        Ok(self.snapshots.vm(name).await?.status)
    }

    /// Clone a snapshot into a new VM and wait for it to settle `down`.
    #[instrument(skip(self), fields(vm = %vm_name, new_name = %new_name, description = %description))]
    pub async fn materialize_export(
        &self,
        vm_name: &str,
        new_name: &str,
        description: &str,
    ) -> Result<VmInfo> {
        let (vm, snapshot) = self.snapshots.find_snapshot(vm_name, description, false).await?;
        let cluster = self.platform.get_cluster(&vm.cluster_id).await?;
        let template = self.platform
            .find_template(&self.template)
            .await?
            .ok_or_else(|| BackupError::NotFound(format!("template {}", self.template)))?;

        info!(
            snapshot_id = %snapshot.id,
            cluster = %cluster.name,
            template = %template.name,
            "Creating VM from snapshot"
        );
        let created = self.platform
            .create_vm(VmCloneSpec {
                name: new_name.to_string(),
                cluster_id: cluster.id,
                template_id: template.id,
                snapshot_id: snapshot.id,
            })
            .await?;

        self.wait_for_state(&created, VmPowerState::Down, "creation").await?;
        info!(vm_id = %created.id, "Clone ready");
        Ok(VmInfo { status: VmPowerState::Down, ..created })
    }

    /// Write a snapshot's OVF as `<vm>.ovf` and `<vm>.xml`.
    #[instrument(skip(self), fields(vm = %vm_name, description = %description))]
    pub async fn fetch_ovf(&self, vm_name: &str, description: &str) -> Result<OvfArtifacts> {
        let (_, snapshot) = self.snapshots.find_snapshot(vm_name, description, true).await?;
        let ovf = snapshot.configuration.ok_or_else(|| {
            BackupError::NotFound(format!("OVF configuration of snapshot '{}'", description))
        })?;

        let descriptor = OvfDescriptor::parse(&ovf)?;
        let pretty = pretty_print(&ovf)?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| BackupError::io(&self.output_dir, e))?;
        let ovf_path = self.output_dir.join(format!("{}.ovf", vm_name));
        let xml_path = self.output_dir.join(format!("{}.xml", vm_name));
        write_file(&ovf_path, ovf.as_bytes()).await?;
        write_file(&xml_path, pretty.as_bytes()).await?;

        info!(
            ovf = %ovf_path.display(),
            xml = %xml_path.display(),
            disks = descriptor.disks.len(),
            "Wrote OVF"
        );
        Ok(OvfArtifacts { ovf_path, xml_path, descriptor })
    }

    /// Find the export storage domain of the VM's data center.
    ///
    /// Returns `None` when the data center has no export domain. With more
    /// than one, the first listed is returned.
    #[instrument(skip(self), fields(vm = %vm_name))]
    pub async fn locate_export_domain(&self, vm_name: &str) -> Result<Option<StorageDomainInfo>> {
        let vm = self.snapshots.vm(vm_name).await?;
        let cluster = self.platform.get_cluster(&vm.cluster_id).await?;
        let datacenter = self.platform.get_datacenter(&cluster.datacenter_id).await?;
        let domains = self.platform.list_storage_domains(&datacenter.id).await?;
        debug!(datacenter = %datacenter.name, domains = domains.len(), "Listed storage domains");

        let mut exports = domains.into_iter().filter(StorageDomainInfo::is_export);
        let Some(first) = exports.next() else {
            info!(datacenter = %datacenter.name, "No export domain attached");
            return Ok(None);
        };
        let others = exports.count();
        if others > 0 {
            warn!(
                datacenter = %datacenter.name,
                count = others + 1,
                chosen = %first.name,
                "Several export domains attached; using the first listed"
            );
        }
        Ok(Some(first))
    }

    /// Export a VM into an export domain and wait for it to settle `down`.
    #[instrument(skip(self, domain), fields(vm = %vm_name, domain = %domain.name))]
    pub async fn export_to_domain(&self, vm_name: &str, domain: &StorageDomainInfo) -> Result<()> {
        let vm = self.snapshots.vm(vm_name).await?;
        self.export_vm_to_domain(&vm, domain).await
    }

    /// Export an already resolved VM, skipping the name lookup.
    pub async fn export_vm_to_domain(&self, vm: &VmInfo, domain: &StorageDomainInfo) -> Result<()> {
        self.platform.export_vm(&vm.id, &domain.id).await?;
        self.wait_for_state(vm, VmPowerState::Down, "export").await?;
        info!(vm = %vm.name, domain = %domain.name, "Export complete");
        Ok(())
    }

    /// Polls by id; a freshly created VM may not be searchable by name yet.
    async fn wait_for_state(&self, vm: &VmInfo, target: VmPowerState, action: &str) -> Result<()> {
        let platform = &self.platform;
        let vm_id = vm.id.as_str();
        let stats = poll_until(
            &format!("{} of vm {}", action, vm.name),
            &self.policy,
            &self.cancel,
            target,
            move || async move { Ok::<_, BackupError>(platform.get_vm_by_id(vm_id).await?.status) },
        )
        .await?;
        debug!(attempts = stats.attempts, elapsed_secs = stats.elapsed.as_secs(), "VM reached {}", target);
        Ok(())
    }
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| BackupError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use vmbackup_platform::{MockOperation, MockPlatform, SnapshotStatus, StorageDomainType};

    const OVF: &str = r#"<ovf:Envelope xmlns:ovf="http://schemas.dmtf.org/ovf/envelope/1/"><Section><Disk ovf:fileRef="grp1/disk1"/></Section></ovf:Envelope>"#;

    fn orchestrator(platform: &Arc<MockPlatform>) -> ExportOrchestrator {
        ExportOrchestrator::new(
            platform.clone(),
            PollPolicy::fixed(Duration::from_secs(1), Some(Duration::from_secs(60))),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_vm_exists() {
        let platform = Arc::new(MockPlatform::new());
        platform.add_vm("web01", VmPowerState::Up);
        let export = orchestrator(&platform);

        assert!(export.vm_exists("web01").await.unwrap());
        assert!(!export.vm_exists("ghost").await.unwrap());

        platform.fail_next(MockOperation::FindVm, PlatformError::Request {
            status: 404,
            reason: "Not Found".to_string(),
        });
        assert!(!export.vm_exists("web01").await.unwrap());

        platform.fail_next(MockOperation::FindVm, PlatformError::Connection("refused".to_string()));
        assert!(export.vm_exists("web01").await.is_err());
    }

    #[tokio::test]
    async fn test_vm_power_state() {
        let platform = Arc::new(MockPlatform::new());
        platform.add_vm("web01", VmPowerState::Up);
        let export = orchestrator(&platform);

        assert_eq!(export.vm_power_state("web01").await.unwrap(), VmPowerState::Up);
        assert!(matches!(export.vm_power_state("ghost").await, Err(BackupError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_materialize_export() {
        let platform = Arc::new(MockPlatform::new().with_vm_settle_reads(2));
        platform.add_vm("web01", VmPowerState::Up);
        platform.seed_snapshot("web01", "snap", SnapshotStatus::Ok);

        let clone = orchestrator(&platform)
            .materialize_export("web01", "web01-backup", "snap")
            .await
            .unwrap();

        assert_eq!(clone.name, "web01-backup");
        assert_eq!(clone.status, VmPowerState::Down);
        assert_eq!(platform.vm_names(), vec!["web01", "web01-backup"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_materialize_export_before_clone_is_searchable() {
        let platform = Arc::new(MockPlatform::new().with_vm_settle_reads(2).with_search_lag(10));
        platform.add_vm("web01", VmPowerState::Up);
        platform.seed_snapshot("web01", "snap", SnapshotStatus::Ok);

        let clone = orchestrator(&platform)
            .materialize_export("web01", "web01-backup", "snap")
            .await
            .unwrap();

        assert_eq!(clone.status, VmPowerState::Down);
        assert_eq!(platform.call_count(MockOperation::GetVm), 3);
    }

    #[tokio::test]
    async fn test_materialize_export_name_collision() {
        let platform = Arc::new(MockPlatform::new());
        platform.add_vm("web01", VmPowerState::Up);
        platform.add_vm("taken", VmPowerState::Down);
        platform.seed_snapshot("web01", "snap", SnapshotStatus::Ok);

        let err = orchestrator(&platform)
            .materialize_export("web01", "taken", "snap")
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::RemoteOperation { status: Some(409), .. }));
    }

    #[tokio::test]
    async fn test_materialize_export_missing_template() {
        let platform = Arc::new(MockPlatform::new());
        platform.add_vm("web01", VmPowerState::Up);
        platform.seed_snapshot("web01", "snap", SnapshotStatus::Ok);

        let err = orchestrator(&platform)
            .with_template("Golden")
            .materialize_export("web01", "clone", "snap")
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::NotFound(ref what) if what.contains("Golden")));
        assert_eq!(platform.call_count(MockOperation::CreateVm), 0);
    }

    #[tokio::test]
    async fn test_fetch_ovf_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let platform = Arc::new(MockPlatform::new());
        platform.add_vm("web01", VmPowerState::Up);
        platform.set_vm_ovf("web01", OVF);
        platform.seed_snapshot("web01", "snap", SnapshotStatus::Ok);

        let artifacts = orchestrator(&platform)
            .with_output_dir(dir.path())
            .fetch_ovf("web01", "snap")
            .await
            .unwrap();

        assert_eq!(artifacts.ovf_path, dir.path().join("web01.ovf"));
        assert_eq!(artifacts.xml_path, dir.path().join("web01.xml"));
        assert_eq!(std::fs::read_to_string(&artifacts.ovf_path).unwrap(), OVF);
        let pretty = std::fs::read_to_string(&artifacts.xml_path).unwrap();
        assert!(pretty.contains("\n  <Section>"));
        assert_eq!(artifacts.descriptor.disk_groups(), vec!["grp1"]);
    }

    #[tokio::test]
    async fn test_fetch_ovf_malformed_payload() {
        let dir = tempfile::tempdir().unwrap();
        let platform = Arc::new(MockPlatform::new());
        platform.add_vm("web01", VmPowerState::Up);
        platform.set_vm_ovf("web01", "<ovf:Envelope><Section>");
        platform.seed_snapshot("web01", "snap", SnapshotStatus::Ok);

        let err = orchestrator(&platform)
            .with_output_dir(dir.path())
            .fetch_ovf("web01", "snap")
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::Parse(_)));
        assert!(!dir.path().join("web01.ovf").exists());
    }

    #[tokio::test]
    async fn test_fetch_ovf_without_configuration() {
        let platform = Arc::new(MockPlatform::new());
        platform.add_vm("web01", VmPowerState::Up);
        platform.seed_snapshot("web01", "snap", SnapshotStatus::Ok);

        let err = orchestrator(&platform).fetch_ovf("web01", "snap").await.unwrap_err();
        assert!(matches!(err, BackupError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fetch_ovf_unwritable_output() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();
        let platform = Arc::new(MockPlatform::new());
        platform.add_vm("web01", VmPowerState::Up);
        platform.set_vm_ovf("web01", OVF);
        platform.seed_snapshot("web01", "snap", SnapshotStatus::Ok);

        let err = orchestrator(&platform)
            .with_output_dir(blocker.join("sub"))
            .fetch_ovf("web01", "snap")
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::Io { .. }));
    }

    #[tokio::test]
    async fn test_locate_export_domain() {
        let platform = Arc::new(MockPlatform::new());
        platform.add_vm("web01", VmPowerState::Up);
        let export = orchestrator(&platform);

        platform.add_storage_domain("data1", StorageDomainType::Data);
        assert!(export.locate_export_domain("web01").await.unwrap().is_none());

        let first = platform.add_storage_domain("export1", StorageDomainType::Export);
        platform.add_storage_domain("export2", StorageDomainType::Export);
        let found = export.locate_export_domain("web01").await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_to_domain() {
        let platform = Arc::new(MockPlatform::new().with_vm_settle_reads(3));
        platform.add_vm("web01-backup", VmPowerState::Down);
        let domain = platform.add_storage_domain("export1", StorageDomainType::Export);

        orchestrator(&platform).export_to_domain("web01-backup", &domain).await.unwrap();
        assert_eq!(platform.call_count(MockOperation::ExportVm), 1);
        // One lookup for the id, then three image_locked reads and the final down.
        assert_eq!(platform.call_count(MockOperation::FindVm), 1);
        assert_eq!(platform.call_count(MockOperation::GetVm), 4);
    }

    #[tokio::test]
    async fn test_export_running_vm_rejected() {
        let platform = Arc::new(MockPlatform::new());
        platform.add_vm("web01", VmPowerState::Up);
        let domain = platform.add_storage_domain("export1", StorageDomainType::Export);

        let err = orchestrator(&platform).export_to_domain("web01", &domain).await.unwrap_err();
        assert!(matches!(err, BackupError::RemoteOperation { status: Some(409), .. }));
    }
}
