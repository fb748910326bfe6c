//! Mock platform for testing and development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, instrument};

use crate::error::{PlatformError, Result};
use crate::traits::Platform;
use crate::types::*;

/// Operations of the mock platform, used for failure injection and the
/// call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    FindVm,
    GetVm,
    CreateVm,
    ExportVm,
    AddSnapshot,
    ListSnapshots,
    GetSnapshot,
    DeleteSnapshot,
    GetCluster,
    GetDatacenter,
    ListStorageDomains,
    FindTemplate,
}

/// Mock management platform.
///
/// Simulates the engine in memory. Asynchronous transitions are scripted:
/// a new snapshot reads back as `locked` for a configurable number of
/// reads before turning `ok`, and a new or exporting VM reads back as
/// `image_locked` before settling to `down`. Name search can be made to
/// lag behind VM creation. Useful for:
/// - Unit and integration testing
/// - Dry runs without an engine
pub struct MockPlatform {
    state: RwLock<MockState>,
}

struct MockState {
    vms: Vec<MockVm>,
    snapshots: HashMap<String, Vec<MockSnapshot>>,
    clusters: Vec<ClusterInfo>,
    datacenters: Vec<DataCenterInfo>,
    storage_domains: HashMap<String, Vec<StorageDomainInfo>>,
    templates: Vec<TemplateInfo>,
    failures: HashMap<MockOperation, PlatformError>,
    calls: Vec<MockOperation>,
    snapshot_settle_reads: u32,
    vm_settle_reads: u32,
    search_lag: u32,
}

struct MockVm {
    info: VmInfo,
    ovf: Option<String>,
    pending_reads: u32,
    settle_to: VmPowerState,
    /// Name searches that still miss this VM
    hidden_searches: u32,
}

impl MockVm {
    fn read(&mut self) -> VmInfo {
        if self.pending_reads > 0 {
            self.pending_reads -= 1;
        } else {
            self.info.status = self.settle_to;
        }
        debug!(vm = %self.info.name, status = %self.info.status, "Read mock VM");
        self.info.clone()
    }
}

struct MockSnapshot {
    info: SnapshotInfo,
    pending_reads: u32,
}

impl MockState {
    /// Record a call and hand out an injected failure, if any.
    fn enter(&mut self, op: MockOperation) -> Result<()> {
        self.calls.push(op);
        match self.failures.remove(&op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn vm_by_id(&self, vm_id: &str) -> Result<&MockVm> {
        self.vms.iter()
            .find(|vm| vm.info.id == vm_id)
            .ok_or_else(|| not_found(&format!("vm {}", vm_id)))
    }
}

fn not_found(what: &str) -> PlatformError {
    PlatformError::Request {
        status: 404,
        reason: format!("Not Found: {}", what),
    }
}

impl MockPlatform {
    /// Default data center id.
    pub const DEFAULT_DATACENTER_ID: &'static str = "dc-default";
    /// Default cluster id.
    pub const DEFAULT_CLUSTER_ID: &'static str = "cluster-default";

    /// Create a mock platform with one data center, one cluster and the
    /// Blank template.
    pub fn new() -> Self {
        info!("Creating mock platform");
        Self {
            state: RwLock::new(MockState {
                vms: Vec::new(),
                snapshots: HashMap::new(),
                clusters: vec![ClusterInfo {
                    id: Self::DEFAULT_CLUSTER_ID.to_string(),
                    name: "Default".to_string(),
                    datacenter_id: Self::DEFAULT_DATACENTER_ID.to_string(),
                }],
                datacenters: vec![DataCenterInfo {
                    id: Self::DEFAULT_DATACENTER_ID.to_string(),
                    name: "Default".to_string(),
                }],
                storage_domains: HashMap::new(),
                templates: vec![TemplateInfo {
                    id: BLANK_TEMPLATE_ID.to_string(),
                    name: "Blank".to_string(),
                }],
                failures: HashMap::new(),
                calls: Vec::new(),
                snapshot_settle_reads: 1,
                vm_settle_reads: 1,
                search_lag: 0,
            }),
        }
    }

    /// Number of reads a new snapshot stays `locked` for.
    pub fn with_snapshot_settle_reads(self, reads: u32) -> Self {
        self.write_state().snapshot_settle_reads = reads;
        self
    }

    /// Number of reads a new or exporting VM stays `image_locked` for.
    pub fn with_vm_settle_reads(self, reads: u32) -> Self {
        self.write_state().vm_settle_reads = reads;
        self
    }

    /// Number of name searches a newly created VM is missing from.
    pub fn with_search_lag(self, searches: u32) -> Self {
        self.write_state().search_lag = searches;
        self
    }

    /// Add a VM to the default cluster.
    pub fn add_vm(&self, name: &str, status: VmPowerState) -> VmInfo {
        let info = VmInfo {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            status,
            cluster_id: Self::DEFAULT_CLUSTER_ID.to_string(),
        };
        self.write_state().vms.push(MockVm {
            info: info.clone(),
            ovf: None,
            pending_reads: 0,
            settle_to: status,
            hidden_searches: 0,
        });
        info
    }

    /// Set the OVF that snapshots of this VM will carry.
    pub fn set_vm_ovf(&self, name: &str, ovf: &str) {
        let mut state = self.write_state();
        if let Some(vm) = state.vms.iter_mut().find(|vm| vm.info.name == name) {
            vm.ovf = Some(ovf.to_string());
        }
    }

    /// Attach a storage domain to the default data center.
    pub fn add_storage_domain(&self, name: &str, domain_type: StorageDomainType) -> StorageDomainInfo {
        let domain = StorageDomainInfo {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            domain_type,
        };
        self.write_state()
            .storage_domains
            .entry(Self::DEFAULT_DATACENTER_ID.to_string())
            .or_default()
            .push(domain.clone());
        domain
    }

    /// Add an already settled snapshot to a VM, appended in listing order.
    pub fn seed_snapshot(&self, vm_name: &str, description: &str, status: SnapshotStatus) -> Option<SnapshotInfo> {
        let mut state = self.write_state();
        let vm = state.vms.iter().find(|vm| vm.info.name == vm_name)?;
        let vm_id = vm.info.id.clone();
        let info = SnapshotInfo {
            id: uuid::Uuid::new_v4().to_string(),
            description: description.to_string(),
            status,
            configuration: vm.ovf.clone(),
        };
        state.snapshots.entry(vm_id).or_default().push(MockSnapshot {
            info: info.clone(),
            pending_reads: 0,
        });
        Some(info)
    }

    /// Make the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: MockOperation, error: PlatformError) {
        self.write_state().failures.insert(op, error);
    }

    /// Operations called so far, in order.
    pub fn calls(&self) -> Vec<MockOperation> {
        self.read_state().calls.clone()
    }

    /// Number of times `op` was called.
    pub fn call_count(&self, op: MockOperation) -> usize {
        self.read_state().calls.iter().filter(|c| **c == op).count()
    }

    /// Names of all VMs, in creation order.
    pub fn vm_names(&self) -> Vec<String> {
        self.read_state().vms.iter().map(|vm| vm.info.name.clone()).collect()
    }

    /// Snapshot descriptions of a VM, in listing order.
    pub fn snapshot_descriptions(&self, vm_name: &str) -> Vec<String> {
        let state = self.read_state();
        let Some(vm) = state.vms.iter().find(|vm| vm.info.name == vm_name) else {
            return Vec::new();
        };
        state.snapshots.get(&vm.info.id)
            .map(|snaps| snaps.iter().map(|s| s.info.description.clone()).collect())
            .unwrap_or_default()
    }

    fn read_state(&self) -> RwLockReadGuard<'_, MockState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, MockState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock(&self) -> Result<RwLockWriteGuard<'_, MockState>> {
        self.state.write().map_err(|_| {
            PlatformError::Internal("Lock poisoned".to_string())
        })
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn api_version(&self) -> Result<String> {
        Ok("mock-4.5".to_string())
    }

    #[instrument(skip(self), fields(vm = %name))]
    async fn find_vm(&self, name: &str) -> Result<Option<VmInfo>> {
        let mut state = self.lock()?;
        state.enter(MockOperation::FindVm)?;

        let Some(vm) = state.vms.iter_mut().find(|vm| vm.info.name == name) else {
            return Ok(None);
        };

        if vm.hidden_searches > 0 {
            vm.hidden_searches -= 1;
            debug!("Mock VM not yet searchable");
            return Ok(None);
        }
        Ok(Some(vm.read()))
    }

    #[instrument(skip(self), fields(vm_id = %vm_id))]
    async fn get_vm_by_id(&self, vm_id: &str) -> Result<VmInfo> {
        let mut state = self.lock()?;
        state.enter(MockOperation::GetVm)?;

        state.vms.iter_mut()
            .find(|vm| vm.info.id == vm_id)
            .map(MockVm::read)
            .ok_or_else(|| not_found(&format!("vm {}", vm_id)))
    }

    #[instrument(skip(self, spec), fields(vm = %spec.name, snapshot_id = %spec.snapshot_id))]
    async fn create_vm(&self, spec: VmCloneSpec) -> Result<VmInfo> {
        info!("Creating mock VM from snapshot");

        let mut state = self.lock()?;
        state.enter(MockOperation::CreateVm)?;

        if state.vms.iter().any(|vm| vm.info.name == spec.name) {
            return Err(PlatformError::Request {
                status: 409,
                reason: format!("Operation Failed: VM name {} is already in use", spec.name),
            });
        }
        if !state.clusters.iter().any(|c| c.id == spec.cluster_id) {
            return Err(not_found(&format!("cluster {}", spec.cluster_id)));
        }
        if !state.templates.iter().any(|t| t.id == spec.template_id) {
            return Err(not_found(&format!("template {}", spec.template_id)));
        }

        let source_ovf = state.snapshots.iter()
            .find_map(|(vm_id, snaps)| {
                snaps.iter()
                    .any(|s| s.info.id == spec.snapshot_id)
                    .then(|| vm_id.clone())
            })
            .ok_or_else(|| not_found(&format!("snapshot {}", spec.snapshot_id)))
            .and_then(|vm_id| state.vm_by_id(&vm_id).map(|vm| vm.ovf.clone()))?;

        let info = VmInfo {
            id: uuid::Uuid::new_v4().to_string(),
            name: spec.name.clone(),
            status: VmPowerState::ImageLocked,
            cluster_id: spec.cluster_id,
        };
        let pending_reads = state.vm_settle_reads;
        let hidden_searches = state.search_lag;
        state.vms.push(MockVm {
            info: info.clone(),
            ovf: source_ovf,
            pending_reads,
            settle_to: VmPowerState::Down,
            hidden_searches,
        });

        info!(vm_id = %info.id, "Mock VM created");
        Ok(info)
    }

    #[instrument(skip(self), fields(vm_id = %vm_id, storage_domain_id = %storage_domain_id))]
    async fn export_vm(&self, vm_id: &str, storage_domain_id: &str) -> Result<()> {
        info!("Exporting mock VM");

        let mut state = self.lock()?;
        state.enter(MockOperation::ExportVm)?;

        let is_export = state.storage_domains.values()
            .flatten()
            .any(|sd| sd.id == storage_domain_id && sd.is_export());
        if !is_export {
            return Err(PlatformError::Request {
                status: 400,
                reason: format!("Storage domain {} is not an export domain", storage_domain_id),
            });
        }

        let pending_reads = state.vm_settle_reads;
        let vm = state.vms.iter_mut()
            .find(|vm| vm.info.id == vm_id)
            .ok_or_else(|| not_found(&format!("vm {}", vm_id)))?;
        if vm.info.status == VmPowerState::Up {
            return Err(PlatformError::Request {
                status: 409,
                reason: "Operation Failed: VM must be down to be exported".to_string(),
            });
        }

        vm.info.status = VmPowerState::ImageLocked;
        vm.pending_reads = pending_reads;
        vm.settle_to = VmPowerState::Down;

        info!("Mock export started");
        Ok(())
    }

    #[instrument(skip(self), fields(vm_id = %vm_id, description = %description))]
    async fn add_snapshot(&self, vm_id: &str, description: &str) -> Result<SnapshotInfo> {
        info!("Creating mock snapshot");

        let mut state = self.lock()?;
        state.enter(MockOperation::AddSnapshot)?;

        let ovf = state.vm_by_id(vm_id)?.ovf.clone();
        let info = SnapshotInfo {
            id: uuid::Uuid::new_v4().to_string(),
            description: description.to_string(),
            status: SnapshotStatus::Locked,
            configuration: ovf,
        };
        let pending_reads = state.snapshot_settle_reads;
        state.snapshots.entry(vm_id.to_string()).or_default().push(MockSnapshot {
            info: info.clone(),
            pending_reads,
        });

        info!(snapshot_id = %info.id, "Mock snapshot created");
        Ok(SnapshotInfo { configuration: None, ..info })
    }

    async fn list_snapshots(&self, vm_id: &str, all_content: bool) -> Result<Vec<SnapshotInfo>> {
        let mut state = self.lock()?;
        state.enter(MockOperation::ListSnapshots)?;
        state.vm_by_id(vm_id)?;

        let result: Vec<SnapshotInfo> = state.snapshots.get(vm_id)
            .map(|snaps| {
                snaps.iter()
                    .map(|s| SnapshotInfo {
                        configuration: if all_content { s.info.configuration.clone() } else { None },
                        ..s.info.clone()
                    })
                    .collect()
            })
            .unwrap_or_default();

        debug!(count = result.len(), all_content, "Listed snapshots");
        Ok(result)
    }

    async fn get_snapshot(&self, vm_id: &str, snapshot_id: &str) -> Result<SnapshotInfo> {
        let mut state = self.lock()?;
        state.enter(MockOperation::GetSnapshot)?;

        let snapshot = state.snapshots.get_mut(vm_id)
            .and_then(|snaps| snaps.iter_mut().find(|s| s.info.id == snapshot_id))
            .ok_or_else(|| not_found(&format!("snapshot {}", snapshot_id)))?;

        if snapshot.pending_reads > 0 {
            snapshot.pending_reads -= 1;
        } else if snapshot.info.status == SnapshotStatus::Locked {
            snapshot.info.status = SnapshotStatus::Ok;
        }

        Ok(SnapshotInfo { configuration: None, ..snapshot.info.clone() })
    }

    async fn delete_snapshot(&self, vm_id: &str, snapshot_id: &str) -> Result<()> {
        info!(vm_id = %vm_id, snapshot_id = %snapshot_id, "Deleting mock snapshot");

        let mut state = self.lock()?;
        state.enter(MockOperation::DeleteSnapshot)?;

        let snaps = state.snapshots.get_mut(vm_id)
            .ok_or_else(|| not_found(&format!("snapshot {}", snapshot_id)))?;
        let idx = snaps.iter()
            .position(|s| s.info.id == snapshot_id)
            .ok_or_else(|| not_found(&format!("snapshot {}", snapshot_id)))?;
        snaps.remove(idx);

        Ok(())
    }

    async fn get_cluster(&self, cluster_id: &str) -> Result<ClusterInfo> {
        let mut state = self.lock()?;
        state.enter(MockOperation::GetCluster)?;
        state.clusters.iter()
            .find(|c| c.id == cluster_id)
            .cloned()
            .ok_or_else(|| not_found(&format!("cluster {}", cluster_id)))
    }

    async fn get_datacenter(&self, datacenter_id: &str) -> Result<DataCenterInfo> {
        let mut state = self.lock()?;
        state.enter(MockOperation::GetDatacenter)?;
        state.datacenters.iter()
            .find(|dc| dc.id == datacenter_id)
            .cloned()
            .ok_or_else(|| not_found(&format!("datacenter {}", datacenter_id)))
    }

    async fn list_storage_domains(&self, datacenter_id: &str) -> Result<Vec<StorageDomainInfo>> {
        let mut state = self.lock()?;
        state.enter(MockOperation::ListStorageDomains)?;
        Ok(state.storage_domains.get(datacenter_id).cloned().unwrap_or_default())
    }

    async fn find_template(&self, name: &str) -> Result<Option<TemplateInfo>> {
        let mut state = self.lock()?;
        state.enter(MockOperation::FindTemplate)?;
        Ok(state.templates.iter().find(|t| t.name == name).cloned())
    }
}
