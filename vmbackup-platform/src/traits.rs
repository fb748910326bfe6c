//! Core platform abstraction trait.

use async_trait::async_trait;

use crate::error::{PlatformError, Result};
use crate::types::*;

/// Management platform facade.
///
/// Every method maps to a single remote call. Implementations never retry:
/// a failed call is reported to the caller as-is.
#[async_trait]
pub trait Platform: Send + Sync {
    // =========================================================================
    // Health
    // =========================================================================

    /// Product version reported by the engine.
    async fn api_version(&self) -> Result<String>;

    // =========================================================================
    // Virtual Machines
    // =========================================================================

    /// Look up a VM by name. Returns `None` if no such VM exists.
    async fn find_vm(&self, name: &str) -> Result<Option<VmInfo>>;

    /// Look up a VM by name, failing with `VmNotFound` if it does not exist.
    async fn get_vm(&self, name: &str) -> Result<VmInfo> {
        self.find_vm(name)
            .await?
            .ok_or_else(|| PlatformError::VmNotFound(name.to_string()))
    }

    /// Fetch a VM by id.
    async fn get_vm_by_id(&self, vm_id: &str) -> Result<VmInfo>;

    /// Create a new VM seeded from a snapshot.
    async fn create_vm(&self, spec: VmCloneSpec) -> Result<VmInfo>;

    /// Export a VM into an export storage domain.
    async fn export_vm(&self, vm_id: &str, storage_domain_id: &str) -> Result<()>;

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Request creation of a snapshot. The snapshot starts out `locked`.
    async fn add_snapshot(&self, vm_id: &str, description: &str) -> Result<SnapshotInfo>;

    /// List the snapshots of a VM in the engine's listing order.
    ///
    /// With `all_content` the OVF configuration payload is included.
    async fn list_snapshots(&self, vm_id: &str, all_content: bool) -> Result<Vec<SnapshotInfo>>;

    /// Fetch a single snapshot by id.
    async fn get_snapshot(&self, vm_id: &str, snapshot_id: &str) -> Result<SnapshotInfo>;

    /// Delete a snapshot.
    async fn delete_snapshot(&self, vm_id: &str, snapshot_id: &str) -> Result<()>;

    // =========================================================================
    // Reference Data
    // =========================================================================

    /// Fetch a cluster by id.
    async fn get_cluster(&self, cluster_id: &str) -> Result<ClusterInfo>;

    /// Fetch a data center by id.
    async fn get_datacenter(&self, datacenter_id: &str) -> Result<DataCenterInfo>;

    /// List the storage domains attached to a data center.
    async fn list_storage_domains(&self, datacenter_id: &str) -> Result<Vec<StorageDomainInfo>>;

    /// Look up a template by name.
    async fn find_template(&self, name: &str) -> Result<Option<TemplateInfo>>;
}
