//! Type definitions for platform resources.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Well-known id of the platform's "Blank" template.
pub const BLANK_TEMPLATE_ID: &str = "00000000-0000-0000-0000-000000000000";

// =============================================================================
// VIRTUAL MACHINES
// =============================================================================

/// VM power state as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmPowerState {
    Up,
    Down,
    PoweringUp,
    PoweringDown,
    RebootInProgress,
    WaitForLaunch,
    ImageLocked,
    SavingState,
    RestoringState,
    Suspended,
    Paused,
    Migrating,
    NotResponding,
    Unassigned,
    #[serde(other)]
    Unknown,
}

impl VmPowerState {
    /// The engine's wire name for this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::PoweringUp => "powering_up",
            Self::PoweringDown => "powering_down",
            Self::RebootInProgress => "reboot_in_progress",
            Self::WaitForLaunch => "wait_for_launch",
            Self::ImageLocked => "image_locked",
            Self::SavingState => "saving_state",
            Self::RestoringState => "restoring_state",
            Self::Suspended => "suspended",
            Self::Paused => "paused",
            Self::Migrating => "migrating",
            Self::NotResponding => "not_responding",
            Self::Unassigned => "unassigned",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for VmPowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Basic VM information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmInfo {
    /// Engine-assigned VM id
    pub id: String,
    /// VM name (unique within the engine)
    pub name: String,
    /// Current power state
    pub status: VmPowerState,
    /// Cluster the VM runs in
    pub cluster_id: String,
}

/// Request to create a standalone VM from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmCloneSpec {
    /// Name of the new VM
    pub name: String,
    /// Cluster to create it in
    pub cluster_id: String,
    /// Template the VM is bound to (normally Blank)
    pub template_id: String,
    /// Snapshot the disks are seeded from
    pub snapshot_id: String,
}

// =============================================================================
// SNAPSHOTS
// =============================================================================

/// Snapshot status as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Ok,
    Locked,
    InPreview,
    #[serde(other)]
    Unknown,
}

impl SnapshotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Locked => "locked",
            Self::InPreview => "in_preview",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    /// Engine-assigned snapshot id
    pub id: String,
    /// Free-text description; the only lookup key we have
    pub description: String,
    /// Current status
    pub status: SnapshotStatus,
    /// OVF configuration payload. Only present when the snapshot was
    /// listed with full content expansion.
    pub configuration: Option<String>,
}

// =============================================================================
// REFERENCE DATA
// =============================================================================

/// Cluster information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub id: String,
    pub name: String,
    /// Data center the cluster belongs to
    pub datacenter_id: String,
}

/// Data center information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataCenterInfo {
    pub id: String,
    pub name: String,
}

/// Storage domain type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageDomainType {
    Data,
    Iso,
    Export,
    Image,
    Volume,
    ManagedBlockStorage,
    #[serde(other)]
    Unknown,
}

/// Storage domain attached to a data center.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDomainInfo {
    pub id: String,
    pub name: String,
    pub domain_type: StorageDomainType,
}

impl StorageDomainInfo {
    /// Whether this is an export domain.
    pub fn is_export(&self) -> bool {
        self.domain_type == StorageDomainType::Export
    }
}

/// Template information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateInfo {
    pub id: String,
    pub name: String,
}
