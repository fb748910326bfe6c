//! JSON representations used by the oVirt REST API v4.
//!
//! The engine renders empty collections as `{}`, so every collection field
//! defaults to empty.

use serde::Deserialize;

use crate::error::{PlatformError, Result};
use crate::types::*;

#[derive(Debug, Deserialize)]
pub(crate) struct Link {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VmList {
    #[serde(default)]
    pub vm: Vec<VmWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VmWire {
    pub id: String,
    pub name: String,
    pub status: Option<VmPowerState>,
    pub cluster: Option<Link>,
}

impl TryFrom<VmWire> for VmInfo {
    type Error = PlatformError;

    fn try_from(wire: VmWire) -> Result<Self> {
        let cluster = wire.cluster.ok_or_else(|| {
            PlatformError::InvalidResponse(format!("VM {} has no cluster reference", wire.name))
        })?;
        Ok(VmInfo {
            id: wire.id,
            name: wire.name,
            status: wire.status.unwrap_or(VmPowerState::Unknown),
            cluster_id: cluster.id,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SnapshotList {
    #[serde(default)]
    pub snapshot: Vec<SnapshotWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SnapshotWire {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub snapshot_status: Option<SnapshotStatus>,
    pub initialization: Option<InitializationWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InitializationWire {
    pub configuration: Option<ConfigurationWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConfigurationWire {
    pub data: Option<String>,
}

impl From<SnapshotWire> for SnapshotInfo {
    fn from(wire: SnapshotWire) -> Self {
        SnapshotInfo {
            id: wire.id,
            description: wire.description,
            status: wire.snapshot_status.unwrap_or(SnapshotStatus::Unknown),
            configuration: wire.initialization
                .and_then(|init| init.configuration)
                .and_then(|cfg| cfg.data),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClusterWire {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub data_center: Option<Link>,
}

impl TryFrom<ClusterWire> for ClusterInfo {
    type Error = PlatformError;

    fn try_from(wire: ClusterWire) -> Result<Self> {
        let dc = wire.data_center.ok_or_else(|| {
            PlatformError::InvalidResponse(format!("Cluster {} has no data center", wire.id))
        })?;
        Ok(ClusterInfo {
            id: wire.id,
            name: wire.name,
            datacenter_id: dc.id,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DataCenterWire {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl From<DataCenterWire> for DataCenterInfo {
    fn from(wire: DataCenterWire) -> Self {
        DataCenterInfo { id: wire.id, name: wire.name }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StorageDomainList {
    #[serde(default)]
    pub storage_domain: Vec<StorageDomainWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StorageDomainWire {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub domain_type: Option<StorageDomainType>,
}

impl From<StorageDomainWire> for StorageDomainInfo {
    fn from(wire: StorageDomainWire) -> Self {
        StorageDomainInfo {
            id: wire.id,
            name: wire.name,
            domain_type: wire.domain_type.unwrap_or(StorageDomainType::Unknown),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TemplateList {
    #[serde(default)]
    pub template: Vec<TemplateWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TemplateWire {
    pub id: String,
    pub name: String,
}

impl From<TemplateWire> for TemplateInfo {
    fn from(wire: TemplateWire) -> Self {
        TemplateInfo { id: wire.id, name: wire.name }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiWire {
    pub product_info: Option<ProductInfoWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProductInfoWire {
    pub version: Option<VersionWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VersionWire {
    pub full_version: Option<String>,
}

/// Error body returned by the engine on failed requests.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct FaultWire {
    pub reason: Option<String>,
    pub detail: Option<String>,
}

impl FaultWire {
    /// Combine reason and detail into one message.
    pub fn message(&self) -> Option<String> {
        match (&self.reason, &self.detail) {
            (Some(reason), Some(detail)) => Some(format!("{}: {}", reason, detail)),
            (Some(reason), None) => Some(reason.clone()),
            (None, Some(detail)) => Some(detail.clone()),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_list_decoding() {
        let json = r#"{
            "vm": [{
                "id": "7b3c4c36-1f2a-4a44-9d0e-0b6c5b1f1a11",
                "name": "web01",
                "status": "up",
                "cluster": { "href": "/ovirt-engine/api/clusters/c1", "id": "c1" }
            }]
        }"#;
        let list: VmList = serde_json::from_str(json).unwrap();
        let vm = VmInfo::try_from(list.vm.into_iter().next().unwrap()).unwrap();
        assert_eq!(vm.name, "web01");
        assert_eq!(vm.status, VmPowerState::Up);
        assert_eq!(vm.cluster_id, "c1");
    }

    #[test]
    fn test_empty_collection_decoding() {
        let list: VmList = serde_json::from_str("{}").unwrap();
        assert!(list.vm.is_empty());
        let list: SnapshotList = serde_json::from_str("{}").unwrap();
        assert!(list.snapshot.is_empty());
    }

    #[test]
    fn test_snapshot_with_configuration() {
        let json = r#"{
            "snapshot": [{
                "id": "s1",
                "description": "web01-202401010000",
                "snapshot_status": "ok",
                "initialization": {
                    "configuration": { "type": "ovf", "data": "<ovf:Envelope/>" }
                }
            }, {
                "id": "s0",
                "description": "Active VM",
                "snapshot_status": "ok"
            }]
        }"#;
        let list: SnapshotList = serde_json::from_str(json).unwrap();
        let snaps: Vec<SnapshotInfo> = list.snapshot.into_iter().map(Into::into).collect();
        assert_eq!(snaps[0].configuration.as_deref(), Some("<ovf:Envelope/>"));
        assert_eq!(snaps[0].status, SnapshotStatus::Ok);
        assert!(snaps[1].configuration.is_none());
    }

    #[test]
    fn test_storage_domain_type_decoding() {
        let json = r#"{
            "storage_domain": [
                { "id": "d1", "name": "data1", "type": "data" },
                { "id": "e1", "name": "export1", "type": "export" }
            ]
        }"#;
        let list: StorageDomainList = serde_json::from_str(json).unwrap();
        let domains: Vec<StorageDomainInfo> = list.storage_domain.into_iter().map(Into::into).collect();
        assert!(!domains[0].is_export());
        assert!(domains[1].is_export());
    }

    #[test]
    fn test_cluster_without_datacenter_is_invalid() {
        let wire: ClusterWire = serde_json::from_str(r#"{ "id": "c1", "name": "Default" }"#).unwrap();
        assert!(matches!(ClusterInfo::try_from(wire), Err(PlatformError::InvalidResponse(_))));
    }

    #[test]
    fn test_fault_message() {
        let fault: FaultWire = serde_json::from_str(
            r#"{ "reason": "Operation Failed", "detail": "[Cannot add VM. The VM name is already in use.]" }"#
        ).unwrap();
        assert_eq!(
            fault.message().unwrap(),
            "Operation Failed: [Cannot add VM. The VM name is already in use.]"
        );
        assert!(FaultWire::default().message().is_none());
    }
}
