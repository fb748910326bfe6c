//! oVirt REST API v4 client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument};

use super::wire::*;
use crate::error::{PlatformError, Result};
use crate::traits::Platform;
use crate::types::*;

/// Connection settings for the engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OvirtConfig {
    /// API entry point, e.g. `https://engine.example.com/ovirt-engine/api`
    pub url: String,
    /// User name including the profile, e.g. `admin@internal`
    pub username: String,
    /// Password
    pub password: String,
    /// Skip TLS certificate verification (engines often use self-signed certs)
    pub insecure: bool,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OvirtConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: "admin@internal".to_string(),
            password: String::new(),
            insecure: false,
            timeout_secs: 60,
        }
    }
}

/// oVirt/RHV engine client.
///
/// Stateless apart from the HTTP connection pool: every trait method is
/// exactly one request.
pub struct OvirtClient {
    base_url: String,
    username: String,
    password: String,
    client: reqwest::Client,
}

impl OvirtClient {
    /// Create a new client. No request is made until the first call.
    pub fn new(config: &OvirtConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(PlatformError::Connection("engine URL is not configured".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| PlatformError::Connection(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            client,
        })
    }

    /// Base URL of the engine API.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, url = %url, "oVirt request");
        self.client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Version", "4")
            .header("Accept", "application/json")
    }

    /// Send a request and turn non-2xx answers into `Request` errors.
    async fn send(&self, builder: RequestBuilder, path: &str) -> Result<Response> {
        let resp = builder
            .send()
            .await
            .map_err(|e| PlatformError::Connection(format!("{} {}", path, e)))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let fault: FaultWire = serde_json::from_str(&body).unwrap_or_default();
        let reason = fault.message().unwrap_or_else(|| {
            status.canonical_reason().unwrap_or("unknown error").to_string()
        });
        Err(PlatformError::Request { status: status.as_u16(), reason })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let builder = self.request(Method::GET, path).query(query);
        let resp = self.send(builder, path).await?;
        resp.json::<T>()
            .await
            .map_err(|e| PlatformError::InvalidResponse(format!("{}: {}", path, e)))
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> Result<T> {
        let builder = self.request(Method::POST, path).json(&body);
        let resp = self.send(builder, path).await?;
        resp.json::<T>()
            .await
            .map_err(|e| PlatformError::InvalidResponse(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl Platform for OvirtClient {
    async fn api_version(&self) -> Result<String> {
        let api: ApiWire = self.get_json("", &[]).await?;
        Ok(api.product_info
            .and_then(|p| p.version)
            .and_then(|v| v.full_version)
            .unwrap_or_else(|| "unknown".to_string()))
    }

    #[instrument(skip(self), fields(vm = %name))]
    async fn find_vm(&self, name: &str) -> Result<Option<VmInfo>> {
        let search = format!("name={}", name);
        let list: VmList = self.get_json("/vms", &[("search", search.as_str())]).await?;
        // The search is a pattern match; keep only the exact name.
        list.vm
            .into_iter()
            .find(|vm| vm.name == name)
            .map(VmInfo::try_from)
            .transpose()
    }

    async fn get_vm_by_id(&self, vm_id: &str) -> Result<VmInfo> {
        let path = format!("/vms/{}", vm_id);
        let vm: VmWire = self.get_json(&path, &[]).await?;
        VmInfo::try_from(vm)
    }

    #[instrument(skip(self, spec), fields(vm = %spec.name, snapshot_id = %spec.snapshot_id))]
    async fn create_vm(&self, spec: VmCloneSpec) -> Result<VmInfo> {
        info!("Requesting VM creation from snapshot");
        let body = json!({
            "name": spec.name,
            "cluster": { "id": spec.cluster_id },
            "template": { "id": spec.template_id },
            "snapshots": { "snapshot": [ { "id": spec.snapshot_id } ] },
        });
        let vm: VmWire = self.post_json("/vms", body).await?;
        VmInfo::try_from(vm)
    }

    #[instrument(skip(self), fields(vm_id = %vm_id, storage_domain_id = %storage_domain_id))]
    async fn export_vm(&self, vm_id: &str, storage_domain_id: &str) -> Result<()> {
        info!("Requesting VM export");
        let path = format!("/vms/{}/export", vm_id);
        let body = json!({
            "storage_domain": { "id": storage_domain_id },
            "exclusive": true,
        });
        let _: serde_json::Value = self.post_json(&path, body).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(vm_id = %vm_id, description = %description))]
    async fn add_snapshot(&self, vm_id: &str, description: &str) -> Result<SnapshotInfo> {
        info!("Requesting snapshot creation");
        let path = format!("/vms/{}/snapshots", vm_id);
        let body = json!({
            "description": description,
            "persist_memorystate": false,
        });
        let snap: SnapshotWire = self.post_json(&path, body).await?;
        Ok(snap.into())
    }

    async fn list_snapshots(&self, vm_id: &str, all_content: bool) -> Result<Vec<SnapshotInfo>> {
        let path = format!("/vms/{}/snapshots", vm_id);
        let query: &[(&str, &str)] = if all_content { &[("all_content", "true")] } else { &[] };
        let list: SnapshotList = self.get_json(&path, query).await?;
        Ok(list.snapshot.into_iter().map(Into::into).collect())
    }

    async fn get_snapshot(&self, vm_id: &str, snapshot_id: &str) -> Result<SnapshotInfo> {
        let path = format!("/vms/{}/snapshots/{}", vm_id, snapshot_id);
        let snap: SnapshotWire = self.get_json(&path, &[]).await?;
        Ok(snap.into())
    }

    async fn delete_snapshot(&self, vm_id: &str, snapshot_id: &str) -> Result<()> {
        info!(vm_id = %vm_id, snapshot_id = %snapshot_id, "Requesting snapshot removal");
        let path = format!("/vms/{}/snapshots/{}", vm_id, snapshot_id);
        self.send(self.request(Method::DELETE, &path), &path).await?;
        Ok(())
    }

    async fn get_cluster(&self, cluster_id: &str) -> Result<ClusterInfo> {
        let path = format!("/clusters/{}", cluster_id);
        let cluster: ClusterWire = self.get_json(&path, &[]).await?;
        ClusterInfo::try_from(cluster)
    }

    async fn get_datacenter(&self, datacenter_id: &str) -> Result<DataCenterInfo> {
        let path = format!("/datacenters/{}", datacenter_id);
        let dc: DataCenterWire = self.get_json(&path, &[]).await?;
        Ok(dc.into())
    }

    async fn list_storage_domains(&self, datacenter_id: &str) -> Result<Vec<StorageDomainInfo>> {
        let path = format!("/datacenters/{}/storagedomains", datacenter_id);
        let list: StorageDomainList = self.get_json(&path, &[]).await?;
        Ok(list.storage_domain.into_iter().map(Into::into).collect())
    }

    async fn find_template(&self, name: &str) -> Result<Option<TemplateInfo>> {
        let search = format!("name={}", name);
        let list: TemplateList = self.get_json("/templates", &[("search", search.as_str())]).await?;
        Ok(list.template.into_iter().find(|t| t.name == name).map(Into::into))
    }
}
