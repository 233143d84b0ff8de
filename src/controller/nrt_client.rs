//! Port to the control plane for NodeRoutingTable objects

use async_trait::async_trait;
use kube::{
    api::{Api, ListParams, Patch, PatchParams},
    Client, ResourceExt,
};
use serde_json::json;
use tracing::debug;

use crate::crd::{NodeRoutingTable, NODE_NAME_LABEL};
use crate::error::{Error, Result};

/// Field manager used for every write the agent makes
pub const FIELD_MANAGER: &str = "static-routing-agent";

#[async_trait]
pub trait NrtClient: Send + Sync {
    /// Fetch one NRT by name; `Error::NotFound` when it does not exist
    async fn get(&self, name: &str) -> Result<NodeRoutingTable>;

    /// All NRTs labelled with `node_name`
    async fn list_by_node_label(&self, node_name: &str) -> Result<Vec<NodeRoutingTable>>;

    /// Persist `metadata.finalizers`
    async fn update(&self, nrt: &NodeRoutingTable) -> Result<()>;

    /// Persist the status subresource
    async fn update_status(&self, nrt: &NodeRoutingTable) -> Result<()>;
}

/// [`NrtClient`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeNrtClient {
    api: Api<NodeRoutingTable>,
    node_name_label: String,
}

impl KubeNrtClient {
    pub fn new(client: Client) -> Self {
        Self::with_label(client, NODE_NAME_LABEL)
    }

    pub fn with_label(client: Client, node_name_label: impl Into<String>) -> Self {
        Self {
            api: Api::all(client),
            node_name_label: node_name_label.into(),
        }
    }
}

#[async_trait]
impl NrtClient for KubeNrtClient {
    async fn get(&self, name: &str) -> Result<NodeRoutingTable> {
        self.api
            .get(name)
            .await
            .map_err(|e| Error::from_kube(name, e))
    }

    async fn list_by_node_label(&self, node_name: &str) -> Result<Vec<NodeRoutingTable>> {
        let selector = format!("{}={}", self.node_name_label, node_name);
        let list = self
            .api
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(|e| Error::from_kube(&selector, e))?;
        debug!(count = list.items.len(), %selector, "Listed NRTs");
        Ok(list.items)
    }

    async fn update(&self, nrt: &NodeRoutingTable) -> Result<()> {
        let name = nrt.name_any();
        // resourceVersion turns a stale write into a 409
        let patch = json!({
            "metadata": {
                "resourceVersion": nrt.resource_version(),
                "finalizers": nrt.finalizers(),
            }
        });
        self.api
            .patch(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .map_err(|e| Error::from_kube(&name, e))?;
        Ok(())
    }

    async fn update_status(&self, nrt: &NodeRoutingTable) -> Result<()> {
        let name = nrt.name_any();
        let patch = json!({ "status": nrt.status });
        self.api
            .patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .map_err(|e| Error::from_kube(&name, e))?;
        Ok(())
    }
}
