//! SDNInternalNodeRoutingTable Custom Resource Definition
//!
//! A NodeRoutingTable (NRT) is the per-node projection of a RoutingTable: it
//! names one node, one kernel routing table id and the routes that must be
//! present in that table on that node. The agent running on the node owns the
//! status subresource and one finalizer.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ExtendedCondition, Route};

/// Label carrying the name of the node an NRT is bound to
pub const NODE_NAME_LABEL: &str = "routing-manager.network.deckhouse.io/node-name";

/// Realm (RTA_FLOW) attached to every route the agent installs
///
/// Routes without this realm belong to someone else and are never touched.
pub const ROUTE_REALM: u32 = 216;

/// Upper bound for `spec.ipRoutingTableID`
pub const MAX_ROUTING_TABLE_ID: i64 = i32::MAX as i64;

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "internal.network.deckhouse.io",
    version = "v1alpha1",
    kind = "SDNInternalNodeRoutingTable",
    root = "NodeRoutingTable",
    status = "NodeRoutingTableStatus",
    shortname = "nrt",
    printcolumn = r#"{"name":"Node","type":"string","jsonPath":".spec.nodeName"}"#,
    printcolumn = r#"{"name":"Table","type":"integer","jsonPath":".spec.ipRoutingTableID"}"#,
    printcolumn = r#"{"name":"Reconciled","type":"string","jsonPath":".status.conditions[?(@.type=='ReconciliationSucceed')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NodeRoutingTableSpec {
    /// Node whose kernel routing table is managed
    pub node_name: String,

    /// Kernel routing table id, 1..=2^31-1
    #[serde(rename = "ipRoutingTableID")]
    pub ip_routing_table_id: i64,

    /// Desired routes; order is not significant
    #[serde(default)]
    pub routes: Vec<Route>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeRoutingTableStatus {
    /// Last generation processed by the agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Routes the agent last installed successfully
    #[serde(default)]
    pub applied_routes: Vec<Route>,

    #[serde(default)]
    pub conditions: Vec<ExtendedCondition>,
}

impl NodeRoutingTable {
    /// Whether a deletion timestamp is set
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn generation(&self) -> i64 {
        self.metadata.generation.unwrap_or(0)
    }

    pub fn observed_generation(&self) -> i64 {
        self.status
            .as_ref()
            .and_then(|s| s.observed_generation)
            .unwrap_or(0)
    }

    /// Value of the node-name label, if any
    pub fn node_label(&self, label: &str) -> Option<&str> {
        self.labels().get(label).map(String::as_str)
    }

    /// Whether both the label and `spec.nodeName` point at `node_name`
    pub fn is_bound_to(&self, label: &str, node_name: &str) -> bool {
        self.node_label(label) == Some(node_name) && self.spec.node_name == node_name
    }

    pub fn applied_routes(&self) -> &[Route] {
        self.status
            .as_ref()
            .map(|s| s.applied_routes.as_slice())
            .unwrap_or_default()
    }

    pub fn conditions(&self) -> &[ExtendedCondition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }
}
