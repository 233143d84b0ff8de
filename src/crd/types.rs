//! Shared types for the routing table CRDs

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single static route as declared in an NRT spec
///
/// `destination` is an IPv4 network in CIDR notation and `gateway` an IPv4
/// address. Both are kept as strings on the wire; they are parsed only when a
/// route is handed to the kernel so that a malformed entry fails just the NRT
/// that carries it.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Destination network, e.g. `10.0.0.0/24`
    pub destination: String,
    /// Next hop address, e.g. `192.168.1.1`
    pub gateway: String,
}

impl Route {
    pub fn new(destination: impl Into<String>, gateway: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            gateway: gateway.into(),
        }
    }
}

/// Status of a condition
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        };
        write!(f, "{}", s)
    }
}

/// Condition with heartbeat tracking
///
/// Unlike the plain Kubernetes condition this carries `lastHeartbeatTime`,
/// which advances on every reconciliation pass while `lastTransitionTime`
/// only moves when `status` flips. Timestamps are RFC 3339 strings; `None`
/// means the time has never been set.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedCondition {
    /// Type of condition (e.g., "ReconciliationSucceed")
    #[serde(rename = "type")]
    pub type_: String,
    /// Status of the condition: "True", "False", or "Unknown"
    pub status: ConditionStatus,
    /// Machine-readable reason for the condition
    #[serde(default)]
    pub reason: String,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
    /// Last time the condition transitioned from one status to another
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    /// Last time the condition was refreshed by the agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_time: Option<String>,
}
