//! Response bodies for the HTTP surface

use serde::{Deserialize, Serialize};

use crate::controller::RouteEntry;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// A kernel route carrying the agent's realm
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RouteSummary {
    pub destination: String,
    pub gateway: String,
    pub table: i64,
}

impl From<RouteEntry> for RouteSummary {
    fn from(entry: RouteEntry) -> Self {
        Self {
            destination: entry.destination,
            gateway: entry.gateway,
            table: entry.table,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RouteListResponse {
    pub node_name: String,
    pub realm: u32,
    pub items: Vec<RouteSummary>,
    pub total: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}
