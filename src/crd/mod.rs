//! Custom Resource Definitions consumed by the routing agent
//!
//! This module defines the SDNInternalNodeRoutingTable CRD and its shared types.

mod node_routing_table;
pub mod types;


pub use node_routing_table::{
    NodeRoutingTable, NodeRoutingTableSpec, NodeRoutingTableStatus, MAX_ROUTING_TABLE_ID,
    NODE_NAME_LABEL, ROUTE_REALM,
};
pub use types::*;
