//! Controller module for NodeRoutingTable reconciliation
//! This module contains the controller loop, the full-node reconciliation
//! pass, and the ports to the kernel routing tables and the API server.

pub mod conditions;
mod finalizers;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod netlink;
pub mod nrt_client;
pub mod pass;
mod reconciler;
pub mod route_entry;
pub mod route_table;

pub use finalizers::{has_finalizer, remove_finalizer, FinalizerSet, NRT_FINALIZER};
pub use netlink::NetlinkRouteTable;
pub use nrt_client::{KubeNrtClient, NrtClient};
pub use pass::{run_pass, should_delete_route, PassPlan, PassReport, ReconcileOutcome};
pub use reconciler::{
    reconcile_node, reconcile_request, run_controller, run_periodic_reconcile, ControllerState,
    ReconcileResult,
};
pub use route_entry::{RouteEntry, RouteEntryMap};
pub use route_table::{parse_route, DryRunRouteTable, ParsedRoute, RouteTable};
