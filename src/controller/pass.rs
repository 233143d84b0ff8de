//! Full-node reconciliation pass
//!
//! A pass looks at every NRT bound to the local node at once. Routes are only
//! ever deleted when no live NRT still desires them, so two NRTs sharing a
//! route can be created and deleted independently.

use kube::ResourceExt;
use tracing::{debug, info, warn};

use super::conditions::{failed_condition, set_condition, succeed_condition};
use super::finalizers::remove_finalizer;
use super::reconciler::ControllerState;
use super::route_entry::{RouteEntry, RouteEntryMap};
use crate::config::AgentConfig;
use crate::crd::NodeRoutingTable;
use crate::error::{Error, Result};

/// Per-NRT result of a pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ReconcileOutcome {
    #[default]
    Success,
    Failed(Vec<String>),
}

impl ReconcileOutcome {
    /// Append an error message, turning Success into Failed
    pub fn record_error(self, message: impl Into<String>) -> Self {
        let mut messages = match self {
            ReconcileOutcome::Success => Vec::new(),
            ReconcileOutcome::Failed(messages) => messages,
        };
        messages.push(message.into());
        ReconcileOutcome::Failed(messages)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ReconcileOutcome::Success)
    }

    /// Newline-joined error messages, empty on success
    pub fn message(&self) -> String {
        match self {
            ReconcileOutcome::Success => String::new(),
            ReconcileOutcome::Failed(messages) => messages.join("\n"),
        }
    }
}

/// One node-bound NRT as seen by the pass
#[derive(Clone, Debug)]
pub struct PlannedNrt {
    /// Working copy; `observedGeneration` already advanced
    pub nrt: NodeRoutingTable,
    pub deleting: bool,
    /// `spec.routes` in the NRT's table
    pub desired: RouteEntryMap,
    /// Deletion candidates: every desired route when deleting, otherwise
    /// the last applied routes no longer desired
    pub to_delete: RouteEntryMap,
    pub outcome: ReconcileOutcome,
    pub remove_finalizer: bool,
}

impl PlannedNrt {
    pub fn name(&self) -> String {
        self.nrt.name_any()
    }

    fn record_error(&mut self, message: String) {
        self.outcome = std::mem::take(&mut self.outcome).record_error(message);
    }
}

/// Classification of the node's NRTs at the start of a pass
#[derive(Clone, Debug, Default)]
pub struct PassPlan {
    /// Union of the desired routes of every live NRT
    pub global_desired: RouteEntryMap,
    pub nrts: Vec<PlannedNrt>,
}

impl PassPlan {
    /// Split `objects` into live and deleting NRTs and compute the route sets
    ///
    /// Objects not bound to the configured node are dropped.
    pub fn classify(config: &AgentConfig, objects: Vec<NodeRoutingTable>) -> Self {
        let mut plan = PassPlan::default();

        for mut nrt in objects {
            if !nrt.is_bound_to(&config.node_name_label, &config.node_name) {
                debug!(name = %nrt.name_any(), "Skipping NRT bound to another node");
                continue;
            }

            let table = nrt.spec.ip_routing_table_id;
            let desired = RouteEntryMap::from_routes(&nrt.spec.routes, table);
            let deleting = nrt.is_being_deleted();

            let to_delete = if deleting {
                desired.clone()
            } else {
                plan.global_desired.extend(&desired);
                RouteEntryMap::from_routes(nrt.applied_routes(), table).difference(&desired)
            };

            let generation = nrt.generation();
            nrt.status.get_or_insert_with(Default::default).observed_generation =
                Some(generation);

            plan.nrts.push(PlannedNrt {
                nrt,
                deleting,
                desired,
                to_delete,
                outcome: ReconcileOutcome::Success,
                remove_finalizer: false,
            });
        }
        plan
    }

    /// Union of every NRT's deletion candidates
    pub fn deletion_candidates(&self) -> RouteEntryMap {
        let mut candidates = RouteEntryMap::new();
        for planned in &self.nrts {
            candidates.extend(&planned.to_delete);
        }
        candidates
    }
}

/// A route may go only if no live NRT wants it and the kernel still has it
pub fn should_delete_route(
    entry: &RouteEntry,
    global_desired: &RouteEntryMap,
    actual: &RouteEntryMap,
) -> bool {
    !global_desired.contains(entry) && actual.contains(entry)
}

/// Summary of a completed pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    pub should_requeue: bool,
    pub added: usize,
    pub deleted: usize,
    pub orphans_deleted: usize,
    /// Names of NRTs that ended the pass Failed
    pub failed: Vec<String>,
}

fn ensure_not_cancelled(ctx: &ControllerState) -> Result<()> {
    if ctx.cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

fn record_route_op(op: &str, ok: bool) {
    #[cfg(feature = "metrics")]
    super::metrics::inc_route_operation(op, if ok { "success" } else { "failure" });
    #[cfg(not(feature = "metrics"))]
    let _ = (op, ok);
}

/// Delete every candidate of `planned` that passes [`should_delete_route`]
async fn delete_candidates(
    ctx: &ControllerState,
    planned: &mut PlannedNrt,
    global_desired: &RouteEntryMap,
    actual: &mut RouteEntryMap,
    report: &mut PassReport,
) -> Result<()> {
    for entry in planned.to_delete.clone() {
        if !should_delete_route(&entry, global_desired, actual) {
            continue;
        }
        ensure_not_cancelled(ctx)?;
        match ctx.route_table.delete(&entry).await {
            Ok(()) => {
                record_route_op("delete", true);
                debug!(route = %entry, "Deleted route");
                actual.remove(&entry);
                report.deleted += 1;
            }
            Err(e) => {
                record_route_op("delete", false);
                warn!(name = %planned.name(), route = %entry, "Unable to delete route: {}", e);
                planned.record_error(e.to_string());
            }
        }
    }
    Ok(())
}

/// Run one pass over every NRT bound to the local node
///
/// Kernel add and delete failures stay on the NRT that caused them. Listing
/// NRTs or kernel routes failing aborts the pass before any mutation.
pub async fn run_pass(ctx: &ControllerState) -> Result<PassReport> {
    let config = &ctx.config;
    let objects = ctx.nrt_client.list_by_node_label(&config.node_name).await?;
    let mut plan = PassPlan::classify(config, objects);
    let mut actual = ctx.route_table.list().await?;
    let mut report = PassReport::default();

    // Adds
    for planned in plan.nrts.iter_mut().filter(|p| !p.deleting) {
        for entry in planned.desired.difference(&actual) {
            ensure_not_cancelled(ctx)?;
            match ctx.route_table.add(&entry).await {
                Ok(()) => {
                    record_route_op("add", true);
                    debug!(route = %entry, "Added route");
                    actual.append_entry(entry);
                    report.added += 1;
                }
                Err(e) => {
                    record_route_op("add", false);
                    warn!(name = %planned.name(), route = %entry, "Unable to add route: {}", e);
                    planned.record_error(e.to_string());
                }
            }
        }
    }

    // Routes of deleting NRTs, then routes erased from live specs
    for deleting in [true, false] {
        for planned in plan.nrts.iter_mut().filter(|p| p.deleting == deleting) {
            delete_candidates(ctx, planned, &plan.global_desired, &mut actual, &mut report)
                .await?;
            if deleting && planned.outcome.is_success() {
                planned.remove_finalizer = true;
            }
        }
    }

    if config.cleanup_orphan_routes {
        let orphans = actual
            .difference(&plan.global_desired)
            .difference(&plan.deletion_candidates());
        for entry in orphans {
            ensure_not_cancelled(ctx)?;
            match ctx.route_table.delete(&entry).await {
                Ok(()) => {
                    record_route_op("delete", true);
                    info!(route = %entry, "Deleted orphan route");
                    actual.remove(&entry);
                    report.orphans_deleted += 1;
                }
                Err(e) => {
                    record_route_op("delete", false);
                    warn!(route = %entry, "Unable to delete orphan route: {}", e);
                }
            }
        }
    }

    // Conditions
    for planned in plan.nrts.iter_mut() {
        let status = planned.nrt.status.get_or_insert_with(Default::default);
        match &planned.outcome {
            ReconcileOutcome::Success => {
                status.applied_routes = planned.nrt.spec.routes.clone();
                set_condition(&mut status.conditions, succeed_condition());
            }
            ReconcileOutcome::Failed(_) => {
                set_condition(
                    &mut status.conditions,
                    failed_condition(planned.outcome.message()),
                );
                report.should_requeue = true;
                report.failed.push(planned.name());
            }
        }
    }

    // Persist
    ensure_not_cancelled(ctx)?;
    for planned in plan.nrts.iter_mut() {
        let name = planned.name();
        if planned.deleting
            && planned.remove_finalizer
            && remove_finalizer(&mut planned.nrt, &config.finalizer)
        {
            match ctx.nrt_client.update(&planned.nrt).await {
                Ok(()) => info!(%name, "Removed finalizer"),
                Err(e) => warn!(%name, "Unable to remove finalizer: {}", e),
            }
        }

        match ctx.nrt_client.update_status(&planned.nrt).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() && planned.deleting => {
                debug!(%name, "NRT already gone, skipping status update")
            }
            Err(e) => warn!(%name, "Unable to update status: {}", e),
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{NodeRoutingTableSpec, NodeRoutingTableStatus, Route, NODE_NAME_LABEL};

    fn nrt(name: &str, node: &str, routes: Vec<Route>) -> NodeRoutingTable {
        let mut nrt = NodeRoutingTable::new(
            name,
            NodeRoutingTableSpec {
                node_name: node.to_string(),
                ip_routing_table_id: 100,
                routes,
            },
        );
        nrt.metadata.generation = Some(2);
        nrt.metadata.labels = Some(
            [(NODE_NAME_LABEL.to_string(), node.to_string())]
                .into_iter()
                .collect(),
        );
        nrt
    }

    fn r1() -> Route {
        Route::new("10.0.0.0/24", "192.168.1.1")
    }

    fn r2() -> Route {
        Route::new("10.0.1.0/24", "192.168.1.1")
    }

    #[test]
    fn test_outcome_record_error_accumulates() {
        let outcome = ReconcileOutcome::Success
            .record_error("first")
            .record_error("second");
        assert!(!outcome.is_success());
        assert_eq!(outcome.message(), "first\nsecond");
        assert_eq!(ReconcileOutcome::Success.message(), "");
    }

    #[test]
    fn test_classify_drops_foreign_nrts() {
        let config = AgentConfig::new("node1");
        let mut mislabelled = nrt("nrt-b", "node1", vec![r2()]);
        mislabelled.spec.node_name = "node2".to_string();

        let plan = PassPlan::classify(
            &config,
            vec![nrt("nrt-a", "node1", vec![r1()]), mislabelled],
        );

        assert_eq!(plan.nrts.len(), 1);
        assert_eq!(plan.nrts[0].name(), "nrt-a");
        assert_eq!(plan.global_desired.len(), 1);
    }

    #[test]
    fn test_classify_computes_erased_routes() {
        let config = AgentConfig::new("node1");
        let mut live = nrt("nrt-a", "node1", vec![r1()]);
        live.status = Some(NodeRoutingTableStatus {
            observed_generation: Some(1),
            applied_routes: vec![r1(), r2()],
            conditions: vec![],
        });

        let plan = PassPlan::classify(&config, vec![live]);
        let planned = &plan.nrts[0];
        assert_eq!(
            planned.to_delete.fingerprints().collect::<Vec<_>>(),
            vec!["100#10.0.1.0/24#192.168.1.1"]
        );
        assert_eq!(planned.nrt.observed_generation(), 2);
    }

    #[test]
    fn test_classify_keeps_deleting_routes_out_of_global_desired() {
        let config = AgentConfig::new("node1");
        let mut deleting = nrt("nrt-b", "node1", vec![r2()]);
        deleting.metadata.deletion_timestamp = Some(
            k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(chrono::Utc::now()),
        );

        let plan = PassPlan::classify(
            &config,
            vec![nrt("nrt-a", "node1", vec![r1()]), deleting],
        );

        assert_eq!(plan.global_desired.len(), 1);
        assert!(plan.nrts[1].deleting);
        assert_eq!(plan.nrts[1].to_delete.len(), 1);
        assert_eq!(plan.deletion_candidates().len(), 1);
    }

    #[test]
    fn test_should_delete_route() {
        let entry = RouteEntry::from_route(&r1(), 100);
        let present: RouteEntryMap = [entry.clone()].into_iter().collect();
        let empty = RouteEntryMap::new();

        assert!(should_delete_route(&entry, &empty, &present));
        assert!(!should_delete_route(&entry, &present, &present));
        assert!(!should_delete_route(&entry, &empty, &empty));
    }
}
