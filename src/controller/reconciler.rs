//! Reconciler for SDNInternalNodeRoutingTable resources
//!
//! A reconcile request names one NRT, but once it passes the early exits the
//! agent reconciles every NRT bound to its node in a single pass.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::{
    api::{Api, ListParams},
    runtime::{
        controller::{self, Action, Controller},
        watcher::Config,
    },
    Client, ResourceExt,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::conditions::{is_condition_true, set_pending, CONDITION_TYPE_RECONCILIATION_SUCCEED};
use super::nrt_client::NrtClient;
use super::pass::run_pass;
use super::route_table::RouteTable;
use crate::config::AgentConfig;
use crate::crd::NodeRoutingTable;
use crate::error::{Error, Result};

/// Shared state for the controller
pub struct ControllerState {
    pub nrt_client: Arc<dyn NrtClient>,
    pub route_table: Arc<dyn RouteTable>,
    pub config: AgentConfig,
    pub cancel: CancellationToken,
    /// Serializes event-driven and periodic passes
    pass_lock: Mutex<()>,
}

impl ControllerState {
    pub fn new(
        nrt_client: Arc<dyn NrtClient>,
        route_table: Arc<dyn RouteTable>,
        config: AgentConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            nrt_client,
            route_table,
            config,
            cancel,
            pass_lock: Mutex::new(()),
        }
    }
}

/// Outcome of a reconcile request
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    pub requeue_after: Option<Duration>,
}

impl ReconcileResult {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
        }
    }

    pub fn into_action(self) -> Action {
        match self.requeue_after {
            Some(after) => Action::requeue(after),
            None => Action::await_change(),
        }
    }
}

/// Handle one reconcile request keyed by NRT name
#[instrument(skip(ctx))]
pub async fn reconcile_request(ctx: &ControllerState, name: &str) -> Result<ReconcileResult> {
    if name.is_empty() {
        return Ok(ReconcileResult::done());
    }

    // Held from the read through the pass so a periodic pass cannot persist
    // a newer status in between
    let _guard = ctx.pass_lock.lock().await;

    let mut nrt = match ctx.nrt_client.get(name).await {
        Ok(nrt) => nrt,
        Err(e) if e.is_not_found() => {
            debug!("NRT not found, nothing to reconcile");
            return Ok(ReconcileResult::done());
        }
        Err(e) => return Err(e),
    };

    let config = &ctx.config;
    if nrt.node_label(&config.node_name_label) != Some(config.node_name.as_str()) {
        debug!("NRT is labelled for another node");
        return Ok(ReconcileResult::done());
    }
    if nrt.spec.node_name != config.node_name {
        debug!(node = %nrt.spec.node_name, "NRT targets another node");
        return Ok(ReconcileResult::done());
    }

    if nrt.generation() == nrt.observed_generation()
        && !nrt.is_being_deleted()
        && is_condition_true(nrt.conditions(), CONDITION_TYPE_RECONCILIATION_SUCCEED)
    {
        debug!("NRT is up to date, nothing to do");
        return Ok(ReconcileResult::done());
    }

    if ctx.cancel.is_cancelled() {
        debug!("Shutdown in progress, skipping reconciliation");
        return Ok(ReconcileResult::done());
    }

    set_pending(ctx.nrt_client.as_ref(), &mut nrt).await;
    reconcile_node_locked(ctx).await
}

/// Run one full-node pass and turn its result into a requeue decision
pub async fn reconcile_node(ctx: &ControllerState) -> Result<ReconcileResult> {
    let _guard = ctx.pass_lock.lock().await;
    reconcile_node_locked(ctx).await
}

/// Caller holds `pass_lock`
async fn reconcile_node_locked(ctx: &ControllerState) -> Result<ReconcileResult> {
    let requeue = ReconcileResult::requeue(ctx.config.requeue_interval);

    match run_pass(ctx).await {
        Ok(report) => {
            info!(
                added = report.added,
                deleted = report.deleted,
                orphans_deleted = report.orphans_deleted,
                failed = report.failed.len(),
                "Reconciliation pass finished"
            );
            if report.should_requeue {
                Ok(requeue)
            } else {
                Ok(ReconcileResult::done())
            }
        }
        Err(Error::Cancelled) => {
            info!("Reconciliation pass cancelled");
            Ok(ReconcileResult::done())
        }
        Err(e) => {
            error!("Reconciliation pass failed: {}", e);
            #[cfg(feature = "metrics")]
            super::metrics::inc_reconcile_error(e.kind());
            Ok(requeue)
        }
    }
}

#[instrument(skip(ctx), fields(name = %obj.name_any()))]
async fn reconcile(obj: Arc<NodeRoutingTable>, ctx: Arc<ControllerState>) -> Result<Action> {
    #[cfg(feature = "metrics")]
    let start = std::time::Instant::now();

    let result = reconcile_request(&ctx, &obj.name_any()).await;

    #[cfg(feature = "metrics")]
    super::metrics::observe_reconcile_duration_seconds(start.elapsed().as_secs_f64());

    result.map(ReconcileResult::into_action)
}

fn error_policy(obj: Arc<NodeRoutingTable>, error: &Error, _ctx: Arc<ControllerState>) -> Action {
    error!("Reconciliation error for {}: {}", obj.name_any(), error);
    #[cfg(feature = "metrics")]
    super::metrics::inc_reconcile_error(error.kind());

    let retry_duration = if error.is_retriable() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(60)
    };
    Action::requeue(retry_duration)
}

/// Watch NRTs bound to this node and reconcile them until cancelled
pub async fn run_controller(client: Client, state: Arc<ControllerState>) -> Result<()> {
    let nrts: Api<NodeRoutingTable> = Api::all(client);
    let selector = state.config.label_selector();

    info!(%selector, "Starting NodeRoutingTable controller");

    match nrts.list(&ListParams::default().limit(1)).await {
        Ok(_) => info!("SDNInternalNodeRoutingTable CRD is available"),
        Err(e) => {
            error!(
                "SDNInternalNodeRoutingTable CRD not found. Please install the CRD first: {:?}",
                e
            );
            return Err(Error::ConfigError(
                "SDNInternalNodeRoutingTable CRD not installed".to_string(),
            ));
        }
    }

    Controller::new(nrts, Config::default().labels(&selector))
        .with_config(controller::Config::default().concurrency(1))
        .graceful_shutdown_on(state.cancel.clone().cancelled_owned())
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!("Reconciled: {}", obj.name),
                Err(e) => warn!("Reconcile error: {}", e),
            }
        })
        .await;

    info!("NodeRoutingTable controller stopped");
    Ok(())
}

/// Run a full-node pass every `interval` until cancelled
pub async fn run_periodic_reconcile(state: Arc<ControllerState>, interval: Duration) {
    info!(?interval, "Starting periodic reconciliation");
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; the controller's initial list covers it
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = state.cancel.cancelled() => break,
            _ = ticker.tick() => {
                debug!("Periodic reconciliation triggered");
                if let Err(e) = reconcile_node(&state).await {
                    warn!("Periodic reconciliation failed: {}", e);
                }
            }
        }
    }
    info!("Periodic reconciliation stopped");
}
