//! Prometheus metrics for the static routing agent
//!
//! # Exported metrics
//! The `/metrics` endpoint (when built with `--features metrics`) exports the following metrics:
//! - `static_routing_reconcile_duration_seconds` (histogram): reconcile duration labeled by controller.
//! - `static_routing_reconcile_errors_total` (counter): reconcile errors labeled by controller and kind.
//! - `static_routing_route_operations_total` (counter): kernel route mutations labeled by op and result.

use std::sync::atomic::AtomicU64;

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

/// Controller label value for every reconcile metric
const CONTROLLER: &str = "noderoutingtable";

/// Labels for reconcile metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReconcileLabels {
    pub controller: String,
}

/// Labels for reconcile error metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub controller: String,
    /// Error kind, e.g. "kube" or "io"
    pub kind: String,
}

/// Labels for kernel route mutations
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RouteOperationLabels {
    /// "add" or "delete"
    pub op: String,
    /// "success" or "failure"
    pub result: String,
}

/// Histogram tracking reconcile duration (seconds)
pub static RECONCILE_DURATION_SECONDS: Lazy<Family<ReconcileLabels, Histogram>> = Lazy::new(|| {
    fn reconcile_histogram() -> Histogram {
        // 1ms .. ~32s across 16 buckets.
        Histogram::new(exponential_buckets(0.001, 2.0, 16))
    }

    Family::new_with_constructor(reconcile_histogram)
});

/// Counter tracking reconcile errors
pub static RECONCILE_ERRORS_TOTAL: Lazy<Family<ErrorLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Counter tracking kernel route adds and deletes
pub static ROUTE_OPERATIONS_TOTAL: Lazy<Family<RouteOperationLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();

    registry.register(
        "static_routing_reconcile_duration_seconds",
        "Duration of reconcile loops in seconds",
        RECONCILE_DURATION_SECONDS.clone(),
    );
    registry.register(
        "static_routing_reconcile_errors_total",
        "Total number of reconcile errors",
        RECONCILE_ERRORS_TOTAL.clone(),
    );
    registry.register(
        "static_routing_route_operations_total",
        "Total number of kernel route operations",
        ROUTE_OPERATIONS_TOTAL.clone(),
    );

    registry
});

/// Observe a reconcile duration in seconds.
pub fn observe_reconcile_duration_seconds(seconds: f64) {
    let labels = ReconcileLabels {
        controller: CONTROLLER.to_string(),
    };
    RECONCILE_DURATION_SECONDS
        .get_or_create(&labels)
        .observe(seconds);
}

/// Increment the reconcile error counter.
pub fn inc_reconcile_error(kind: &str) {
    let labels = ErrorLabels {
        controller: CONTROLLER.to_string(),
        kind: kind.to_string(),
    };
    RECONCILE_ERRORS_TOTAL.get_or_create(&labels).inc();
}

/// Count one kernel route operation.
pub fn inc_route_operation(op: &str, result: &str) {
    let labels = RouteOperationLabels {
        op: op.to_string(),
        result: result.to_string(),
    };
    ROUTE_OPERATIONS_TOTAL.get_or_create(&labels).inc();
}
