//! Axum HTTP server for health probes and metrics

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::controller::ControllerState;
use crate::{Error, Result};

use super::handlers;

pub fn build_router(state: Arc<ControllerState>) -> Router {
    let router = Router::new()
        .route("/healthz", get(handlers::health))
        .route("/api/v1/routes", get(handlers::list_routes));

    #[cfg(feature = "metrics")]
    let router = router.route("/metrics", get(handlers::metrics));

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Serve until the controller's cancellation token fires
pub async fn run_server(state: Arc<ControllerState>, addr: SocketAddr) -> Result<()> {
    let shutdown = state.cancel.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::ConfigError(format!("Failed to bind to {}: {}", addr, e)))?;
    info!("Health server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| Error::IoError(format!("Server error: {}", e)))?;

    Ok(())
}
