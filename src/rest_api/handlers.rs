//! HTTP handlers for the agent endpoints

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use tracing::{error, instrument};

use crate::controller::ControllerState;

use super::dto::{ErrorResponse, HealthResponse, RouteListResponse, RouteSummary};

/// Health check endpoint
#[instrument]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Realm routes currently present in the kernel
#[instrument(skip(state))]
pub async fn list_routes(
    State(state): State<Arc<ControllerState>>,
) -> Result<Json<RouteListResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.route_table.list().await {
        Ok(routes) => {
            let items: Vec<RouteSummary> = routes.into_iter().map(RouteSummary::from).collect();
            Ok(Json(RouteListResponse {
                node_name: state.config.node_name.clone(),
                realm: state.config.realm,
                total: items.len(),
                items,
            }))
        }
        Err(e) => {
            error!("Failed to list routes: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("list_failed", &e.to_string())),
            ))
        }
    }
}

/// Prometheus text exposition of the agent metrics
#[cfg(feature = "metrics")]
pub async fn metrics() -> Result<String, StatusCode> {
    use prometheus_client::encoding::text::encode;

    let mut buffer = String::new();
    encode(&mut buffer, &crate::controller::metrics::REGISTRY).map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(buffer)
}
