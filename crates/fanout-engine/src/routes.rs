//! Read-only HTTP routes: health and metrics.

use crate::metrics::{HealthView, MetricsSnapshot};
use crate::server::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tracing::warn;

pub type AppStateArc = Arc<AppState>;

/// Prometheus text exposition content type
const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

// ============================================================================
// Health Routes
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/health", get(health_check))
}

async fn health_check(State(state): State<AppStateArc>) -> Json<HealthView> {
    Json(state.orchestrator.health().await)
}

// ============================================================================
// Metrics Routes
// ============================================================================

pub fn metrics_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/metrics", get(metrics_json))
        .route("/metrics", get(metrics_prometheus))
}

async fn metrics_json(State(state): State<AppStateArc>) -> Json<MetricsSnapshot> {
    Json(state.orchestrator.metrics_snapshot().await)
}

async fn metrics_prometheus(State(state): State<AppStateArc>) -> impl IntoResponse {
    match state.orchestrator.metrics().render_prometheus() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
            body,
        ),
        Err(e) => {
            warn!(error = %e, "failed to render prometheus metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                e.to_string(),
            )
        }
    }
}
