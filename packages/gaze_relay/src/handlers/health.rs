use axum::{Json, extract::State, response::IntoResponse};

use crate::metrics;
use crate::server::RelayState;

/// Health check endpoint - returns relay status
pub async fn health_handler(State(state): State<RelayState>) -> impl IntoResponse {
    let cache = state.cache.stats().await;

    let status = if state.metrics.source_failing() {
        "degraded"
    } else {
        "healthy"
    };

    Json(metrics::HealthStatus {
        status: status.to_string(),
        connections: state.registry.count().await as u64,
        buffered: cache.buffered,
        uptime_secs: state.metrics.uptime_secs(),
    })
}

/// Metrics endpoint - returns detailed relay metrics
pub async fn metrics_handler(State(state): State<RelayState>) -> impl IntoResponse {
    let cache = state.cache.stats().await;
    Json(state.metrics.snapshot(cache))
}

/// Liveness probe - returns 200 if the relay is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}
