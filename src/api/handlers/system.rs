use axum::{extract::State, http::header, response::IntoResponse, Json};

use crate::api::{state::AppState, types::HealthResponse};

/// GET /health -- liveness/readiness probe
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let accepting = state.registry.is_accepting();
    Json(HealthResponse {
        status: if accepting { "ok" } else { "draining" }.to_string(),
        accepting,
        sessions: state.registry.session_count().await,
        active_sessions: state.registry.active_count().await,
        uptime_secs: state.uptime_seconds(),
    })
}

/// GET /metrics -- Prometheus text exposition
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let active = state.registry.active_count().await;
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.prometheus(active),
    )
}
