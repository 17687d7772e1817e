//! Health and status handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use super::super::types::{HealthResponse, StatusResponse};
use super::AppState;

/// `GET /health` — liveness check, no auth.
pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            healthy: true,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// `GET /status` — uptime, active jobs, and counters.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(StatusResponse {
            uptime_seconds: state.started_at.elapsed().as_secs(),
            active_jobs: state.engine.active_count(),
            metrics: state.engine.metrics().snapshot(),
        }),
    )
}
