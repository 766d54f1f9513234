use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the thread that owns the model authority is running.
    pub authority_thread_alive: bool,
    /// Jobs waiting in the build queue.
    pub queue_depth: usize,
    pub queue_capacity: usize,
}

/// GET /health -- liveness, independent of any job's state.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let authority_thread_alive = state.scheduler.authority_alive();

    let status = if authority_thread_alive { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        authority_thread_alive,
        queue_depth: state.scheduler.queue_depth(),
        queue_capacity: state.scheduler.queue_capacity(),
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
