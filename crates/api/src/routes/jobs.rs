//! Route definitions for the `/jobs` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;
use crate::ws::job_events;

/// Routes mounted at `/jobs`.
///
/// ```text
/// POST   /                -> submit_build
/// POST   /upload          -> upload_build
/// GET    /{id}            -> get_job
/// GET    /{id}/result     -> get_result
/// POST   /{id}/cancel     -> cancel_job
/// POST   /{id}/render     -> render_job
/// GET    /{id}/events     -> job_events (WebSocket)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(jobs::submit_build))
        .route("/upload", post(jobs::upload_build))
        .route("/{id}", get(jobs::get_job))
        .route("/{id}/result", get(jobs::get_result))
        .route("/{id}/cancel", post(jobs::cancel_job))
        .route("/{id}/render", post(jobs::render_job))
        .route("/{id}/events", get(job_events::job_events))
}
