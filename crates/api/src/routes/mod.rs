pub mod health;
pub mod jobs;
pub mod renders;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /jobs                        submit build (JSON)
/// /jobs/upload                 submit build (multipart)
/// /jobs/{id}                   poll status
/// /jobs/{id}/result            download artifact
/// /jobs/{id}/cancel            cancel
/// /jobs/{id}/render            render a finished build
/// /jobs/{id}/events            lifecycle events (WebSocket)
///
/// /renders                     render an uploaded artifact
/// ```
///
/// Every route requires `X-API-Key` when `API_KEY` is configured.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/renders", renders::router())
}
