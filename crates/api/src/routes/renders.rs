use axum::routing::post;
use axum::Router;

use crate::handlers::renders;
use crate::state::AppState;

/// Routes mounted at `/renders`.
pub fn router() -> Router<AppState> {
    Router::new().route("/", post(renders::submit_render))
}
