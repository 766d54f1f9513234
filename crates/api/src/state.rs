use std::sync::Arc;

use planforge_model::ArtifactStore;
use planforge_worker::SchedulerHandle;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
/// Handlers never touch the model authority; they only submit to the
/// scheduler and read the job registry.
#[derive(Clone)]
pub struct AppState {
    /// Submission side of the single-writer scheduler.
    pub scheduler: SchedulerHandle,
    /// Where finished artifacts live, for result downloads.
    pub store: ArtifactStore,
    /// Server configuration (accessed by middleware and handlers).
    pub config: Arc<ServerConfig>,
}
