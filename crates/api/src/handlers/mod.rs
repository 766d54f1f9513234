//! Request handlers for the `/api/v1` resources.
//!
//! Handlers never touch the model authority. They validate the request,
//! submit to the scheduler and read the job registry; everything else
//! happens on the authority thread.

pub mod jobs;
pub mod renders;

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use planforge_core::error::CoreError;
use planforge_core::job::JobPayload;
use planforge_core::types::JobId;

use crate::error::{AppError, AppResult};
use crate::response::{DataResponse, JobAccepted};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Use the caller's job id when given, otherwise generate one.
pub(crate) fn job_id_or_generate(raw: Option<String>) -> AppResult<JobId> {
    match raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
        Some(raw) => Ok(JobId::parse(raw)?),
        None => Ok(JobId::generate()),
    }
}

/// Parse a job id taken from the URL path.
///
/// A malformed id can never name an existing job, so it is reported as 404.
pub(crate) fn path_job_id(raw: String) -> AppResult<JobId> {
    JobId::parse(raw.as_str()).map_err(|_| {
        AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: raw,
        })
    })
}

pub(crate) fn multipart_error(e: MultipartError) -> AppError {
    AppError::Protocol(e.body_text())
}

/// Submit to the scheduler and acknowledge with 202.
pub(crate) fn accept(
    state: &AppState,
    id: JobId,
    payload: JobPayload,
) -> AppResult<impl IntoResponse> {
    let kind = payload.kind();
    let job = state.scheduler.submit(id, payload)?;

    tracing::info!(
        job_id = %job.id,
        kind = ?kind,
        queue_depth = state.scheduler.queue_depth(),
        "Job accepted",
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: JobAccepted {
                job_id: job.id,
                status: job.status,
            },
        }),
    ))
}
