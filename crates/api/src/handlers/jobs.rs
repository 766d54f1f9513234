//! Handlers for the `/jobs` resource.
//!
//! Submission returns as soon as the job is queued. Clients poll
//! `GET /jobs/{id}` and download the artifact once the job has succeeded.

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use planforge_core::error::CoreError;
use planforge_core::job::{Job, JobKind, JobPayload, JobStatus, ResultLocator};
use planforge_core::recipe::Recipe;
use planforge_core::types::JobId;
use serde::{Deserialize, Serialize};

use super::{accept, job_id_or_generate, multipart_error, path_job_id};
use crate::error::{AppError, AppResult};
use crate::middleware::api_key::RequireApiKey;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Body of `POST /jobs`.
#[derive(Debug, Deserialize)]
pub struct SubmitBuild {
    #[serde(default)]
    pub job_id: Option<String>,
    pub recipe: Recipe,
}

/// Query of `POST /jobs/{id}/render`.
#[derive(Debug, Default, Deserialize)]
pub struct RenderQuery {
    /// Id for the new render job; generated when absent.
    pub job_id: Option<String>,
}

/// Poll response: the job record plus where to fetch its result.
#[derive(Debug, Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        let result_url = job
            .result
            .as_ref()
            .map(|_| format!("/api/v1/jobs/{}/result", job.id));
        Self { job, result_url }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The locator of a succeeded job, or 409 if it has not succeeded.
fn succeeded_result(job: &Job) -> AppResult<&ResultLocator> {
    match (&job.status, &job.result) {
        (JobStatus::Succeeded, Some(locator)) => Ok(locator),
        (status, _) => Err(AppError::Core(CoreError::Conflict(format!(
            "Job {} is {status}; its result is available once it has succeeded",
            job.id
        )))),
    }
}

async fn read_artifact(
    state: &AppState,
    job_id: &JobId,
    locator: &ResultLocator,
) -> AppResult<Vec<u8>> {
    let path = state.store.artifact_path(&locator.file_name);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(AppError::Core(CoreError::NotFound {
                entity: "Artifact",
                id: job_id.to_string(),
            }))
        }
        Err(e) => Err(AppError::InternalError(format!(
            "Failed to read artifact {}: {e}",
            path.display()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Queue a build. Returns 202 with the job id; the recipe is validated on
/// the authority thread, so an unknown command shows up as a failed job.
pub async fn submit_build(
    _auth: RequireApiKey,
    State(state): State<AppState>,
    body: Result<Json<SubmitBuild>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = body.map_err(|e| AppError::Protocol(e.body_text()))?;
    let id = job_id_or_generate(input.job_id)?;
    let payload = JobPayload::Build {
        recipe: input.recipe,
    };
    accept(&state, id, payload)
}

/// POST /api/v1/jobs/upload
///
/// Multipart variant of [`submit_build`]: a `recipe` part holding the JSON
/// recipe and an optional `job_id` field, in any order.
pub async fn upload_build(
    _auth: RequireApiKey,
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<impl IntoResponse> {
    let mut multipart = multipart.map_err(|e| AppError::Protocol(e.body_text()))?;
    let mut job_id: Option<String> = None;
    let mut recipe: Option<Recipe> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "job_id" => {
                job_id = Some(field.text().await.map_err(multipart_error)?);
            }
            "recipe" => {
                if recipe.is_some() {
                    return Err(AppError::Protocol("Duplicate 'recipe' part".into()));
                }
                let data = field.bytes().await.map_err(multipart_error)?;
                let parsed = serde_json::from_slice(&data)
                    .map_err(|e| AppError::Protocol(format!("Invalid recipe JSON: {e}")))?;
                recipe = Some(parsed);
            }
            _ => {} // ignore unknown fields
        }
    }

    let recipe =
        recipe.ok_or_else(|| AppError::Protocol("Missing required 'recipe' part".into()))?;
    let id = job_id_or_generate(job_id)?;
    accept(&state, id, JobPayload::Build { recipe })
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
///
/// Current job record. `result` is present only on succeeded jobs and
/// `error` only on failed ones.
pub async fn get_job(
    _auth: RequireApiKey,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id = path_job_id(job_id)?;
    let job = state.scheduler.registry().get(&id)?;
    Ok(Json(DataResponse {
        data: JobView::from(job),
    }))
}

/// GET /api/v1/jobs/{id}/result
///
/// Download the artifact as an attachment. 409 unless the job succeeded.
pub async fn get_result(
    _auth: RequireApiKey,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id = path_job_id(job_id)?;
    let job = state.scheduler.registry().get(&id)?;
    let locator = succeeded_result(&job)?;
    let bytes = read_artifact(&state, &id, locator).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, locator.content_type.clone()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", locator.file_name),
            ),
        ],
        bytes,
    ))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/cancel
///
/// A queued job fails immediately with `CANCELLED`. A running job is
/// flagged and rolls back at its next step boundary, so the returned record
/// may still read `running`. 409 if the job already finished.
pub async fn cancel_job(
    _auth: RequireApiKey,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id = path_job_id(job_id)?;
    let job = state.scheduler.cancel(&id)?;

    tracing::info!(job_id = %job.id, status = %job.status, "Job cancellation requested");

    Ok(Json(DataResponse {
        data: JobView::from(job),
    }))
}

// ---------------------------------------------------------------------------
// Render
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/render
///
/// Queue a render of a succeeded build's artifact.
pub async fn render_job(
    _auth: RequireApiKey,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<RenderQuery>,
) -> AppResult<impl IntoResponse> {
    let source_id = path_job_id(job_id)?;
    let source = state.scheduler.registry().get(&source_id)?;
    if source.kind != JobKind::Build {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Job {source_id} is a render job; only build results can be rendered"
        ))));
    }
    let locator = succeeded_result(&source)?;
    let artifact = read_artifact(&state, &source_id, locator).await?;

    let id = job_id_or_generate(query.job_id)?;
    accept(
        &state,
        id,
        JobPayload::Render {
            artifact,
            source_job: Some(source_id),
        },
    )
}
