//! Handler for `POST /renders`: re-render an uploaded model artifact.
//!
//! Two encodings are accepted:
//!
//! - `multipart/form-data` with an `artifact` part and an optional `job_id`
//!   field, in any order.
//! - A raw `application/octet-stream` body with the job id carried in the
//!   `X-Job-Id` header.
//!
//! Anything else is a protocol error and creates no job.

use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header;
use axum::response::IntoResponse;
use planforge_core::job::JobPayload;
use planforge_core::types::JobId;

use super::{accept, job_id_or_generate, multipart_error};
use crate::error::{AppError, AppResult};
use crate::middleware::api_key::RequireApiKey;
use crate::state::AppState;

/// Header carrying the job id of a raw binary upload.
pub const JOB_ID_HEADER: &str = "x-job-id";

/// POST /api/v1/renders
pub async fn submit_render(
    _auth: RequireApiKey,
    State(state): State<AppState>,
    request: Request,
) -> AppResult<impl IntoResponse> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    let (id, artifact) = if content_type.starts_with("multipart/form-data") {
        read_multipart(request, &state).await?
    } else if content_type.starts_with("application/octet-stream") {
        read_raw(request, &state).await?
    } else {
        return Err(AppError::Protocol(format!(
            "Unsupported content type '{content_type}'; expected multipart/form-data or application/octet-stream"
        )));
    };

    if artifact.is_empty() {
        return Err(AppError::Protocol("Artifact body is empty".into()));
    }

    accept(
        &state,
        id,
        JobPayload::Render {
            artifact,
            source_job: None,
        },
    )
}

async fn read_multipart(request: Request, state: &AppState) -> AppResult<(JobId, Vec<u8>)> {
    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| AppError::Protocol(e.body_text()))?;
    let mut job_id: Option<String> = None;
    let mut artifact: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "job_id" => {
                job_id = Some(field.text().await.map_err(multipart_error)?);
            }
            "artifact" => {
                if artifact.is_some() {
                    return Err(AppError::Protocol("Duplicate 'artifact' part".into()));
                }
                let data = field.bytes().await.map_err(multipart_error)?;
                artifact = Some(data.to_vec());
            }
            _ => {} // ignore unknown fields
        }
    }

    let artifact =
        artifact.ok_or_else(|| AppError::Protocol("Missing required 'artifact' part".into()))?;
    Ok((job_id_or_generate(job_id)?, artifact))
}

async fn read_raw(request: Request, state: &AppState) -> AppResult<(JobId, Vec<u8>)> {
    let job_id = request
        .headers()
        .get(JOB_ID_HEADER)
        .map(|v| {
            v.to_str()
                .map(str::to_string)
                .map_err(|_| AppError::Protocol("X-Job-Id header is not valid text".into()))
        })
        .transpose()?
        .ok_or_else(|| AppError::Protocol("Missing X-Job-Id header".into()))?;
    let job_id = job_id.trim();
    if job_id.is_empty() {
        return Err(AppError::Protocol("X-Job-Id header is empty".into()));
    }
    let id = JobId::parse(job_id)?;

    let body = Bytes::from_request(request, state)
        .await
        .map_err(|e| AppError::Protocol(e.body_text()))?;

    Ok((id, body.to_vec()))
}
