use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use planforge_core::error::CoreError;
use planforge_worker::{CancelError, RegistryError, SubmitError};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] and the scheduler's errors, and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce consistent JSON error
/// responses of the form `{"error": message, "code": CODE}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `planforge_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Job lookup or transition failure.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Admission failure (queue full, shutting down, duplicate id).
    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Cancel(#[from] CancelError),

    /// Malformed request framing or multipart body. No job is created.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Unauthorized(msg) => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
                }
            },

            // --- Scheduler errors ---
            AppError::Registry(err) => classify_registry_error(err),
            AppError::Submit(err) => match err {
                SubmitError::Overloaded { .. } => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "OVERLOADED",
                    err.to_string(),
                ),
                SubmitError::ShuttingDown => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SHUTTING_DOWN",
                    err.to_string(),
                ),
                SubmitError::Registry(inner) => classify_registry_error(inner),
            },
            AppError::Cancel(err) => match err {
                CancelError::AlreadyFinished { .. } => {
                    (StatusCode::CONFLICT, "CONFLICT", err.to_string())
                }
                CancelError::Registry(inner) => classify_registry_error(inner),
            },

            // --- HTTP-specific errors ---
            AppError::Protocol(msg) => (StatusCode::BAD_REQUEST, "PROTOCOL_ERROR", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => internal(msg),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Log the real cause and return a sanitized 500.
fn internal(msg: &str) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %msg, "Internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

/// - `JobNotFound` maps to 404.
/// - `DuplicateJob` and rejected transitions map to 409.
fn classify_registry_error(err: &RegistryError) -> (StatusCode, &'static str, String) {
    match err {
        RegistryError::JobNotFound(id) => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("Job with id {id} not found"),
        ),
        RegistryError::DuplicateJob(_) | RegistryError::InvalidTransition { .. } => {
            (StatusCode::CONFLICT, "CONFLICT", err.to_string())
        }
    }
}
