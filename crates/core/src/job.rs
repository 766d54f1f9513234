//! Job record, lifecycle status and state machine.
//!
//! Lives in `core` so the registry, the scheduler and the HTTP layer share
//! one definition of what a job is and which transitions are legal.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::recipe::Recipe;
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Legal job status transitions.
pub mod state_machine {
    use super::JobStatus;

    /// Returns the statuses reachable from `from`.
    ///
    /// Queued jobs may fail without running (validation failure or
    /// cancellation before dispatch). Terminal states return an empty slice.
    pub fn valid_transitions(from: JobStatus) -> &'static [JobStatus] {
        match from {
            JobStatus::Queued => &[JobStatus::Running, JobStatus::Failed],
            JobStatus::Running => &[JobStatus::Succeeded, JobStatus::Failed],
            JobStatus::Succeeded | JobStatus::Failed => &[],
        }
    }

    pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
        valid_transitions(from).contains(&to)
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// What a job does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Build,
    Render,
}

/// Immutable submission payload attached to a job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobPayload {
    /// Build a fresh model from a recipe.
    Build { recipe: Recipe },
    /// Reopen a persisted artifact and export a raster image of it.
    Render {
        artifact: Vec<u8>,
        source_job: Option<JobId>,
    },
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::Build { .. } => JobKind::Build,
            JobPayload::Render { .. } => JobKind::Render,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Where a succeeded job's output lives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultLocator {
    /// Server-side location; never exposed to clients.
    #[serde(skip)]
    pub path: PathBuf,
    /// Download name offered in `Content-Disposition`.
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub sha256: String,
}

/// Machine-readable failure class reported on failed jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    ValidationError,
    ReferenceNotFound,
    AmbiguousReference,
    ModelError,
    AuthorityUnavailable,
    NoViewAvailable,
    Timeout,
    Cancelled,
    IoError,
    Internal,
}

/// Error detail attached to a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub code: FailureCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
}

impl JobFailure {
    pub fn new(code: FailureCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            step_index: None,
        }
    }

    pub fn at_step(mut self, step_index: usize) -> Self {
        self.step_index = Some(step_index);
        self
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A job as held by the registry.
///
/// The record never holds the submitted recipe or artifact; those travel to
/// the authority thread in the queue and are dropped once the job ends.
///
/// `result` is set iff `status` is `Succeeded`; `error` is set iff `status`
/// is `Failed`. Both are enforced by the registry's transition methods.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultLocator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    pub submitted_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}

impl Job {
    /// Create a freshly queued job.
    pub fn queued(id: JobId, payload: &JobPayload) -> Self {
        let step_count = match payload {
            JobPayload::Build { recipe } => Some(recipe.len()),
            JobPayload::Render { .. } => None,
        };
        Self {
            id,
            kind: payload.kind(),
            status: JobStatus::Queued,
            step_count,
            result: None,
            error: None,
            submitted_at: chrono::Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }
}
