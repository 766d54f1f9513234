use planforge_core::commands::CommandError;
use planforge_core::job::{FailureCode, JobFailure};
use planforge_model::ModelError;

use crate::budget::Interrupt;

/// Failure to turn a symbolic reference into a live element.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("No {kind} named '{name}'")]
    ReferenceNotFound { kind: &'static str, name: String },

    #[error("{count} elements of kind {kind} are named '{name}'")]
    AmbiguousReference {
        kind: &'static str,
        name: String,
        count: usize,
    },
}

/// Failure of a single recipe step inside the build transaction.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Why a build or render did not produce an artifact.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The recipe failed to convert; the model was never touched.
    #[error("{source}")]
    Validation {
        step_index: Option<usize>,
        #[source]
        source: CommandError,
    },

    #[error("Step {step_index} failed: {cause}")]
    StepFailed {
        step_index: usize,
        #[source]
        cause: StepError,
    },

    #[error("Model authority unavailable: {0}")]
    AuthorityUnavailable(#[source] ModelError),

    #[error("Build interrupted ({reason:?})")]
    Interrupted {
        reason: Interrupt,
        step_index: Option<usize>,
    },

    #[error("Artifact is not a readable model: {0}")]
    InvalidArtifact(#[source] ModelError),

    #[error("Model has no 3D view to render")]
    NoViewAvailable,

    #[error("Failed to write artifact: {0}")]
    Io(#[source] ModelError),
}

impl BuildError {
    /// The error detail recorded on the failed job.
    pub fn to_failure(&self) -> JobFailure {
        let (code, step_index) = match self {
            BuildError::Validation { step_index, .. } => (FailureCode::ValidationError, *step_index),
            BuildError::StepFailed { step_index, cause } => {
                let code = match cause {
                    StepError::Resolve(ResolveError::ReferenceNotFound { .. }) => {
                        FailureCode::ReferenceNotFound
                    }
                    StepError::Resolve(ResolveError::AmbiguousReference { .. }) => {
                        FailureCode::AmbiguousReference
                    }
                    StepError::Model(_) => FailureCode::ModelError,
                };
                (code, Some(*step_index))
            }
            BuildError::AuthorityUnavailable(_) => (FailureCode::AuthorityUnavailable, None),
            BuildError::Interrupted { reason, step_index } => {
                let code = match reason {
                    Interrupt::Cancelled => FailureCode::Cancelled,
                    Interrupt::Timeout => FailureCode::Timeout,
                };
                (code, *step_index)
            }
            BuildError::InvalidArtifact(_) => (FailureCode::ValidationError, None),
            BuildError::NoViewAvailable => (FailureCode::NoViewAvailable, None),
            BuildError::Io(_) => (FailureCode::IoError, None),
        };

        let failure = JobFailure::new(code, self.to_string());
        match step_index {
            Some(index) => failure.at_step(index),
            None => failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_failure_carries_index_and_code() {
        let err = BuildError::StepFailed {
            step_index: 3,
            cause: ResolveError::ReferenceNotFound {
                kind: "level",
                name: "Level 9".into(),
            }
            .into(),
        };
        let failure = err.to_failure();
        assert_eq!(failure.code, FailureCode::ReferenceNotFound);
        assert_eq!(failure.step_index, Some(3));
        assert_eq!(failure.message, "Step 3 failed: No level named 'Level 9'");
    }

    #[test]
    fn unknown_tag_maps_to_validation_error() {
        let err = BuildError::Validation {
            step_index: Some(0),
            source: CommandError::UnknownCommandKind("CreateStair".into()),
        };
        let failure = err.to_failure();
        assert_eq!(failure.code, FailureCode::ValidationError);
        assert_eq!(failure.message, "Unknown command type 'CreateStair'");
    }

    #[test]
    fn timeout_maps_to_timeout_code() {
        let err = BuildError::Interrupted {
            reason: Interrupt::Timeout,
            step_index: None,
        };
        assert_eq!(err.to_failure().code, FailureCode::Timeout);
    }
}
