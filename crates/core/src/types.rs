//! Shared identifier and timestamp types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// UTC timestamp used on every job record.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Maximum accepted length of a caller-supplied job identifier.
pub const MAX_JOB_ID_LEN: usize = 128;

/// Opaque job identifier.
///
/// Either supplied by the caller or generated by the server (UUID v4).
/// Identifiers end up in artifact file names, so only ASCII alphanumerics,
/// `-`, `_` and `.` are accepted, and the value may not start with `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    /// Validate and wrap a caller-supplied identifier.
    pub fn parse(raw: impl Into<String>) -> Result<Self, CoreError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(CoreError::Validation("job id must not be empty".into()));
        }
        if raw.len() > MAX_JOB_ID_LEN {
            return Err(CoreError::Validation(format!(
                "job id must be at most {MAX_JOB_ID_LEN} characters"
            )));
        }
        if raw.starts_with('.') {
            return Err(CoreError::Validation("job id must not start with '.'".into()));
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(CoreError::Validation(format!(
                "job id contains invalid character {bad:?}"
            )));
        }
        Ok(Self(raw))
    }

    /// Generate a fresh server-side identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JobId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<JobId> for String {
    fn from(value: JobId) -> Self {
        value.0
    }
}
