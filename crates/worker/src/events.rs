//! Job lifecycle events over a `tokio::sync::broadcast` channel.
//!
//! The authority loop publishes one event per transition. Subscribers are
//! observers only (logging, tests); nothing depends on an event being seen.

use chrono::{DateTime, Utc};
use planforge_core::job::{Job, JobFailure, JobStatus};
use planforge_core::types::JobId;
use serde::Serialize;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobEventType {
    #[serde(rename = "job.queued")]
    Queued,
    #[serde(rename = "job.started")]
    Started,
    #[serde(rename = "job.succeeded")]
    Succeeded,
    #[serde(rename = "job.failed")]
    Failed,
}

impl JobEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobEventType::Queued => "job.queued",
            JobEventType::Started => "job.started",
            JobEventType::Succeeded => "job.succeeded",
            JobEventType::Failed => "job.failed",
        }
    }

    /// No further event follows for the job.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobEventType::Succeeded | JobEventType::Failed)
    }
}

/// A job lifecycle transition.
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    pub event_type: JobEventType,
    pub job_id: JobId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(event_type: JobEventType, job_id: JobId) -> Self {
        Self {
            event_type,
            job_id,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(job_id: JobId, failure: JobFailure) -> Self {
        Self {
            error: Some(failure),
            ..Self::new(JobEventType::Failed, job_id)
        }
    }

    /// The event that brought `job` into its current status.
    pub fn current(job: &Job) -> Self {
        let (event_type, at) = match job.status {
            JobStatus::Queued => (JobEventType::Queued, Some(job.submitted_at)),
            JobStatus::Running => (JobEventType::Started, job.started_at),
            JobStatus::Succeeded => (JobEventType::Succeeded, job.finished_at),
            JobStatus::Failed => (JobEventType::Failed, job.finished_at),
        };
        Self {
            event_type,
            job_id: job.id.clone(),
            error: job.error.clone(),
            timestamp: at.unwrap_or(job.submitted_at),
        }
    }
}

// ---------------------------------------------------------------------------
// JobEventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out bus for [`JobEvent`]s, shared via `Arc<JobEventBus>`.
pub struct JobEventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl JobEventBus {
    /// When the buffer is full, slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers; dropped if there are none.
    pub fn publish(&self, event: JobEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for JobEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use planforge_core::job::FailureCode;

    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = JobEventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(JobEvent::new(
            JobEventType::Started,
            JobId::parse("a").unwrap(),
        ));

        assert_eq!(rx1.recv().await.unwrap().event_type, JobEventType::Started);
        assert_eq!(rx2.recv().await.unwrap().job_id.as_str(), "a");
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        JobEventBus::default().publish(JobEvent::new(
            JobEventType::Queued,
            JobId::parse("orphan").unwrap(),
        ));
    }

    #[test]
    fn current_event_mirrors_job_status() {
        let mut job = Job::queued(
            JobId::parse("a").unwrap(),
            &planforge_core::job::JobPayload::Render {
                artifact: Vec::new(),
                source_job: None,
            },
        );
        let event = JobEvent::current(&job);
        assert_eq!(event.event_type, JobEventType::Queued);
        assert_eq!(event.timestamp, job.submitted_at);
        assert!(!event.event_type.is_terminal());

        job.status = JobStatus::Failed;
        job.error = Some(JobFailure::new(FailureCode::Cancelled, "stop"));
        let event = JobEvent::current(&job);
        assert_eq!(event.event_type, JobEventType::Failed);
        assert!(event.event_type.is_terminal());
        assert_eq!(event.error.unwrap().code, FailureCode::Cancelled);
    }

    #[test]
    fn failed_event_serializes_with_error() {
        let event = JobEvent::failed(
            JobId::parse("a").unwrap(),
            JobFailure::new(FailureCode::Timeout, "slow"),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "job.failed");
        assert_eq!(json["error"]["code"], "TIMEOUT");
    }
}
