//! Bounds how long one job may occupy the authority thread.
//!
//! Every tick the watchdog looks for running jobs older than the timeout.
//! It trips the job's cancel flag (the builder rolls back at its next step
//! boundary) and fails the job with `TIMEOUT` in the registry right away, so
//! pollers see the outcome even while the thread unwinds.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use planforge_builder::Interrupt;
use planforge_core::job::{FailureCode, JobFailure};
use planforge_core::types::{JobId, Timestamp};
use tokio_util::sync::CancellationToken;

use crate::events::{JobEvent, JobEventBus};
use crate::registry::JobRegistry;
use crate::scheduler::CancelFlags;

pub struct Watchdog {
    registry: Arc<JobRegistry>,
    events: Arc<JobEventBus>,
    flags: CancelFlags,
    timeout: Duration,
}

impl Watchdog {
    pub(crate) fn new(
        registry: Arc<JobRegistry>,
        events: Arc<JobEventBus>,
        flags: CancelFlags,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            events,
            flags,
            timeout,
        }
    }

    /// Fail every running job that started more than `timeout` before `now`.
    /// Returns the ids that were timed out.
    pub fn sweep(&self, now: Timestamp) -> Vec<JobId> {
        let limit = chrono::Duration::from_std(self.timeout).unwrap_or(chrono::Duration::MAX);
        let mut timed_out = Vec::new();

        for (id, started_at) in self.registry.running() {
            if now - started_at < limit {
                continue;
            }
            if let Some(flag) = self.flags.get(&id) {
                flag.trip(Interrupt::Timeout);
            }
            let failure = JobFailure::new(
                FailureCode::Timeout,
                format!("Job exceeded the {}s time limit", self.timeout.as_secs()),
            );
            match self.registry.fail(&id, failure.clone()) {
                Ok(_) => {
                    tracing::warn!(job_id = %id, timeout_secs = self.timeout.as_secs(), "Job timed out");
                    self.events.publish(JobEvent::failed(id.clone(), failure));
                    timed_out.push(id);
                }
                Err(e) => {
                    tracing::debug!(job_id = %id, error = %e, "Job finished before timeout");
                }
            }
        }
        timed_out
    }

    /// Run the watchdog loop until `cancel` is triggered.
    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        tracing::info!(
            timeout_secs = self.timeout.as_secs(),
            interval_ms = interval.as_millis() as u64,
            "Job watchdog started",
        );
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Job watchdog stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep(Utc::now());
                }
            }
        }
    }
}
