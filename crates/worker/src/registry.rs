//! In-memory job registry.
//!
//! The only state shared between request handlers and the authority thread.
//! Every read returns a full clone taken under the lock, so a poller never
//! observes a half-updated record. Transitions go through the job state
//! machine; a second completion report for a terminal job is rejected.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use planforge_core::job::{state_machine, Job, JobFailure, JobPayload, JobStatus, ResultLocator};
use planforge_core::types::{JobId, Timestamp};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job already exists: {0}")]
    DuplicateJob(JobId),

    #[error("Job {id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
}

#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Records are replaced whole under the write lock, so a poisoned lock
    // still guards a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, Job>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Job>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a freshly queued job.
    pub fn create(&self, id: JobId, payload: &JobPayload) -> Result<Job, RegistryError> {
        let mut jobs = self.write();
        if jobs.contains_key(&id) {
            return Err(RegistryError::DuplicateJob(id));
        }
        let job = Job::queued(id.clone(), payload);
        jobs.insert(id, job.clone());
        Ok(job)
    }

    pub fn get(&self, id: &JobId) -> Result<Job, RegistryError> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::JobNotFound(id.clone()))
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Ids and start times of running jobs.
    pub fn running(&self) -> Vec<(JobId, Timestamp)> {
        self.read()
            .values()
            .filter(|job| job.status == JobStatus::Running)
            .filter_map(|job| job.started_at.map(|at| (job.id.clone(), at)))
            .collect()
    }

    pub fn mark_running(&self, id: &JobId) -> Result<Job, RegistryError> {
        self.transition(id, JobStatus::Running, |job| {
            job.started_at = Some(Utc::now());
        })
    }

    /// Running -> Succeeded with the result locator.
    pub fn complete(&self, id: &JobId, locator: ResultLocator) -> Result<Job, RegistryError> {
        self.transition(id, JobStatus::Succeeded, |job| {
            job.result = Some(locator);
            job.finished_at = Some(Utc::now());
        })
    }

    /// Queued or Running -> Failed with the error detail.
    pub fn fail(&self, id: &JobId, failure: JobFailure) -> Result<Job, RegistryError> {
        self.transition(id, JobStatus::Failed, |job| {
            job.error = Some(failure);
            job.finished_at = Some(Utc::now());
        })
    }

    /// Remove terminal jobs that finished before `cutoff`.
    pub fn evict_finished_before(&self, cutoff: Timestamp) -> Vec<Job> {
        let mut jobs = self.write();
        let expired: Vec<JobId> = jobs
            .values()
            .filter(|job| job.status.is_terminal())
            .filter(|job| job.finished_at.is_some_and(|at| at < cutoff))
            .map(|job| job.id.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|id| jobs.remove(&id))
            .collect()
    }

    fn transition(
        &self,
        id: &JobId,
        to: JobStatus,
        apply: impl FnOnce(&mut Job),
    ) -> Result<Job, RegistryError> {
        let mut jobs = self.write();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| RegistryError::JobNotFound(id.clone()))?;
        if !state_machine::can_transition(job.status, to) {
            return Err(RegistryError::InvalidTransition {
                id: id.clone(),
                from: job.status,
                to,
            });
        }
        job.status = to;
        apply(job);
        Ok(job.clone())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use planforge_core::job::FailureCode;
    use planforge_core::recipe::Recipe;

    use super::*;

    fn id(s: &str) -> JobId {
        JobId::parse(s).unwrap()
    }

    fn payload() -> JobPayload {
        JobPayload::Build {
            recipe: Recipe::default(),
        }
    }

    fn locator() -> ResultLocator {
        ResultLocator {
            path: "out/a.pfm.json".into(),
            file_name: "a.pfm.json".into(),
            content_type: "application/octet-stream".into(),
            size_bytes: 10,
            sha256: "00".into(),
        }
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let registry = JobRegistry::new();
        registry.create(id("a"), &payload()).unwrap();
        assert_matches!(
            registry.create(id("a"), &payload()),
            Err(RegistryError::DuplicateJob(_))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let registry = JobRegistry::new();
        assert_matches!(registry.get(&id("nope")), Err(RegistryError::JobNotFound(_)));
    }

    #[test]
    fn success_sets_locator_and_timestamps() {
        let registry = JobRegistry::new();
        registry.create(id("a"), &payload()).unwrap();
        registry.mark_running(&id("a")).unwrap();
        let job = registry.complete(&id("a"), locator()).unwrap();

        assert_eq!(job.status, JobStatus::Succeeded);
        assert!(job.result.is_some());
        assert!(job.error.is_none());
        assert!(job.started_at.is_some() && job.finished_at.is_some());
    }

    #[test]
    fn second_completion_is_rejected_not_overwritten() {
        let registry = JobRegistry::new();
        registry.create(id("a"), &payload()).unwrap();
        registry.mark_running(&id("a")).unwrap();
        registry
            .fail(&id("a"), JobFailure::new(FailureCode::Timeout, "too slow"))
            .unwrap();

        assert_matches!(
            registry.complete(&id("a"), locator()),
            Err(RegistryError::InvalidTransition {
                from: JobStatus::Failed,
                to: JobStatus::Succeeded,
                ..
            })
        );
        let job = registry.get(&id("a")).unwrap();
        assert!(job.result.is_none());
        assert_eq!(job.error.unwrap().code, FailureCode::Timeout);
    }

    #[test]
    fn queued_job_cannot_succeed_directly() {
        let registry = JobRegistry::new();
        registry.create(id("a"), &payload()).unwrap();
        assert_matches!(
            registry.complete(&id("a"), locator()),
            Err(RegistryError::InvalidTransition { .. })
        );
    }

    #[test]
    fn eviction_only_touches_old_terminal_jobs() {
        let registry = JobRegistry::new();
        registry.create(id("done"), &payload()).unwrap();
        registry
            .fail(&id("done"), JobFailure::new(FailureCode::Cancelled, "x"))
            .unwrap();
        registry.create(id("waiting"), &payload()).unwrap();

        let evicted = registry.evict_finished_before(Utc::now() + chrono::Duration::seconds(1));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, id("done"));
        assert!(registry.get(&id("waiting")).is_ok());
    }
}
