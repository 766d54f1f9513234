//! Single-writer scheduler.
//!
//! Request handlers submit through a cloneable [`SchedulerHandle`]; the
//! [`AuthorityLoop`] owns the [`Builder`] and runs on one dedicated OS thread
//! (`model-authority`). The two sides meet in a bounded `mpsc` channel of
//! immutable [`QueuedJob`] records and in the [`JobRegistry`].
//!
//! Ordering is FIFO by enqueue order. The loop takes the next job only after
//! the previous one reached a terminal state, so at most one job runs at a
//! time.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use planforge_builder::{BuildError, Builder, CancelFlag, ExecutionBudget, Interrupt};
use planforge_core::job::{FailureCode, Job, JobFailure, JobPayload, JobStatus, ResultLocator};
use planforge_core::types::JobId;
use planforge_model::ArtifactStore;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::config::SchedulerConfig;
use crate::events::{JobEvent, JobEventBus, JobEventType};
use crate::registry::{JobRegistry, RegistryError};
use crate::watchdog::Watchdog;

/// Name of the thread that owns the model authority.
pub const AUTHORITY_THREAD_NAME: &str = "model-authority";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// The queue is full. No job was created.
    #[error("Build queue is full ({capacity} jobs waiting), retry later")]
    Overloaded { capacity: usize },

    /// The authority loop has stopped accepting work.
    #[error("Scheduler is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, thiserror::Error)]
pub enum CancelError {
    #[error("Job {id} already finished with status {status}")]
    AlreadyFinished { id: JobId, status: JobStatus },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Immutable submission record carried through the queue.
#[derive(Debug)]
pub struct QueuedJob {
    pub id: JobId,
    pub payload: Arc<JobPayload>,
    pub cancel: CancelFlag,
}

/// Cancel flags of jobs that are queued or running.
#[derive(Debug, Default, Clone)]
pub(crate) struct CancelFlags(Arc<Mutex<HashMap<JobId, CancelFlag>>>);

impl CancelFlags {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, CancelFlag>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert(&self, id: JobId, flag: CancelFlag) {
        self.lock().insert(id, flag);
    }

    pub(crate) fn get(&self, id: &JobId) -> Option<CancelFlag> {
        self.lock().get(id).cloned()
    }

    pub(crate) fn remove(&self, id: &JobId) {
        self.lock().remove(id);
    }
}

/// Marks the authority thread dead when the loop exits, even by panic.
struct AliveGuard(Arc<AtomicBool>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

pub struct Scheduler;

impl Scheduler {
    /// Create the submission handle and the (not yet started) authority loop.
    pub fn new(
        registry: Arc<JobRegistry>,
        events: Arc<JobEventBus>,
        builder: Builder,
        config: &SchedulerConfig,
    ) -> (SchedulerHandle, AuthorityLoop) {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let flags = CancelFlags::default();
        let alive = Arc::new(AtomicBool::new(false));

        let handle = SchedulerHandle {
            sender,
            registry: Arc::clone(&registry),
            events: Arc::clone(&events),
            flags: flags.clone(),
            alive: Arc::clone(&alive),
            job_timeout: config.job_timeout,
        };
        let authority = AuthorityLoop {
            receiver,
            builder,
            registry,
            events,
            flags,
            alive,
            job_timeout: config.job_timeout,
        };
        (handle, authority)
    }
}

// ---------------------------------------------------------------------------
// SchedulerHandle
// ---------------------------------------------------------------------------

/// Submission side, callable from any task or thread.
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<QueuedJob>,
    registry: Arc<JobRegistry>,
    events: Arc<JobEventBus>,
    flags: CancelFlags,
    alive: Arc<AtomicBool>,
    job_timeout: Duration,
}

impl SchedulerHandle {
    /// Queue a job and return immediately.
    ///
    /// A queue slot is reserved before the job record is created, so a full
    /// queue leaves no trace in the registry. The payload is released when
    /// the authority thread is done with the job.
    pub fn submit(
        &self,
        id: JobId,
        payload: impl Into<Arc<JobPayload>>,
    ) -> Result<Job, SubmitError> {
        let permit = self.sender.try_reserve().map_err(|e| match e {
            TrySendError::Full(()) => SubmitError::Overloaded {
                capacity: self.sender.max_capacity(),
            },
            TrySendError::Closed(()) => SubmitError::ShuttingDown,
        })?;

        let payload = payload.into();
        let job = self.registry.create(id.clone(), &payload)?;
        let cancel = CancelFlag::new();
        self.flags.insert(id.clone(), cancel.clone());
        permit.send(QueuedJob {
            id: id.clone(),
            payload,
            cancel,
        });

        tracing::info!(job_id = %id, kind = ?job.kind, "Job queued");
        self.events.publish(JobEvent::new(JobEventType::Queued, id));
        Ok(job)
    }

    /// Best-effort cancellation.
    ///
    /// A queued job fails at once and is skipped when dequeued. A running job
    /// is flagged; the builder rolls back at its next step boundary and the
    /// job fails with `CANCELLED`.
    pub fn cancel(&self, id: &JobId) -> Result<Job, CancelError> {
        let job = self.registry.get(id)?;
        match job.status {
            JobStatus::Succeeded | JobStatus::Failed => Err(CancelError::AlreadyFinished {
                id: id.clone(),
                status: job.status,
            }),
            JobStatus::Queued => {
                if let Some(flag) = self.flags.get(id) {
                    flag.trip(Interrupt::Cancelled);
                }
                let failure = JobFailure::new(FailureCode::Cancelled, "Cancelled before start");
                match self.registry.fail(id, failure.clone()) {
                    Ok(job) => {
                        tracing::info!(job_id = %id, "Queued job cancelled");
                        self.events.publish(JobEvent::failed(id.clone(), failure));
                        Ok(job)
                    }
                    // Dequeued in the meantime; the flag stops it at the next step.
                    Err(RegistryError::InvalidTransition { .. }) => Ok(self.registry.get(id)?),
                    Err(e) => Err(e.into()),
                }
            }
            JobStatus::Running => {
                if let Some(flag) = self.flags.get(id) {
                    flag.trip(Interrupt::Cancelled);
                }
                tracing::info!(job_id = %id, "Cancellation requested for running job");
                Ok(job)
            }
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &Arc<JobEventBus> {
        &self.events
    }

    /// Jobs waiting for the authority thread.
    pub fn queue_depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn queue_capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    pub fn authority_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// A watchdog over this scheduler's running jobs.
    ///
    /// The watchdog does not keep the queue open.
    pub fn watchdog(&self) -> Watchdog {
        Watchdog::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.events),
            self.flags.clone(),
            self.job_timeout,
        )
    }
}

// ---------------------------------------------------------------------------
// AuthorityLoop
// ---------------------------------------------------------------------------

/// Consumer side. Owns the builder; must run on exactly one thread.
pub struct AuthorityLoop {
    receiver: mpsc::Receiver<QueuedJob>,
    builder: Builder,
    registry: Arc<JobRegistry>,
    events: Arc<JobEventBus>,
    flags: CancelFlags,
    alive: Arc<AtomicBool>,
    job_timeout: Duration,
}

/// Join handle of the authority thread.
pub struct AuthorityThread {
    handle: JoinHandle<()>,
}

impl AuthorityThread {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the thread. It exits once every handle is dropped and the
    /// queue is drained.
    pub fn join(self) -> std::thread::Result<()> {
        self.handle.join()
    }
}

impl AuthorityLoop {
    /// Start the loop on a dedicated named thread.
    pub fn spawn(self) -> std::io::Result<AuthorityThread> {
        let alive = Arc::clone(&self.alive);
        alive.store(true, Ordering::Release);
        let spawned = std::thread::Builder::new()
            .name(AUTHORITY_THREAD_NAME.into())
            .spawn(move || self.run());
        match spawned {
            Ok(handle) => Ok(AuthorityThread { handle }),
            Err(e) => {
                alive.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Run jobs until every [`SchedulerHandle`] is dropped.
    ///
    /// Blocks the calling thread; never call from an async context.
    pub fn run(mut self) {
        self.alive.store(true, Ordering::Release);
        let _alive = AliveGuard(Arc::clone(&self.alive));
        tracing::info!("Authority loop started");

        while let Some(job) = self.receiver.blocking_recv() {
            self.dispatch(job);
        }

        tracing::info!("Authority loop stopped");
    }

    /// Run one job to a terminal state.
    fn dispatch(&self, job: QueuedJob) {
        let QueuedJob {
            id,
            payload,
            cancel,
        } = job;

        if cancel.is_tripped() {
            tracing::debug!(job_id = %id, "Skipping job cancelled while queued");
            self.flags.remove(&id);
            return;
        }

        // Validation happens before the job is marked running and before
        // any model authority is taken.
        let prepared = match payload.as_ref() {
            JobPayload::Build { recipe } => match self.builder.prepare(recipe) {
                Ok(steps) => Some(steps),
                Err(e) => {
                    self.finish(&id, Err(e.to_failure()));
                    return;
                }
            },
            JobPayload::Render { .. } => None,
        };

        match self.registry.mark_running(&id) {
            Ok(_) => {
                tracing::info!(job_id = %id, "Job started");
                self.events
                    .publish(JobEvent::new(JobEventType::Started, id.clone()));
            }
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "Dequeued job could not start");
                self.flags.remove(&id);
                return;
            }
        }

        let budget = ExecutionBudget::new(Some(self.job_timeout), cancel);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match payload.as_ref() {
            JobPayload::Build { recipe } => {
                let steps = prepared.as_deref().unwrap_or_default();
                self.builder.execute_prepared(&id, recipe, steps, &budget)
            }
            JobPayload::Render { artifact, .. } => self.builder.render(&id, artifact, &budget),
        }));

        let result = match outcome {
            Ok(result) => result.map_err(|e| {
                if matches!(e, BuildError::AuthorityUnavailable(_)) {
                    tracing::error!(job_id = %id, "Model authority held outside the scheduler");
                }
                e.to_failure()
            }),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                tracing::error!(job_id = %id, panic = %message, "Build panicked");
                Err(JobFailure::new(
                    FailureCode::Internal,
                    format!("Build panicked: {message}"),
                ))
            }
        };

        self.finish(&id, result);
    }

    /// Record the outcome and publish the matching event.
    fn finish(&self, id: &JobId, result: Result<ResultLocator, JobFailure>) {
        self.flags.remove(id);
        match result {
            Ok(locator) => match self.registry.complete(id, locator.clone()) {
                Ok(_) => {
                    tracing::info!(
                        job_id = %id,
                        file = %locator.file_name,
                        size_bytes = locator.size_bytes,
                        "Job succeeded",
                    );
                    self.events
                        .publish(JobEvent::new(JobEventType::Succeeded, id.clone()));
                }
                Err(e) => {
                    // Typically the watchdog failed the job first; the
                    // artifact must not outlive a failed job.
                    tracing::warn!(job_id = %id, error = %e, "Late completion rejected");
                    discard_artifact(self.builder.store(), &locator);
                }
            },
            Err(failure) => match self.registry.fail(id, failure.clone()) {
                Ok(_) => {
                    tracing::info!(
                        job_id = %id,
                        code = ?failure.code,
                        step_index = ?failure.step_index,
                        message = %failure.message,
                        "Job failed",
                    );
                    self.events.publish(JobEvent::failed(id.clone(), failure));
                }
                Err(e) => {
                    tracing::warn!(job_id = %id, error = %e, "Late failure report rejected");
                }
            },
        }
    }
}

fn discard_artifact(store: &ArtifactStore, locator: &ResultLocator) {
    if let Err(e) = store.remove(locator) {
        tracing::error!(
            path = %locator.path.display(),
            error = %e,
            "Failed to discard orphaned artifact",
        );
    }
}
