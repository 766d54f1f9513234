//! Periodic eviction of finished jobs.
//!
//! Terminal jobs stay pollable for the retention window measured from
//! `finished_at`; after that the record and its artifact are deleted.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use planforge_core::types::Timestamp;
use planforge_model::ArtifactStore;
use tokio_util::sync::CancellationToken;

use crate::registry::JobRegistry;

/// How often the sweeper runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Evict jobs finished before `cutoff`. Returns the number evicted.
pub fn sweep(registry: &JobRegistry, store: &ArtifactStore, cutoff: Timestamp) -> usize {
    let evicted = registry.evict_finished_before(cutoff);
    for job in &evicted {
        if let Some(locator) = &job.result {
            if let Err(e) = store.remove(locator) {
                tracing::error!(job_id = %job.id, error = %e, "Retention: failed to delete artifact");
            }
        }
    }
    evicted.len()
}

/// Run the retention loop until `cancel` is triggered.
pub async fn run(
    registry: Arc<JobRegistry>,
    store: ArtifactStore,
    retention: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        retention_secs = retention.as_secs(),
        interval_secs = SWEEP_INTERVAL.as_secs(),
        "Job retention sweeper started"
    );

    let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job retention sweeper stopping");
                break;
            }
            _ = interval.tick() => {
                let Some(cutoff) = Utc::now().checked_sub_signed(retention) else {
                    continue;
                };
                let evicted = sweep(&registry, &store, cutoff);
                if evicted > 0 {
                    tracing::info!(evicted, "Job retention: evicted finished jobs");
                } else {
                    tracing::debug!("Job retention: nothing to evict");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use planforge_core::job::{JobPayload, ResultLocator};
    use planforge_core::types::JobId;

    use super::*;

    #[test]
    fn sweep_deletes_record_and_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let registry = JobRegistry::new();
        let id = JobId::parse("old").unwrap();

        let locator: ResultLocator = store.persist_image(&id, b"png").unwrap();
        registry
            .create(
                id.clone(),
                &JobPayload::Render {
                    artifact: vec![1],
                    source_job: None,
                },
            )
            .unwrap();
        registry.mark_running(&id).unwrap();
        registry.complete(&id, locator.clone()).unwrap();

        assert_eq!(sweep(&registry, &store, Utc::now() - chrono::Duration::hours(1)), 0);
        assert_eq!(sweep(&registry, &store, Utc::now() + chrono::Duration::seconds(1)), 1);
        assert!(registry.is_empty());
        assert!(!locator.path.exists());
    }
}
