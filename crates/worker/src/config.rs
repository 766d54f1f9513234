use std::time::Duration;

/// Scheduler configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Jobs that may wait for the authority thread before submissions are
    /// refused with `Overloaded` (default: `16`).
    pub queue_capacity: usize,
    /// Longest a single job may occupy the authority thread (default: 300s).
    pub job_timeout: Duration,
    /// How long terminal jobs stay pollable (default: 24h).
    pub job_retention: Duration,
    /// How often the watchdog scans running jobs.
    pub watchdog_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 16,
            job_timeout: Duration::from_secs(300),
            job_retention: Duration::from_secs(86_400),
            watchdog_interval: Duration::from_secs(1),
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var              | Default |
    /// |----------------------|---------|
    /// | `QUEUE_CAPACITY`     | `16`    |
    /// | `JOB_TIMEOUT_SECS`   | `300`   |
    /// | `JOB_RETENTION_SECS` | `86400` |
    pub fn from_env() -> Self {
        let queue_capacity: usize = std::env::var("QUEUE_CAPACITY")
            .unwrap_or_else(|_| "16".into())
            .parse()
            .expect("QUEUE_CAPACITY must be a valid usize");
        assert!(queue_capacity > 0, "QUEUE_CAPACITY must be at least 1");

        let job_timeout_secs: u64 = std::env::var("JOB_TIMEOUT_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("JOB_TIMEOUT_SECS must be a valid u64");

        let job_retention_secs: u64 = std::env::var("JOB_RETENTION_SECS")
            .unwrap_or_else(|_| "86400".into())
            .parse()
            .expect("JOB_RETENTION_SECS must be a valid u64");

        Self {
            queue_capacity,
            job_timeout: Duration::from_secs(job_timeout_secs),
            job_retention: Duration::from_secs(job_retention_secs),
            ..Self::default()
        }
    }
}
