//! Job registry and single-writer scheduling.
//!
//! Network tasks talk to a [`SchedulerHandle`]; exactly one OS thread runs
//! the [`AuthorityLoop`] and with it every build and render.

pub mod config;
pub mod events;
pub mod registry;
pub mod retention;
pub mod scheduler;
pub mod watchdog;

pub use config::SchedulerConfig;
pub use events::{JobEvent, JobEventBus, JobEventType};
pub use registry::{JobRegistry, RegistryError};
pub use scheduler::{
    AuthorityLoop, AuthorityThread, CancelError, QueuedJob, Scheduler, SchedulerHandle,
    SubmitError,
};
pub use watchdog::Watchdog;
