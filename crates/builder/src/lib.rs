//! Transactional builder: turns recipes into persisted models.
//!
//! Every public entry point must be called from the single thread that owns
//! the [`Builder`]; the scheduler guarantees that.

pub mod budget;
pub mod builder;
pub mod config;
pub mod error;
pub mod execute;
pub mod resolver;

pub use budget::{CancelFlag, ExecutionBudget, Interrupt};
pub use builder::Builder;
pub use config::BuilderConfig;
pub use error::{BuildError, ResolveError, StepError};
pub use resolver::ReferenceResolver;
