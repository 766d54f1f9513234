//! Domain types for the planforge build service.
//!
//! Zero internal dependencies: the recipe model, command registry, job
//! record and unit types are shared by the document engine, the builder,
//! the scheduler and the HTTP layer.

pub mod commands;
pub mod error;
pub mod job;
pub mod recipe;
pub mod types;
pub mod units;
