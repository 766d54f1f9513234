//! WebSocket progress feeds.
//!
//! - `job_events`: per-job lifecycle stream fed from the scheduler's event bus.

pub mod job_events;
