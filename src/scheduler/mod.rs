//! Periodic, triggerable background loops.
//!
//! A [`Scheduler`] drives one [`PeriodicTask`] on a fixed interval, runs it
//! early when triggered manually, and stops when cancelled. The refresh
//! coordinator's staleness scan is one such task; other periodic jobs (e.g.
//! analytics rollups) reuse the same loop.

mod scheduler;
mod task;

pub use scheduler::{ScheduleSettings, Scheduler};
pub use task::{PeriodicTask, TriggerSource};
