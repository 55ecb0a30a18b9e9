//! hostdeck-cron: interval-based periodic tasks.
//!
//! A [`CronTask`] pairs a stable identifier with an [`Interval`] and asks the
//! [`IntervalStore`] whether enough wall-clock time has passed since its last
//! *successful* run. Success is recorded only after the callback returns
//! `Ok`, so failed work is retried on the next due check and never more than
//! one success is recorded per interval, even across process restarts.
//!
//! There is no daemon here: an external trigger starts a process that calls
//! [`run_tasks`] once and exits.

pub mod clock;
pub mod interval;
pub mod runner;
pub mod store;
pub mod task;

pub use clock::{Clock, ManualClock, SystemClock};
pub use interval::{Interval, InvalidIntervalError};
pub use runner::{RunOptions, TaskDef, TaskStatus, run_tasks, task_status};
pub use store::{FileBackend, IntervalBackend, IntervalStore, MemoryBackend, SqliteBackend, StoreError};
pub use task::{CronCallback, CronTask, RunOutcome, TaskContext};
