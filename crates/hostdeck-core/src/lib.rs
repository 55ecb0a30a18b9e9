//! hostdeck-core: process bootstrap and the scheduler runner.
//!
//! Provides:
//! - [`CoreContext`]: the single owner of config, plugin manager, event bus
//!   and interval store, built once per process and passed by reference
//! - Core-owned cron tasks (heartbeat, cache pruning)
//! - The one-shot scheduler entry point run by an external periodic trigger

pub mod context;
pub mod scheduler;
pub mod tasks;

pub use context::{BootstrapError, CoreContext, Invocation};
pub use scheduler::{all_tasks, run_scheduler, scheduler_status};
