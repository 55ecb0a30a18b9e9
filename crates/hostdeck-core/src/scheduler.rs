//! Scheduler runner: one pass per process invocation.
//!
//! An OS-level trigger starts `hostdeck cron run` on a short cadence. Each
//! run starts cold, bootstraps the plugins, runs the due tasks (core first,
//! then plugin tasks in load order) and exits. Only the interval store
//! carries state from one run to the next.

use hostdeck_cron::{RunOptions, TaskDef, TaskStatus, run_tasks, task_status};
use hostdeck_types::RunSummary;
use hostdeck_types::events::CRON_RUN_FINISHED;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::context::CoreContext;
use crate::tasks::core_tasks;

/// Core tasks followed by plugin tasks.
pub fn all_tasks(ctx: &CoreContext) -> Vec<TaskDef> {
    let mut tasks = core_tasks(&ctx.config);
    tasks.extend(ctx.plugins.cron_tasks());
    tasks
}

/// Run every due task once and emit `cron::RunFinished`.
pub fn run_scheduler(ctx: &CoreContext, options: &RunOptions) -> RunSummary {
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("scheduler", %run_id);
    let _entered = span.enter();

    let tasks = all_tasks(ctx);
    info!(tasks = tasks.len(), force = options.force, "Scheduler run started");

    let summary = run_tasks(&ctx.intervals, &tasks, options, &CancellationToken::new());

    ctx.plugins.emit(
        CRON_RUN_FINISHED,
        &json!({
            "run_id": run_id.to_string(),
            "ran": summary.ran,
            "skipped": summary.skipped,
            "failed": summary.failed,
            "invalid": summary.invalid,
        }),
    );
    summary
}

pub fn scheduler_status(ctx: &CoreContext) -> Vec<TaskStatus> {
    task_status(&ctx.intervals, &all_tasks(ctx))
}
