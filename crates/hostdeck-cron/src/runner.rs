//! One pass over a list of task definitions.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hostdeck_types::{RunSummary, TaskOrigin};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::store::IntervalStore;
use crate::task::{CronCallback, CronTask, RunOutcome};

/// A task as contributed by the core or a plugin, before its interval is
/// parsed.
#[derive(Clone)]
pub struct TaskDef {
    pub identifier: String,
    /// Interval expression, e.g. `"1H"`.
    pub interval: String,
    pub origin: TaskOrigin,
    pub callback: CronCallback,
}

impl TaskDef {
    pub fn new(
        identifier: impl Into<String>,
        interval: impl Into<String>,
        origin: TaskOrigin,
        callback: CronCallback,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            interval: interval.into(),
            origin,
            callback,
        }
    }
}

impl std::fmt::Debug for TaskDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDef")
            .field("identifier", &self.identifier)
            .field("interval", &self.interval)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Run regardless of due-ness.
    pub force: bool,
    /// Restrict the pass to one identifier.
    pub only: Option<String>,
}

/// Run every due task in `defs`, in order. No failure aborts the pass.
pub fn run_tasks(
    store: &Arc<IntervalStore>,
    defs: &[TaskDef],
    options: &RunOptions,
    cancel: &CancellationToken,
) -> RunSummary {
    let mut summary = RunSummary::default();
    let mut seen = HashSet::new();

    for def in defs {
        if options.only.as_deref().is_some_and(|only| only != def.identifier) {
            continue;
        }
        if !seen.insert(def.identifier.as_str()) {
            warn!(
                task = %def.identifier,
                origin = %def.origin,
                "Duplicate task identifier; both definitions share one interval record"
            );
        }

        let task = match CronTask::new(def.identifier.clone(), &def.interval, store.clone()) {
            Ok(t) => t,
            Err(e) => {
                error!(task = %def.identifier, origin = %def.origin, "Skipping task: {e}");
                summary.invalid += 1;
                continue;
            }
        };

        match task.execute(|ctx| (def.callback)(ctx), options.force, cancel.clone()) {
            RunOutcome::NotDue => {
                debug!(task = %def.identifier, next_run = %task.next_run_time(), "Task not due");
                summary.skipped += 1;
            }
            RunOutcome::Completed => summary.ran += 1,
            RunOutcome::Failed | RunOutcome::RecordFailed => summary.failed += 1,
        }
    }

    info!(
        ran = summary.ran,
        skipped = summary.skipped,
        failed = summary.failed,
        invalid = summary.invalid,
        "Scheduler pass finished"
    );
    summary
}

/// Read-only view of one task's schedule.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskStatus {
    pub identifier: String,
    pub origin: TaskOrigin,
    pub interval: String,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub due: bool,
    /// Set when the interval expression is invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Project the schedule of every definition without running anything.
pub fn task_status(store: &Arc<IntervalStore>, defs: &[TaskDef]) -> Vec<TaskStatus> {
    defs.iter()
        .map(|def| match CronTask::new(def.identifier.clone(), &def.interval, store.clone()) {
            Ok(task) => TaskStatus {
                identifier: def.identifier.clone(),
                origin: def.origin.clone(),
                interval: def.interval.clone(),
                last_run: task.last_run_time(),
                next_run: Some(task.next_run_time()),
                due: task.should_run(),
                error: None,
            },
            Err(e) => TaskStatus {
                identifier: def.identifier.clone(),
                origin: def.origin.clone(),
                interval: def.interval.clone(),
                last_run: None,
                next_run: None,
                due: false,
                error: Some(e.to_string()),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::store::MemoryBackend;
    use crate::task::TaskContext;
    use chrono::TimeDelta;
    use std::sync::Mutex;

    fn recording(log: &Arc<Mutex<Vec<String>>>, name: &str, fail: bool) -> CronCallback {
        let log = log.clone();
        let name = name.to_string();
        Arc::new(move |_ctx: &TaskContext| {
            log.lock().unwrap().push(name.clone());
            if fail {
                anyhow::bail!("{name} failed");
            }
            Ok(())
        })
    }

    fn setup() -> (Arc<IntervalStore>, Arc<ManualClock>, Arc<Mutex<Vec<String>>>) {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(IntervalStore::new(MemoryBackend::default(), clock.clone()));
        (store, clock, Arc::new(Mutex::new(Vec::new())))
    }

    #[test]
    fn test_runs_in_order_and_continues_after_failure() {
        let (store, _clock, log) = setup();
        let defs = vec![
            TaskDef::new("core::a", "1H", TaskOrigin::Core, recording(&log, "a", false)),
            TaskDef::new("core::b", "1H", TaskOrigin::Core, recording(&log, "b", true)),
            TaskDef::new("bad", "every hour", TaskOrigin::Core, recording(&log, "bad", false)),
            TaskDef::new(
                "unit::c",
                "1H",
                TaskOrigin::Plugin("unit".into()),
                recording(&log, "c", false),
            ),
        ];

        let summary = run_tasks(&store, &defs, &RunOptions::default(), &CancellationToken::new());
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(
            summary,
            RunSummary {
                ran: 2,
                skipped: 0,
                failed: 1,
                invalid: 1
            }
        );
        assert_eq!(summary.total(), 4);
    }

    #[test]
    fn test_second_pass_retries_only_failures() {
        let (store, clock, log) = setup();
        let defs = vec![
            TaskDef::new("ok", "1H", TaskOrigin::Core, recording(&log, "ok", false)),
            TaskDef::new("flaky", "1H", TaskOrigin::Core, recording(&log, "flaky", true)),
        ];
        run_tasks(&store, &defs, &RunOptions::default(), &CancellationToken::new());
        clock.advance(TimeDelta::minutes(1));
        log.lock().unwrap().clear();

        let summary = run_tasks(&store, &defs, &RunOptions::default(), &CancellationToken::new());
        assert_eq!(*log.lock().unwrap(), vec!["flaky"]);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn test_force_only_one_task() {
        let (store, _clock, log) = setup();
        let defs = vec![
            TaskDef::new("one", "1D", TaskOrigin::Core, recording(&log, "one", false)),
            TaskDef::new("two", "1D", TaskOrigin::Core, recording(&log, "two", false)),
        ];
        run_tasks(&store, &defs, &RunOptions::default(), &CancellationToken::new());
        log.lock().unwrap().clear();

        let options = RunOptions {
            force: true,
            only: Some("two".into()),
        };
        let summary = run_tasks(&store, &defs, &options, &CancellationToken::new());
        assert_eq!(*log.lock().unwrap(), vec!["two"]);
        assert_eq!(summary.ran, 1);
        assert_eq!(summary.total(), 1);
    }

    #[test]
    fn test_status_of_huge_interval() {
        let (store, _clock, log) = setup();
        let defs = vec![TaskDef::new(
            "archive",
            "20000000W",
            TaskOrigin::Core,
            recording(&log, "archive", false),
        )];
        let summary = run_tasks(&store, &defs, &RunOptions::default(), &CancellationToken::new());
        assert_eq!(summary.ran, 1);

        let status = task_status(&store, &defs);
        assert!(!status[0].due);
        assert_eq!(status[0].next_run, Some(DateTime::<Utc>::MAX_UTC));
    }

    #[test]
    fn test_task_status_projection() {
        let (store, clock, log) = setup();
        let defs = vec![
            TaskDef::new("done", "1H", TaskOrigin::Core, recording(&log, "done", false)),
            TaskDef::new("typo", "1Y", TaskOrigin::Core, recording(&log, "typo", false)),
        ];
        run_tasks(
            &store,
            &defs[..1],
            &RunOptions::default(),
            &CancellationToken::new(),
        );

        let status = task_status(&store, &defs);
        assert_eq!(status.len(), 2);
        assert!(!status[0].due);
        assert_eq!(status[0].last_run, Some(clock.now()));
        assert_eq!(status[0].next_run, Some(clock.now() + TimeDelta::hours(1)));
        assert!(status[1].error.is_some());
        assert_eq!(serde_json::to_value(&status[1]).unwrap()["due"], false);
        assert_eq!(log.lock().unwrap().len(), 1);
    }
}
