//! A named unit of periodic work.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::interval::{Interval, InvalidIntervalError};
use crate::store::IntervalStore;

/// Shared, reusable task body.
pub type CronCallback = Arc<dyn Fn(&TaskContext) -> anyhow::Result<()> + Send + Sync>;

/// What a callback sees while it runs.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub identifier: String,
    pub started_at: DateTime<Utc>,
    /// Never cancelled by the scheduler itself. Long-running bodies may poll
    /// it so that an embedding caller can opt into a deadline.
    pub cancel: CancellationToken,
}

/// Result of one `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Not due and not forced; nothing happened.
    NotDue,
    /// Callback succeeded and the success was recorded.
    Completed,
    /// Callback returned an error or panicked.
    Failed,
    /// Callback succeeded but the record could not be written.
    RecordFailed,
}

pub struct CronTask {
    identifier: String,
    interval: Interval,
    store: Arc<IntervalStore>,
}

impl CronTask {
    /// Parse `expression` and bind the task to `store`. Nothing is written
    /// to the store here.
    pub fn new(
        identifier: impl Into<String>,
        expression: &str,
        store: Arc<IntervalStore>,
    ) -> Result<Self, InvalidIntervalError> {
        Ok(Self {
            identifier: identifier.into(),
            interval: Interval::parse(expression)?,
            store,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn interval(&self) -> &Interval {
        &self.interval
    }

    pub fn should_run(&self) -> bool {
        self.store.is_due(&self.identifier, &self.interval)
    }

    /// Run `callback` if the task is due (or `force` is set).
    ///
    /// Returns true only when the callback succeeded and its success was
    /// recorded. Errors and panics from the callback are logged, never
    /// propagated, and leave the record untouched.
    pub fn run_if_due<F>(&self, callback: F, force: bool) -> bool
    where
        F: FnOnce(&TaskContext) -> anyhow::Result<()>,
    {
        self.execute(callback, force, CancellationToken::new()) == RunOutcome::Completed
    }

    /// Like [`CronTask::run_if_due`], handing `cancel` to the callback.
    ///
    /// No timeout is applied: a callback that never returns blocks the
    /// caller indefinitely.
    pub fn execute<F>(&self, callback: F, force: bool, cancel: CancellationToken) -> RunOutcome
    where
        F: FnOnce(&TaskContext) -> anyhow::Result<()>,
    {
        if !force && !self.should_run() {
            return RunOutcome::NotDue;
        }

        let ctx = TaskContext {
            identifier: self.identifier.clone(),
            started_at: self.store.now(),
            cancel,
        };
        info!(task = %self.identifier, interval = %self.interval, force, "Running cron task");

        match catch_unwind(AssertUnwindSafe(|| callback(&ctx))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(task = %self.identifier, "Cron task failed: {e:#}");
                return RunOutcome::Failed;
            }
            Err(panic) => {
                error!(
                    task = %self.identifier,
                    "Cron task panicked: {}",
                    panic_message(panic.as_ref())
                );
                return RunOutcome::Failed;
            }
        }

        match self.store.record_success(&self.identifier) {
            Ok(_) => RunOutcome::Completed,
            Err(e) => {
                warn!(task = %self.identifier, "Task succeeded but its run could not be recorded: {e}");
                RunOutcome::RecordFailed
            }
        }
    }

    pub fn last_run_time(&self) -> Option<DateTime<Utc>> {
        self.store.last_run(&self.identifier)
    }

    pub fn next_run_time(&self) -> DateTime<Utc> {
        self.store.next_run(&self.identifier, &self.interval)
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::store::{FileBackend, MemoryBackend};
    use chrono::TimeDelta;
    use std::cell::Cell;

    fn memory_store() -> (Arc<IntervalStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(IntervalStore::new(MemoryBackend::default(), clock.clone()));
        (store, clock)
    }

    #[test]
    fn test_invalid_expression_creates_no_record() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(IntervalStore::new(FileBackend::new(dir.path().join("cron")), clock));

        let result = CronTask::new("cleanup", "1h", store.clone());
        assert!(matches!(result, Err(InvalidIntervalError::Malformed(_))));
        assert!(store.last_run("cleanup").is_none());
        assert!(!dir.path().join("cron").exists());
    }

    #[test]
    fn test_cleanup_scenario() {
        let (store, clock) = memory_store();
        let task = CronTask::new("cleanup", "1H", store).unwrap();

        assert!(task.should_run());
        assert!(task.run_if_due(|_| Ok(()), false));
        assert!(!task.should_run());

        clock.advance(TimeDelta::minutes(61));
        assert!(task.should_run());
    }

    #[test]
    fn test_second_call_is_noop() {
        let (store, _clock) = memory_store();
        let task = CronTask::new("sync", "1M", store).unwrap();
        let calls = Cell::new(0);

        assert!(task.run_if_due(|_| {
            calls.set(calls.get() + 1);
            Ok(())
        }, false));
        assert!(!task.run_if_due(|_| {
            calls.set(calls.get() + 1);
            Ok(())
        }, false));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_force_runs_when_not_due() {
        let (store, _clock) = memory_store();
        let task = CronTask::new("report", "1W", store).unwrap();
        assert!(task.run_if_due(|_| Ok(()), false));
        let first = task.last_run_time();

        let ran = Cell::new(false);
        assert!(task.run_if_due(|_| {
            ran.set(true);
            Ok(())
        }, true));
        assert!(ran.get());
        assert!(task.last_run_time() >= first);
    }

    #[test]
    fn test_failure_never_advances_last_run() {
        let (store, clock) = memory_store();
        let task = CronTask::new("flaky", "30M", store).unwrap();

        assert!(!task.run_if_due(|_| anyhow::bail!("upstream down"), false));
        assert!(task.last_run_time().is_none());
        assert!(task.should_run());

        assert!(task.run_if_due(|_| Ok(()), false));
        let recorded = task.last_run_time();
        assert!(recorded.is_some());

        clock.advance(TimeDelta::minutes(45));
        assert!(!task.run_if_due(|_| anyhow::bail!("again"), true));
        assert_eq!(task.last_run_time(), recorded);
    }

    #[test]
    fn test_panic_is_caught_and_not_recorded() {
        let (store, _clock) = memory_store();
        let task = CronTask::new("panicky", "1H", store).unwrap();
        let outcome = task.execute(|_| panic!("boom"), false, CancellationToken::new());
        assert_eq!(outcome, RunOutcome::Failed);
        assert!(task.last_run_time().is_none());
    }

    #[test]
    fn test_not_due_has_no_side_effects() {
        let (store, _clock) = memory_store();
        let task = CronTask::new("quiet", "1D", store).unwrap();
        assert!(task.run_if_due(|_| Ok(()), false));
        let before = task.last_run_time();

        let outcome = task.execute(|_| panic!("must not run"), false, CancellationToken::new());
        assert_eq!(outcome, RunOutcome::NotDue);
        assert_eq!(task.last_run_time(), before);
    }

    #[test]
    fn test_record_failure_reports_not_completed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(IntervalStore::new(FileBackend::new(blocker.join("cron")), clock));

        let task = CronTask::new("orphan", "1H", store).unwrap();
        let outcome = task.execute(|_| Ok(()), false, CancellationToken::new());
        assert_eq!(outcome, RunOutcome::RecordFailed);
        assert!(task.should_run());
    }

    #[test]
    fn test_next_run_time() {
        let (store, clock) = memory_store();
        let task = CronTask::new("digest", "1D", store).unwrap();
        assert_eq!(task.next_run_time(), clock.now() + TimeDelta::days(1));

        assert!(task.run_if_due(|_| Ok(()), false));
        let last = task.last_run_time().unwrap();
        clock.advance(TimeDelta::hours(5));
        assert_eq!(task.next_run_time(), last + TimeDelta::days(1));
    }

    #[test]
    fn test_huge_interval_runs_once_without_panicking() {
        let (store, clock) = memory_store();
        let task = CronTask::new("archive", "20000000W", store).unwrap();
        assert!(task.run_if_due(|_| Ok(()), false));
        assert_eq!(task.next_run_time(), DateTime::<Utc>::MAX_UTC);

        clock.advance(TimeDelta::weeks(520));
        assert!(!task.should_run());
    }

    #[test]
    fn test_context_carries_identifier_and_token() {
        let (store, _clock) = memory_store();
        let task = CronTask::new("ctx", "1H", store).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let outcome = task.execute(
            |ctx| {
                assert_eq!(ctx.identifier, "ctx");
                assert!(ctx.cancel.is_cancelled());
                Ok(())
            },
            false,
            token,
        );
        assert_eq!(outcome, RunOutcome::Completed);
    }
}
