//! Durable last-success timestamps keyed by task identifier.
//!
//! [`IntervalStore`] answers due-ness questions; where the timestamps live is
//! an [`IntervalBackend`] detail. Writers are not coordinated: at most one
//! scheduler runner per identifier is assumed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::interval::Interval;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt interval record for {identifier}: {content:?}")]
    Corrupt { identifier: String, content: String },
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("interval store lock poisoned")]
    Poisoned,
}

/// Raw storage of Unix-second timestamps.
pub trait IntervalBackend: Send + Sync {
    /// `Ok(None)` when no record exists.
    fn read(&self, identifier: &str) -> Result<Option<i64>, StoreError>;

    fn write(&self, identifier: &str, timestamp: i64) -> Result<(), StoreError>;
}

// ──────────────────── File backend ────────────────────

/// One plain-text file per identifier: `<dir>/<identifier>.timestamp`.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub const EXTENSION: &'static str = "timestamp";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `identifier`. Bytes outside `[A-Za-z0-9.-]`
    /// are written as `_XX` (upper-case hex), so distinct identifiers never
    /// share a file.
    pub fn record_path(&self, identifier: &str) -> PathBuf {
        let mut name = String::with_capacity(identifier.len());
        for byte in identifier.bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'-') {
                name.push(char::from(byte));
            } else {
                name.push_str(&format!("_{byte:02X}"));
            }
        }
        self.dir.join(format!("{name}.{}", Self::EXTENSION))
    }
}

impl IntervalBackend for FileBackend {
    fn read(&self, identifier: &str) -> Result<Option<i64>, StoreError> {
        let path = self.record_path(identifier);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        content
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| StoreError::Corrupt {
                identifier: identifier.to_string(),
                content,
            })
    }

    fn write(&self, identifier: &str, timestamp: i64) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.record_path(identifier);
        std::fs::write(&path, timestamp.to_string()).map_err(|source| StoreError::Io { path, source })
    }
}

// ──────────────────── SQLite backend ────────────────────

/// Records in a `cron_intervals` table.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS cron_intervals (
    identifier TEXT PRIMARY KEY,
    last_run_at INTEGER NOT NULL
);";

impl SqliteBackend {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl IntervalBackend for SqliteBackend {
    fn read(&self, identifier: &str) -> Result<Option<i64>, StoreError> {
        let conn = self.conn()?;
        let ts = conn
            .query_row(
                "SELECT last_run_at FROM cron_intervals WHERE identifier = ?1",
                rusqlite::params![identifier],
                |row| row.get(0),
            )
            .optional()?;
        Ok(ts)
    }

    fn write(&self, identifier: &str, timestamp: i64) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO cron_intervals (identifier, last_run_at) VALUES (?1, ?2)",
            rusqlite::params![identifier, timestamp],
        )?;
        Ok(())
    }
}

// ──────────────────── Memory backend ────────────────────

/// Non-durable records, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<String, i64>>,
}

impl IntervalBackend for MemoryBackend {
    fn read(&self, identifier: &str) -> Result<Option<i64>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(records.get(identifier).copied())
    }

    fn write(&self, identifier: &str, timestamp: i64) -> Result<(), StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        records.insert(identifier.to_string(), timestamp);
        Ok(())
    }
}

// ──────────────────── Store ────────────────────

/// Due-ness decisions over a backend and a clock.
pub struct IntervalStore {
    backend: Box<dyn IntervalBackend>,
    clock: Arc<dyn Clock>,
}

impl IntervalStore {
    pub fn new(backend: impl IntervalBackend + 'static, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend: Box::new(backend),
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Last successful run. Unreadable records are logged and read as "never".
    pub fn last_run(&self, identifier: &str) -> Option<DateTime<Utc>> {
        match self.backend.read(identifier) {
            Ok(ts) => ts.and_then(|secs| DateTime::from_timestamp(secs, 0)),
            Err(e) => {
                warn!(task = identifier, "Treating interval record as never run: {e}");
                None
            }
        }
    }

    /// True when no record exists or at least `interval` has elapsed.
    ///
    /// A record in the future (clock moved backwards) is not due until the
    /// clock catches up past it by a full interval.
    pub fn is_due(&self, identifier: &str, interval: &Interval) -> bool {
        match self.last_run(identifier) {
            None => true,
            Some(last) => self.now() - last >= interval.as_delta(),
        }
    }

    /// Record the current time as the last success.
    pub fn record_success(&self, identifier: &str) -> Result<DateTime<Utc>, StoreError> {
        let now = self.now();
        self.backend.write(identifier, now.timestamp())?;
        debug!(task = identifier, at = %now, "Recorded task success");
        Ok(now)
    }

    /// `last_run + interval`, or `now + interval` when never run. Saturates
    /// at the latest representable time.
    pub fn next_run(&self, identifier: &str, interval: &Interval) -> DateTime<Utc> {
        let base = self.last_run(identifier).unwrap_or_else(|| self.now());
        base.checked_add_signed(interval.as_delta())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeDelta;

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn store_with(backend: impl IntervalBackend + 'static) -> (IntervalStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        (IntervalStore::new(backend, clock.clone()), clock)
    }

    fn check_due_cycle(store: &IntervalStore, clock: &ManualClock) {
        let hourly = Interval::parse("1H").unwrap();
        assert!(store.last_run("cleanup").is_none());
        assert!(store.is_due("cleanup", &hourly));
        assert_eq!(store.next_run("cleanup", &hourly), start() + TimeDelta::hours(1));

        store.record_success("cleanup").unwrap();
        assert_eq!(store.last_run("cleanup"), Some(start()));
        assert!(!store.is_due("cleanup", &hourly));

        clock.advance(TimeDelta::minutes(59));
        assert!(!store.is_due("cleanup", &hourly));
        clock.advance(TimeDelta::minutes(1));
        assert!(store.is_due("cleanup", &hourly));
        assert_eq!(store.next_run("cleanup", &hourly), start() + TimeDelta::hours(1));
    }

    #[test]
    fn test_file_backend_due_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let (store, clock) = store_with(FileBackend::new(dir.path().join("cache/cron")));
        check_due_cycle(&store, &clock);
    }

    #[test]
    fn test_sqlite_backend_due_cycle() {
        let (store, clock) = store_with(SqliteBackend::open_in_memory().unwrap());
        check_due_cycle(&store, &clock);
    }

    #[test]
    fn test_memory_backend_due_cycle() {
        let (store, clock) = store_with(MemoryBackend::default());
        check_due_cycle(&store, &clock);
    }

    #[test]
    fn test_file_backend_creates_directory_and_plain_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let cron_dir = dir.path().join("cache/cron");
        let backend = FileBackend::new(&cron_dir);
        backend.write("cleanup", 1_700_000_123).unwrap();

        let content = std::fs::read_to_string(cron_dir.join("cleanup.timestamp")).unwrap();
        assert_eq!(content, "1700000123");
        assert_eq!(backend.read("cleanup").unwrap(), Some(1_700_000_123));
    }

    #[test]
    fn test_file_backend_escapes_identifier() {
        let backend = FileBackend::new("/var/cache/cron");
        assert_eq!(
            backend.record_path("login-audit::trim"),
            PathBuf::from("/var/cache/cron/login-audit_3A_3Atrim.timestamp")
        );
        assert_eq!(
            backend.record_path("core::cache-prune.v2"),
            PathBuf::from("/var/cache/cron/core_3A_3Acache-prune.v2.timestamp")
        );
        assert_eq!(
            backend.record_path("billing__sync"),
            PathBuf::from("/var/cache/cron/billing_5F_5Fsync.timestamp")
        );
    }

    #[test]
    fn test_distinct_identifiers_do_not_share_a_record() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _clock) = store_with(FileBackend::new(dir.path()));
        let hourly = Interval::parse("1H").unwrap();

        store.record_success("billing::sync").unwrap();
        assert!(!store.is_due("billing::sync", &hourly));
        for other in ["billing__sync", "billing_3A_3Async", "billing:_sync", "billing/sync"] {
            assert!(store.is_due(other, &hourly), "{other}");
            assert!(store.last_run(other).is_none(), "{other}");
        }
    }

    #[test]
    fn test_next_run_saturates_for_huge_intervals() {
        let (store, _clock) = store_with(MemoryBackend::default());
        let huge = Interval::parse("20000000W").unwrap();
        assert_eq!(store.next_run("archive", &huge), DateTime::<Utc>::MAX_UTC);

        store.record_success("archive").unwrap();
        assert!(!store.is_due("archive", &huge));
        assert_eq!(store.next_run("archive", &huge), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_corrupt_record_reads_as_never_run() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        std::fs::write(backend.record_path("broken"), "not-a-number").unwrap();
        assert!(matches!(
            backend.read("broken"),
            Err(StoreError::Corrupt { .. })
        ));

        let (store, _clock) = store_with(backend);
        assert!(store.last_run("broken").is_none());
        assert!(store.is_due("broken", &Interval::parse("1D").unwrap()));
    }

    #[test]
    fn test_record_survives_new_store_instance() {
        let dir = tempfile::tempdir().unwrap();
        let hourly = Interval::parse("1H").unwrap();
        {
            let (store, _clock) = store_with(FileBackend::new(dir.path()));
            store.record_success("report").unwrap();
        }
        let (store, _clock) = store_with(FileBackend::new(dir.path()));
        assert!(!store.is_due("report", &hourly));
    }

    #[test]
    fn test_unwritable_directory_fails_record() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();

        let (store, _clock) = store_with(FileBackend::new(blocker.join("cron")));
        assert!(matches!(
            store.record_success("cleanup"),
            Err(StoreError::Io { .. })
        ));
        assert!(store.last_run("cleanup").is_none());
    }

    #[test]
    fn test_future_record_is_not_due() {
        let (store, clock) = store_with(MemoryBackend::default());
        store.record_success("skewed").unwrap();
        clock.set(start() - TimeDelta::hours(3));
        assert!(!store.is_due("skewed", &Interval::parse("1H").unwrap()));
    }
}
