//! Cron tasks owned by the core.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Context;
use chrono::{DateTime, Utc};
use hostdeck_config::HostDeckConfig;
use hostdeck_cron::{TaskContext, TaskDef};
use hostdeck_types::TaskOrigin;
use tracing::{debug, info, warn};

pub const HEARTBEAT_TASK: &str = "core::heartbeat";
pub const CACHE_PRUNE_TASK: &str = "core::cache-prune";

const HEARTBEAT_FILE: &str = "heartbeat";
const TMP_DIR: &str = "tmp";

/// The fixed list of core tasks, in run order.
pub fn core_tasks(config: &HostDeckConfig) -> Vec<TaskDef> {
    let cache_root = config.paths.cache_root.clone();
    let heartbeat_root = cache_root.clone();
    let ttl = Duration::from_secs(u64::from(config.scheduler.cache_ttl_days) * 86_400);

    vec![
        TaskDef::new(
            HEARTBEAT_TASK,
            "1M",
            TaskOrigin::Core,
            Arc::new(move |ctx: &TaskContext| write_heartbeat(&heartbeat_root, ctx.started_at)),
        ),
        TaskDef::new(
            CACHE_PRUNE_TASK,
            "1D",
            TaskOrigin::Core,
            Arc::new(move |_ctx: &TaskContext| {
                let removed = prune_tmp(&cache_root.join(TMP_DIR), ttl, SystemTime::now())?;
                info!(removed, "Pruned cache files");
                Ok(())
            }),
        ),
    ]
}

fn heartbeat_path(cache_root: &Path) -> PathBuf {
    cache_root.join(HEARTBEAT_FILE)
}

/// Record that the scheduler ran, for `hostdeck health`.
pub fn write_heartbeat(cache_root: &Path, at: DateTime<Utc>) -> anyhow::Result<()> {
    std::fs::create_dir_all(cache_root)
        .with_context(|| format!("creating {}", cache_root.display()))?;
    std::fs::write(heartbeat_path(cache_root), at.to_rfc3339())?;
    Ok(())
}

pub fn read_heartbeat(cache_root: &Path) -> Option<DateTime<Utc>> {
    let content = std::fs::read_to_string(heartbeat_path(cache_root)).ok()?;
    DateTime::parse_from_rfc3339(content.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Delete regular files directly under `dir` last modified more than `ttl`
/// before `now`. Returns how many were removed.
pub fn prune_tmp(dir: &Path, ttl: Duration, now: SystemTime) -> anyhow::Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e).with_context(|| format!("reading {}", dir.display())),
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = entry.metadata() else { continue };
        if !meta.is_file() {
            continue;
        }
        let age = meta
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age <= ttl {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "Removed stale cache file");
                removed += 1;
            }
            Err(e) => warn!(path = %path.display(), "Failed to remove cache file: {e}"),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_task_order_and_intervals() {
        let tasks = core_tasks(&HostDeckConfig::default());
        let listed: Vec<_> = tasks
            .iter()
            .map(|t| (t.identifier.as_str(), t.interval.as_str()))
            .collect();
        assert_eq!(listed, vec![(HEARTBEAT_TASK, "1M"), (CACHE_PRUNE_TASK, "1D")]);
        assert!(tasks.iter().all(|t| t.origin == TaskOrigin::Core));
    }

    #[test]
    fn test_heartbeat_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cache");
        assert!(read_heartbeat(&root).is_none());

        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        write_heartbeat(&root, at).unwrap();
        assert_eq!(read_heartbeat(&root), Some(at));
    }

    #[test]
    fn test_prune_tmp_by_age() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join("tmp");
        std::fs::create_dir_all(tmp.join("nested")).unwrap();
        std::fs::write(tmp.join("a.bin"), "a").unwrap();
        std::fs::write(tmp.join("b.bin"), "b").unwrap();

        let ttl = Duration::from_secs(3600);
        assert_eq!(prune_tmp(&tmp, ttl, SystemTime::now()).unwrap(), 0);

        let later = SystemTime::now() + Duration::from_secs(7200);
        assert_eq!(prune_tmp(&tmp, ttl, later).unwrap(), 2);
        assert!(tmp.join("nested").is_dir());
        assert_eq!(prune_tmp(&dir.path().join("absent"), ttl, later).unwrap(), 0);
    }
}
