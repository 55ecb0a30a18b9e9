//! Cron task declarations under `<unit>/cron/*.toml`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::manifest::ManifestError;

pub const CRON_DIR: &str = "cron";

/// One `cron/<name>.toml` file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CronDefinition {
    /// Interval expression, validated when the task is constructed.
    pub interval: String,
    /// Handler name passed to `PluginUnit::cron_handler`. Defaults to the
    /// file stem.
    #[serde(default)]
    pub handler: Option<String>,
}

/// A definition file as found on disk.
#[derive(Debug)]
pub struct CronFile {
    /// File stem, also the task name within the unit.
    pub name: String,
    pub path: PathBuf,
    pub definition: Result<CronDefinition, ManifestError>,
}

impl CronFile {
    pub fn handler(&self) -> Option<&str> {
        self.definition
            .as_ref()
            .ok()
            .map(|d| d.handler.as_deref().unwrap_or(&self.name))
    }
}

/// Task identifier for `task` of `unit`.
pub fn task_identifier(unit: &str, task: &str) -> String {
    format!("{unit}::{task}")
}

/// List `*.toml` files in the unit's cron directory, sorted by file name.
/// A missing directory means the unit has no tasks; any other read error is
/// logged and also yields no tasks.
pub fn discover_cron_files(unit_dir: &Path) -> Vec<CronFile> {
    let dir = unit_dir.join(CRON_DIR);
    let entries = match std::fs::read_dir(&dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            tracing::warn!(dir = %dir.display(), "Cannot read cron directory: {e}");
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();

    paths
        .into_iter()
        .filter_map(|path| {
            let name = path.file_stem()?.to_str()?.to_string();
            let definition = parse_cron_file(&path);
            Some(CronFile {
                name,
                path,
                definition,
            })
        })
        .collect()
}

fn parse_cron_file(path: &Path) -> Result<CronDefinition, ManifestError> {
    let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ManifestError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
