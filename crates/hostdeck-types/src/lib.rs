use serde::{Deserialize, Serialize};

pub mod events;

// ──────────────────── Plugin Types ────────────────────

/// Static metadata shipped in a unit's `plugin.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginManifest {
    /// Display name.
    pub name: String,
    /// Version string as written by the author (not validated as semver).
    pub version: String,
    /// Author or vendor.
    #[serde(default)]
    pub author: String,
    /// Short description shown in the admin panel.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Name of the registered constructor. Defaults to the unit identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
}

impl PluginManifest {
    /// Entry point name, falling back to the unit identifier.
    pub fn entry_point<'a>(&'a self, identifier: &'a str) -> &'a str {
        self.entry.as_deref().unwrap_or(identifier)
    }
}

/// Lifecycle of a plugin unit inside one process.
///
/// There is no unloaded state: removing a unit requires deleting its
/// files and restarting the process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    /// Directory with a manifest was found.
    Discovered,
    /// Manifest parsed and entry point constructed.
    Loaded,
    /// Event subscriptions committed to the shared bus.
    Active,
}

// ──────────────────── Cron Types ────────────────────

/// Who contributed a cron task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "unit", rename_all = "snake_case")]
pub enum TaskOrigin {
    /// Built into the host.
    Core,
    /// Declared by a plugin unit.
    Plugin(String),
}

impl std::fmt::Display for TaskOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskOrigin::Core => f.write_str("core"),
            TaskOrigin::Plugin(unit) => write!(f, "plugin:{unit}"),
        }
    }
}

/// Counts reported at the end of one scheduler invocation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSummary {
    /// Callbacks that completed and were recorded.
    pub ran: usize,
    /// Tasks that were not due.
    pub skipped: usize,
    /// Callbacks that failed, or whose success could not be recorded.
    pub failed: usize,
    /// Definitions rejected at construction (bad interval expression).
    pub invalid: usize,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.ran + self.skipped + self.failed + self.invalid
    }
}
