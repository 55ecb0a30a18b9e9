//! Plugin manager: discovers units, loads them and owns the shared bus.

use std::collections::{BTreeSet, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hostdeck_cron::TaskDef;
use hostdeck_hooks::EventBus;
use hostdeck_storage::{SettingEntry, SettingsError, SettingsStore};
use hostdeck_types::events::{PLUGINS_LOADED, SETTINGS_UPDATED};
use hostdeck_types::{PluginManifest, TaskOrigin, UnitState};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::cron_defs::{discover_cron_files, task_identifier};
use crate::manifest::{ManifestError, has_manifest, load_manifest};
use crate::registry::PluginRegistry;
use crate::routes::RouteTable;
use crate::unit::{PluginUnit, RegisterContext, UnitInit, UnitSettings};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("unit {0:?} not found under the plugin root")]
    NotFound(String),
    #[error("unit {0:?} is already loaded")]
    AlreadyLoaded(String),
    #[error("unit {0:?} is disabled by configuration")]
    Disabled(String),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("unit {unit:?}: no constructor registered for entry point {entry:?}")]
    UnknownEntryPoint { unit: String, entry: String },
    #[error("unit {unit:?}: constructor failed: {error:#}")]
    Instantiate { unit: String, error: anyhow::Error },
    #[error("unit {unit:?}: event registration failed: {error:#}")]
    Register { unit: String, error: anyhow::Error },
}

impl LoadError {
    /// Furthest lifecycle state the unit reached before failing.
    pub fn reached(&self) -> Option<UnitState> {
        match self {
            LoadError::NotFound(_) | LoadError::AlreadyLoaded(_) | LoadError::Disabled(_) => None,
            LoadError::Manifest(_)
            | LoadError::UnknownEntryPoint { .. }
            | LoadError::Instantiate { .. } => Some(UnitState::Discovered),
            LoadError::Register { .. } => Some(UnitState::Loaded),
        }
    }
}

/// A unit excluded from the active set during `load_all`.
#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub identifier: String,
    pub reached: Option<UnitState>,
    pub error: String,
}

/// Outcome of `load_all`.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub failed: Vec<LoadFailure>,
    pub disabled: Vec<String>,
}

/// An active unit.
pub struct LoadedUnit {
    pub identifier: String,
    pub manifest: PluginManifest,
    pub dir: PathBuf,
    pub state: UnitState,
    /// Handlers this unit committed to the shared bus.
    pub subscriptions: usize,
    /// Routes this unit declared.
    pub routes: usize,
    unit: Arc<dyn PluginUnit>,
}

impl std::fmt::Debug for LoadedUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedUnit")
            .field("identifier", &self.identifier)
            .field("manifest", &self.manifest)
            .field("state", &self.state)
            .field("subscriptions", &self.subscriptions)
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

/// Owns the loaded units, the event bus and the route table.
///
/// Loading needs `&mut self` and happens once at bootstrap. After that the
/// manager is shared read-only (`Arc<PluginManager>`): emitting events and
/// settings pass-through only need `&self`.
pub struct PluginManager {
    root: PathBuf,
    registry: PluginRegistry,
    settings: Arc<dyn SettingsStore>,
    bus: EventBus,
    routes: RouteTable,
    units: Vec<LoadedUnit>,
    failures: Vec<LoadFailure>,
    disabled: HashSet<String>,
}

impl PluginManager {
    pub fn new(
        root: impl Into<PathBuf>,
        registry: PluginRegistry,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            root: root.into(),
            registry,
            settings,
            bus: EventBus::new(),
            routes: RouteTable::new(),
            units: Vec::new(),
            failures: Vec::new(),
            disabled: HashSet::new(),
        }
    }

    /// Units that are discovered but never loaded.
    pub fn with_disabled<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disabled.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Constructors this manager can instantiate.
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ─── Discovery & loading ───────────────────────────────

    /// Subdirectories of the plugin root that contain a manifest, sorted.
    pub fn discover_units(&self) -> Vec<String> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(e) => e,
            Err(e) => {
                warn!(root = %self.root.display(), "Cannot read plugin root: {e}");
                return Vec::new();
            }
        };

        let mut ids: Vec<String> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .filter(|p| {
                let found = has_manifest(p);
                if !found {
                    debug!(path = %p.display(), "Skipping directory without manifest");
                }
                found
            })
            .filter_map(|p| p.file_name()?.to_str().map(str::to_string))
            .collect();
        ids.sort();
        ids
    }

    /// Parse, construct and activate one unit.
    ///
    /// On any failure nothing the unit registered is kept.
    pub fn load_unit(&mut self, identifier: &str) -> Result<&LoadedUnit, LoadError> {
        if self.units.iter().any(|u| u.identifier == identifier) {
            return Err(LoadError::AlreadyLoaded(identifier.to_string()));
        }
        if self.disabled.contains(identifier) {
            return Err(LoadError::Disabled(identifier.to_string()));
        }
        if identifier.is_empty() || identifier.contains(['/', '\\']) || identifier.starts_with('.') {
            return Err(LoadError::NotFound(identifier.to_string()));
        }
        let dir = self.root.join(identifier);
        if !dir.is_dir() {
            return Err(LoadError::NotFound(identifier.to_string()));
        }

        // Discovered -> Loaded
        let manifest = load_manifest(&dir)?;
        let entry = manifest.entry_point(identifier).to_string();
        let factory = self
            .registry
            .get(&entry)
            .ok_or_else(|| LoadError::UnknownEntryPoint {
                unit: identifier.to_string(),
                entry: entry.clone(),
            })?;

        let init = UnitInit {
            identifier: identifier.to_string(),
            manifest: manifest.clone(),
            data_dir: dir.join("data"),
            dir: dir.clone(),
            settings: UnitSettings::new(identifier, self.settings.clone()),
        };
        let unit = guarded(|| factory(&init)).map_err(|error| LoadError::Instantiate {
            unit: identifier.to_string(),
            error,
        })?;
        debug!(unit = identifier, entry = %entry, "Unit constructed");

        // Loaded -> Active
        let mut staged_bus = EventBus::new();
        let mut staged_routes = RouteTable::new();
        {
            let mut ctx = RegisterContext::new(identifier, &mut staged_bus, &mut staged_routes);
            let registering = unit.clone();
            guarded(|| registering.register_events(&mut ctx)).map_err(|error| LoadError::Register {
                unit: identifier.to_string(),
                error,
            })?;
        }

        let subscriptions = staged_bus
            .event_names()
            .iter()
            .map(|name| staged_bus.subscriber_count(name))
            .sum();
        let routes = staged_routes.len();
        self.bus.merge(staged_bus);
        self.routes.extend(staged_routes);

        info!(
            unit = identifier,
            name = %manifest.name,
            version = %manifest.version,
            subscriptions,
            routes,
            "Plugin unit active"
        );

        let index = self.units.len();
        self.units.push(LoadedUnit {
            identifier: identifier.to_string(),
            manifest,
            dir,
            state: UnitState::Active,
            subscriptions,
            routes,
            unit,
        });
        Ok(&self.units[index])
    }

    /// Discover and load every unit. Failures are logged and recorded; they
    /// never stop other units from loading. Emits `plugins::Loaded`.
    pub fn load_all(&mut self) -> LoadReport {
        let mut report = LoadReport::default();

        for id in self.discover_units() {
            if self.disabled.contains(&id) {
                info!(unit = %id, "Plugin unit disabled, not loading");
                report.disabled.push(id);
                continue;
            }
            match self.load_unit(&id) {
                Ok(_) => report.loaded.push(id),
                Err(LoadError::AlreadyLoaded(_)) => {}
                Err(e) => {
                    error!(unit = %id, "Failed to load plugin unit: {e}");
                    let failure = LoadFailure {
                        identifier: id,
                        reached: e.reached(),
                        error: e.to_string(),
                    };
                    self.failures.push(failure.clone());
                    report.failed.push(failure);
                }
            }
        }

        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            disabled = report.disabled.len(),
            "Plugin loading finished"
        );
        self.bus.emit(
            PLUGINS_LOADED,
            &json!({
                "loaded": report.loaded,
                "failed": report.failed.iter().map(|f| &f.identifier).collect::<Vec<_>>(),
            }),
        );
        report
    }

    // ─── Queries ───────────────────────────────────────────

    /// Identifiers of active units.
    pub fn loaded_units(&self) -> BTreeSet<String> {
        self.units.iter().map(|u| u.identifier.clone()).collect()
    }

    /// Active units in load order.
    pub fn units(&self) -> &[LoadedUnit] {
        &self.units
    }

    pub fn unit(&self, identifier: &str) -> Option<&LoadedUnit> {
        self.units.iter().find(|u| u.identifier == identifier)
    }

    pub fn unit_config(&self, identifier: &str) -> Option<&PluginManifest> {
        self.unit(identifier).map(|u| &u.manifest)
    }

    /// `Active` for loaded units, `Discovered` for units on disk that are not
    /// active, `None` otherwise.
    pub fn unit_state(&self, identifier: &str) -> Option<UnitState> {
        if let Some(unit) = self.unit(identifier) {
            return Some(unit.state);
        }
        let dir = self.root.join(identifier);
        (dir.is_dir() && has_manifest(&dir)).then_some(UnitState::Discovered)
    }

    pub fn failures(&self) -> &[LoadFailure] {
        &self.failures
    }

    // ─── Events & routes ───────────────────────────────────

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// For core subscriptions made during bootstrap.
    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    pub fn emit(&self, event: &str, payload: &Value) {
        self.bus.emit(event, payload);
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    // ─── Settings pass-through ─────────────────────────────

    pub fn unit_setting(&self, identifier: &str, key: &str) -> Result<Option<String>, SettingsError> {
        self.settings.get(identifier, key)
    }

    pub fn unit_settings(&self, identifier: &str) -> Result<Vec<SettingEntry>, SettingsError> {
        self.settings.list(identifier)
    }

    /// Write a setting and emit `settings::Updated`.
    pub fn set_unit_setting(&self, identifier: &str, key: &str, value: &str) -> Result<(), SettingsError> {
        self.settings.set(identifier, key, value)?;
        self.bus.emit(
            SETTINGS_UPDATED,
            &json!({ "plugin": identifier, "key": key, "value": value }),
        );
        Ok(())
    }

    /// Delete a setting; emits `settings::Updated` with a null value when
    /// something was removed.
    pub fn delete_unit_setting(&self, identifier: &str, key: &str) -> Result<bool, SettingsError> {
        let removed = self.settings.delete(identifier, key)?;
        if removed {
            self.bus.emit(
                SETTINGS_UPDATED,
                &json!({ "plugin": identifier, "key": key, "value": Value::Null }),
            );
        }
        Ok(removed)
    }

    // ─── Cron ──────────────────────────────────────────────

    /// Cron tasks declared by active units, in load order then file order.
    /// Definitions that fail to parse or name an unknown handler are logged
    /// and left out.
    pub fn cron_tasks(&self) -> Vec<TaskDef> {
        let mut tasks = Vec::new();
        for loaded in &self.units {
            for file in discover_cron_files(&loaded.dir) {
                let identifier = task_identifier(&loaded.identifier, &file.name);
                let definition = match &file.definition {
                    Ok(d) => d,
                    Err(e) => {
                        error!(task = %identifier, "Skipping cron definition: {e}");
                        continue;
                    }
                };
                let handler = file.handler().unwrap_or(&file.name);
                let Some(callback) = loaded.unit.clone().cron_handler(handler) else {
                    error!(
                        task = %identifier,
                        handler,
                        path = %file.path.display(),
                        "Unit provides no such cron handler"
                    );
                    continue;
                };
                tasks.push(TaskDef::new(
                    identifier,
                    definition.interval.clone(),
                    TaskOrigin::Plugin(loaded.identifier.clone()),
                    callback,
                ));
            }
        }
        tasks
    }
}

/// Run plugin code, turning a panic into an error.
fn guarded<T>(f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            Err(anyhow::anyhow!("panicked: {msg}"))
        }
    }
}
