//! The capability interface every plugin unit implements.

use std::path::PathBuf;
use std::sync::Arc;

use hostdeck_cron::CronCallback;
use hostdeck_hooks::EventBus;
use hostdeck_storage::{SettingEntry, SettingsError, SettingsStore};
use hostdeck_types::PluginManifest;
use serde_json::Value;

use crate::routes::{Method, RouteDecl, RouteTable};

/// Trait for plugin units.
///
/// Methods take `self: Arc<Self>` so handlers and callbacks can keep the
/// unit alive by cloning the `Arc`. Units use interior mutability for any
/// state they change after construction.
pub trait PluginUnit: Send + Sync {
    /// Subscribe to events and declare routes. Called once, during
    /// bootstrap. Returning an error keeps the unit out of the active set
    /// and discards everything it registered.
    fn register_events(self: Arc<Self>, ctx: &mut RegisterContext<'_>) -> anyhow::Result<()>;

    /// Body for the cron definition naming `handler`, if the unit has one.
    fn cron_handler(self: Arc<Self>, _handler: &str) -> Option<CronCallback> {
        None
    }
}

/// Everything a constructor gets to build a unit.
#[derive(Clone)]
pub struct UnitInit {
    pub identifier: String,
    pub manifest: PluginManifest,
    /// The unit's directory under the plugin root.
    pub dir: PathBuf,
    /// `<dir>/data`; not created automatically.
    pub data_dir: PathBuf,
    pub settings: UnitSettings,
}

/// Settings of one unit.
///
/// Values are read from the store on every call. Writes made here do not
/// emit `settings::Updated`; administrative writes go through
/// `PluginManager::set_unit_setting`.
#[derive(Clone)]
pub struct UnitSettings {
    plugin_id: String,
    store: Arc<dyn SettingsStore>,
}

impl UnitSettings {
    pub fn new(plugin_id: impl Into<String>, store: Arc<dyn SettingsStore>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            store,
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        self.store.get(&self.plugin_id, key)
    }

    /// Parse a setting, falling back to `default` when absent or unparsable.
    pub fn get_or<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        match self.get(key) {
            Ok(Some(v)) => v.trim().parse().unwrap_or(default),
            Ok(None) => default,
            Err(e) => {
                tracing::warn!(plugin = %self.plugin_id, key, "Failed to read setting: {e}");
                default
            }
        }
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.store.set(&self.plugin_id, key, value)
    }

    pub fn delete(&self, key: &str) -> Result<bool, SettingsError> {
        self.store.delete(&self.plugin_id, key)
    }

    pub fn list(&self) -> Result<Vec<SettingEntry>, SettingsError> {
        self.store.list(&self.plugin_id)
    }
}

/// What `register_events` may touch.
///
/// Both the bus and the route table here are staging copies private to the
/// unit being loaded; they are committed only if registration succeeds.
pub struct RegisterContext<'a> {
    unit_id: &'a str,
    bus: &'a mut EventBus,
    routes: &'a mut RouteTable,
}

impl<'a> RegisterContext<'a> {
    pub(crate) fn new(unit_id: &'a str, bus: &'a mut EventBus, routes: &'a mut RouteTable) -> Self {
        Self {
            unit_id,
            bus,
            routes,
        }
    }

    pub fn unit_id(&self) -> &str {
        self.unit_id
    }

    pub fn subscribe<F>(&mut self, event: &str, handler: F)
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        tracing::debug!(unit = self.unit_id, event, "Unit subscribed");
        self.bus.subscribe(event, handler);
    }

    /// Declare a route served by `handler` of this unit.
    pub fn route(&mut self, method: Method, path: impl Into<String>, handler: impl Into<String>) {
        self.routes.add(RouteDecl {
            method,
            path: path.into(),
            handler: handler.into(),
            owner: self.unit_id.to_string(),
        });
    }

    /// Direct access to the staging bus.
    pub fn bus(&mut self) -> &mut EventBus {
        self.bus
    }
}
