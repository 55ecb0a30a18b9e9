//! Entry-point name → constructor table.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::unit::{PluginUnit, UnitInit};

/// Constructor for a plugin unit.
pub type UnitFactory =
    Box<dyn Fn(&UnitInit) -> anyhow::Result<Arc<dyn PluginUnit>> + Send + Sync>;

/// Constructors known to this build, populated by the host at startup.
#[derive(Default)]
pub struct PluginRegistry {
    factories: BTreeMap<String, UnitFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor. Replaces any existing one with the same name.
    pub fn register(&mut self, entry: impl Into<String>, factory: UnitFactory) {
        let entry = entry.into();
        if self.factories.insert(entry.clone(), factory).is_some() {
            tracing::warn!(entry = %entry, "Replaced plugin constructor");
        }
    }

    pub fn with(mut self, entry: impl Into<String>, factory: UnitFactory) -> Self {
        self.register(entry, factory);
        self
    }

    pub fn get(&self, entry: &str) -> Option<&UnitFactory> {
        self.factories.get(entry)
    }

    /// Registered entry-point names, sorted.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}
