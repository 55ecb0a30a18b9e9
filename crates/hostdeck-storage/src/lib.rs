//! hostdeck-storage: persistence for plugin settings.
//!
//! The core only ever sees settings through [`SettingsStore`]: a flat
//! string key/value map per plugin identifier. Nothing here caches values;
//! every call goes to the backing store.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("settings store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// A single persisted setting.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SettingEntry {
    pub key: String,
    pub value: String,
    /// Unix seconds of the last write.
    pub updated_at: i64,
}

/// Key/value settings keyed by plugin identifier.
pub trait SettingsStore: Send + Sync {
    fn get(&self, plugin_id: &str, key: &str) -> Result<Option<String>>;

    fn set(&self, plugin_id: &str, key: &str, value: &str) -> Result<()>;

    /// Returns whether a value was removed.
    fn delete(&self, plugin_id: &str, key: &str) -> Result<bool>;

    /// All settings of one plugin, ordered by key.
    fn list(&self, plugin_id: &str) -> Result<Vec<SettingEntry>>;
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS plugin_settings (
    plugin_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (plugin_id, key)
);";

/// SQLite-backed settings store.
pub struct SqliteSettingsStore {
    conn: Mutex<Connection>,
}

impl SqliteSettingsStore {
    /// Open (or create) the SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        tracing::info!("Settings storage opened: {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| SettingsError::Poisoned)
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn get(&self, plugin_id: &str, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM plugin_settings WHERE plugin_id = ?1 AND key = ?2",
                rusqlite::params![plugin_id, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, plugin_id: &str, key: &str, value: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO plugin_settings (plugin_id, key, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(plugin_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            rusqlite::params![plugin_id, key, value, chrono::Utc::now().timestamp()],
        )?;
        Ok(())
    }

    fn delete(&self, plugin_id: &str, key: &str) -> Result<bool> {
        let conn = self.conn()?;
        let count = conn.execute(
            "DELETE FROM plugin_settings WHERE plugin_id = ?1 AND key = ?2",
            rusqlite::params![plugin_id, key],
        )?;
        Ok(count > 0)
    }

    fn list(&self, plugin_id: &str) -> Result<Vec<SettingEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT key, value, updated_at FROM plugin_settings
             WHERE plugin_id = ?1 ORDER BY key",
        )?;
        let entries = stmt
            .query_map(rusqlite::params![plugin_id], |row| {
                Ok(SettingEntry {
                    key: row.get(0)?,
                    value: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

/// Process-local settings store, for tests and dry runs.
#[derive(Default)]
pub struct MemorySettingsStore {
    entries: Mutex<HashMap<String, BTreeMap<String, SettingEntry>>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, BTreeMap<String, SettingEntry>>>> {
        self.entries.lock().map_err(|_| SettingsError::Poisoned)
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, plugin_id: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .entries()?
            .get(plugin_id)
            .and_then(|m| m.get(key))
            .map(|e| e.value.clone()))
    }

    fn set(&self, plugin_id: &str, key: &str, value: &str) -> Result<()> {
        self.entries()?.entry(plugin_id.to_string()).or_default().insert(
            key.to_string(),
            SettingEntry {
                key: key.to_string(),
                value: value.to_string(),
                updated_at: chrono::Utc::now().timestamp(),
            },
        );
        Ok(())
    }

    fn delete(&self, plugin_id: &str, key: &str) -> Result<bool> {
        Ok(self
            .entries()?
            .get_mut(plugin_id)
            .is_some_and(|m| m.remove(key).is_some()))
    }

    fn list(&self, plugin_id: &str) -> Result<Vec<SettingEntry>> {
        Ok(self
            .entries()?
            .get(plugin_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn SettingsStore) {
        assert_eq!(store.get("billing", "currency").unwrap(), None);

        store.set("billing", "currency", "EUR").unwrap();
        store.set("billing", "account", "acme").unwrap();
        store.set("other", "currency", "USD").unwrap();
        assert_eq!(store.get("billing", "currency").unwrap().as_deref(), Some("EUR"));

        store.set("billing", "currency", "GBP").unwrap();
        assert_eq!(store.get("billing", "currency").unwrap().as_deref(), Some("GBP"));

        let keys: Vec<_> = store
            .list("billing")
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, vec!["account", "currency"]);

        assert!(store.delete("billing", "currency").unwrap());
        assert!(!store.delete("billing", "currency").unwrap());
        assert_eq!(store.get("billing", "currency").unwrap(), None);
        assert_eq!(store.get("other", "currency").unwrap().as_deref(), Some("USD"));
    }

    #[test]
    fn test_sqlite_settings_roundtrip() {
        let store = SqliteSettingsStore::open_in_memory().unwrap();
        exercise(&store);
    }

    #[test]
    fn test_memory_settings_roundtrip() {
        let store = MemorySettingsStore::new();
        exercise(&store);
    }

    #[test]
    fn test_sqlite_settings_persist_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("settings.db");
        {
            let store = SqliteSettingsStore::open(&db_path).unwrap();
            store.set("login-audit", "max_entries", "20").unwrap();
        }
        let store = SqliteSettingsStore::open(&db_path).unwrap();
        assert_eq!(
            store.get("login-audit", "max_entries").unwrap().as_deref(),
            Some("20")
        );
    }

    #[test]
    fn test_list_unknown_plugin_is_empty() {
        let store = SqliteSettingsStore::open_in_memory().unwrap();
        assert!(store.list("nobody").unwrap().is_empty());
    }
}
