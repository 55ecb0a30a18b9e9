use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "HOSTDECK_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("Config directory not found")]
    NoDirFound,
}

/// Filesystem locations used by the core.
///
/// Relative paths are resolved against the directory holding the config
/// file (see [`HostDeckConfig::resolve_paths`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root directory scanned for plugin units.
    #[serde(default = "default_plugin_root")]
    pub plugin_root: PathBuf,
    /// Cache directory; interval records live under `<cache_root>/cron`.
    #[serde(default = "default_cache_root")]
    pub cache_root: PathBuf,
    /// SQLite database holding plugin settings.
    #[serde(default = "default_database")]
    pub database: PathBuf,
}

fn default_plugin_root() -> PathBuf {
    PathBuf::from("plugins")
}

fn default_cache_root() -> PathBuf {
    PathBuf::from("cache")
}

fn default_database() -> PathBuf {
    PathBuf::from("hostdeck.db")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            plugin_root: default_plugin_root(),
            cache_root: default_cache_root(),
            database: default_database(),
        }
    }
}

/// Backing medium for interval records.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntervalBackendKind {
    /// One timestamp file per task under `<cache_root>/cron`.
    #[default]
    File,
    /// A `cron_intervals` table in the settings database.
    Sqlite,
}

/// Scheduler runner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub interval_backend: IntervalBackendKind,
    /// Age in days after which files under `<cache_root>/tmp` are pruned.
    #[serde(default = "default_cache_ttl_days")]
    pub cache_ttl_days: u32,
}

fn default_cache_ttl_days() -> u32 {
    7
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_backend: IntervalBackendKind::default(),
            cache_ttl_days: default_cache_ttl_days(),
        }
    }
}

/// Log output settings. `RUST_LOG` takes precedence over `filter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

/// Plugin loading options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Unit identifiers that are discovered but never loaded.
    #[serde(default)]
    pub disabled: Vec<String>,
}

/// Top-level hostdeck configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostDeckConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
}

impl HostDeckConfig {
    /// Make every relative path absolute with respect to `base`.
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.paths.plugin_root);
        resolve(&mut self.paths.cache_root);
        resolve(&mut self.paths.database);
        self
    }

    /// Directory holding interval records.
    pub fn cron_dir(&self) -> PathBuf {
        self.paths.cache_root.join("cron")
    }
}

/// Resolve the hostdeck config directory (~/.hostdeck/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".hostdeck"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path: `$HOSTDECK_CONFIG`, else ~/.hostdeck/config.json5.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    Ok(config_dir()?.join("config.json5"))
}

/// Load configuration from the default path, falling back to defaults.
pub fn load_config() -> Result<HostDeckConfig, ConfigError> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let path = config_file_path()?;
    load_config_from(&path)
}

/// Load configuration from a specific path, falling back to defaults if not found.
///
/// Relative paths inside the file are resolved against its parent directory.
pub fn load_config_from(path: &Path) -> Result<HostDeckConfig, ConfigError> {
    let base = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    if !path.exists() {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        return Ok(HostDeckConfig::default().resolve_paths(&base));
    }

    let content = std::fs::read_to_string(path)?;
    let config: HostDeckConfig = json5::from_str(&content)?;
    Ok(config.resolve_paths(&base))
}

/// Save configuration to `path`, creating its directory.
pub fn save_config_to(config: &HostDeckConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| ConfigError::Io(std::io::Error::other(e)))?;
    std::fs::write(path, content)?;
    Ok(())
}
