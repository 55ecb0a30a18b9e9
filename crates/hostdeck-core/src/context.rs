//! Process-wide context, built once at bootstrap.

use std::sync::Arc;

use hostdeck_config::{HostDeckConfig, IntervalBackendKind};
use hostdeck_cron::{Clock, FileBackend, IntervalStore, SqliteBackend, StoreError, SystemClock};
use hostdeck_plugins::{LoadReport, PluginManager, PluginRegistry};
use hostdeck_storage::{SettingsError, SettingsStore, SqliteSettingsStore};
use hostdeck_types::events::ROUTER_READY;
use serde_json::json;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("failed to prepare {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("settings store: {0}")]
    Settings(#[from] SettingsError),
    #[error("interval store: {0}")]
    Intervals(#[from] StoreError),
}

/// Which process surface is bootstrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    /// The request-serving process. Emits `router::Ready` once the route
    /// table is complete.
    Web,
    /// One-shot processes: the scheduler runner and operator commands.
    /// There is no router, so `router::Ready` is not emitted.
    Scheduler,
}

/// Everything the request handlers and the scheduler runner share.
///
/// Built once; after [`CoreContext::bootstrap`] returns it is only read, so
/// it can be wrapped in an `Arc` and handed out without locking.
pub struct CoreContext {
    pub config: HostDeckConfig,
    pub plugins: PluginManager,
    pub intervals: Arc<IntervalStore>,
    pub load_report: LoadReport,
    pub invocation: Invocation,
}

impl CoreContext {
    /// Open the configured stores and load every plugin unit. A
    /// [`Invocation::Web`] bootstrap also announces the route table.
    pub fn bootstrap(
        config: HostDeckConfig,
        registry: PluginRegistry,
        invocation: Invocation,
    ) -> Result<Self, BootstrapError> {
        if let Some(dir) = config.paths.database.parent() {
            std::fs::create_dir_all(dir).map_err(|source| BootstrapError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let settings = Arc::new(SqliteSettingsStore::open(&config.paths.database)?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let intervals = match config.scheduler.interval_backend {
            IntervalBackendKind::File => IntervalStore::new(FileBackend::new(config.cron_dir()), clock),
            IntervalBackendKind::Sqlite => {
                IntervalStore::new(SqliteBackend::open(&config.paths.database)?, clock)
            }
        };

        Ok(Self::with_parts(
            config,
            registry,
            settings,
            Arc::new(intervals),
            invocation,
        ))
    }

    /// Bootstrap with caller-supplied stores.
    pub fn with_parts(
        config: HostDeckConfig,
        registry: PluginRegistry,
        settings: Arc<dyn SettingsStore>,
        intervals: Arc<IntervalStore>,
        invocation: Invocation,
    ) -> Self {
        info!(
            ?invocation,
            plugin_root = %config.paths.plugin_root.display(),
            cache_root = %config.paths.cache_root.display(),
            "Bootstrapping hostdeck core"
        );

        let mut plugins = PluginManager::new(&config.paths.plugin_root, registry, settings)
            .with_disabled(config.plugins.disabled.iter().cloned());
        let load_report = plugins.load_all();

        if invocation == Invocation::Web {
            plugins.emit(ROUTER_READY, &json!({ "routes": plugins.routes().len() }));
        }

        Self {
            config,
            plugins,
            intervals,
            load_report,
            invocation,
        }
    }
}
