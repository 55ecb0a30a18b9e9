//! Login audit plugin unit for hostdeck.
//!
//! Appends one line per successful login to `<unit>/data/logins.log` and
//! trims the file on a schedule.
//!
//! # Unit directory
//!
//! ```text
//! plugins/login-audit/
//!   plugin.toml      name = "Login Audit", version = "1.0.0"
//!   cron/trim.toml   interval = "1D"
//! ```
//!
//! # Settings
//!
//! - `enabled`: `"false"` stops recording (default `"true"`).
//! - `max_entries`: lines kept by the `trim` task (default 500).

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use hostdeck_cron::{CronCallback, TaskContext};
use hostdeck_plugins::{Method, PluginUnit, RegisterContext, UnitInit, UnitSettings};
use hostdeck_types::events::{AUTH_LOGIN_SUCCESS, SETTINGS_UPDATED};
use serde_json::Value;
use tracing::{debug, info};

/// Entry-point name to register this unit under.
pub const ENTRY: &str = "login-audit";

const LOG_FILE: &str = "logins.log";
const DEFAULT_MAX_ENTRIES: usize = 500;

pub struct LoginAudit {
    id: String,
    log_path: PathBuf,
    settings: UnitSettings,
    write_lock: Mutex<()>,
}

impl LoginAudit {
    pub fn new(id: String, data_dir: &Path, settings: UnitSettings) -> Self {
        Self {
            id,
            log_path: data_dir.join(LOG_FILE),
            settings,
            write_lock: Mutex::new(()),
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn enabled(&self) -> bool {
        self.settings.get_or("enabled", true)
    }

    /// Record one `auth::LoginSuccess` payload.
    fn record(&self, payload: &Value) -> anyhow::Result<()> {
        if !self.enabled() {
            debug!(unit = %self.id, "Login audit disabled, ignoring event");
            return Ok(());
        }
        let user = payload
            .get("user")
            .and_then(Value::as_str)
            .context("auth::LoginSuccess payload has no user")?;
        let ip = payload.get("ip").and_then(Value::as_str).unwrap_or("-");

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(dir) = self.log_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("opening {}", self.log_path.display()))?;
        writeln!(file, "{}\t{user}\t{ip}", chrono::Utc::now().to_rfc3339())?;
        Ok(())
    }

    /// Last `limit` recorded lines, oldest first.
    pub fn recent(&self, limit: usize) -> anyhow::Result<Vec<String>> {
        let lines = self.read_lines()?;
        let skip = lines.len().saturating_sub(limit);
        Ok(lines.into_iter().skip(skip).collect())
    }

    fn read_lines(&self) -> anyhow::Result<Vec<String>> {
        match std::fs::read_to_string(&self.log_path) {
            Ok(content) => Ok(content.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Keep only the newest `max_entries` lines.
    fn trim(&self, ctx: &TaskContext) -> anyhow::Result<()> {
        let max = self.settings.get_or("max_entries", DEFAULT_MAX_ENTRIES);
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let lines = self.read_lines()?;
        if lines.len() <= max {
            debug!(task = %ctx.identifier, lines = lines.len(), "Nothing to trim");
            return Ok(());
        }

        let dropped = lines.len() - max;
        let mut kept = lines[dropped..].join("\n");
        if max > 0 {
            kept.push('\n');
        }
        std::fs::write(&self.log_path, kept)
            .with_context(|| format!("rewriting {}", self.log_path.display()))?;
        info!(task = %ctx.identifier, dropped, kept = max, "Trimmed login audit log");
        Ok(())
    }
}

impl PluginUnit for LoginAudit {
    fn register_events(self: Arc<Self>, ctx: &mut RegisterContext<'_>) -> anyhow::Result<()> {
        let unit = self.clone();
        ctx.subscribe(AUTH_LOGIN_SUCCESS, move |payload| unit.record(payload));

        let id = self.id.clone();
        ctx.subscribe(SETTINGS_UPDATED, move |payload| {
            if payload.get("plugin").and_then(Value::as_str) == Some(id.as_str()) {
                info!(unit = %id, key = %payload["key"], "Login audit settings changed");
            }
            Ok(())
        });

        ctx.route(Method::Get, format!("/plugins/{}/recent", self.id), "recent");
        Ok(())
    }

    fn cron_handler(self: Arc<Self>, handler: &str) -> Option<CronCallback> {
        match handler {
            "trim" => Some(Arc::new(move |ctx: &TaskContext| self.trim(ctx))),
            _ => None,
        }
    }
}

/// Factory function: create a `LoginAudit` unit.
pub fn create_login_audit(init: &UnitInit) -> anyhow::Result<Arc<dyn PluginUnit>> {
    Ok(Arc::new(LoginAudit::new(
        init.identifier.clone(),
        &init.data_dir,
        init.settings.clone(),
    )))
}
