//! Well-known event names.
//!
//! Names are namespaced by domain as `<domain>::<Event>`. Plugins may emit
//! and subscribe to their own names as well; these are the ones the host
//! itself emits.

/// The route table is complete and the HTTP layer may start serving.
pub const ROUTER_READY: &str = "router::Ready";
/// Every discoverable unit has been loaded or excluded.
pub const PLUGINS_LOADED: &str = "plugins::Loaded";
/// A plugin setting was written or deleted.
pub const SETTINGS_UPDATED: &str = "settings::Updated";
/// A user authenticated successfully. Emitted by the auth collaborator.
pub const AUTH_LOGIN_SUCCESS: &str = "auth::LoginSuccess";
/// A scheduler invocation finished.
pub const CRON_RUN_FINISHED: &str = "cron::RunFinished";
