//! hostdeck-hooks: in-process event bus.
//!
//! Plugins and core code subscribe handlers to namespaced event names
//! (`"auth::LoginSuccess"`). Emitting runs every handler synchronously, in
//! subscription order. Handlers are best-effort observers: an error or panic
//! in one is logged and the remaining handlers still run.

pub mod bus;

pub use bus::{EventBus, EventHandler};
pub use hostdeck_types::events;
