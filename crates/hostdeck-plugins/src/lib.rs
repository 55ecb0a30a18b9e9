//! hostdeck-plugins: discovery, loading and lifecycle of plugin units.
//!
//! A unit is a directory under the plugin root holding a `plugin.toml`
//! manifest. Its code is not loaded from disk: the host binary registers a
//! constructor per entry-point name in a [`PluginRegistry`], and the manifest
//! picks one. Every constructed unit implements the fixed [`PluginUnit`]
//! capability trait.
//!
//! # Unit layout
//!
//! ```text
//! plugins/
//!   login-audit/
//!     plugin.toml        # name, version, author, [entry]
//!     cron/
//!       trim.toml        # interval = "1D", [handler = "trim"]
//!     data/              # private working directory
//! ```
//!
//! Units are loaded once, synchronously, before any event is emitted or any
//! scheduler tick runs. There is no runtime unload.

pub mod cron_defs;
pub mod manager;
pub mod manifest;
pub mod registry;
pub mod routes;
pub mod unit;

pub use manager::{LoadError, LoadFailure, LoadReport, LoadedUnit, PluginManager};
pub use manifest::ManifestError;
pub use registry::{PluginRegistry, UnitFactory};
pub use routes::{Method, RouteDecl, RouteTable};
pub use unit::{PluginUnit, RegisterContext, UnitInit, UnitSettings};
