//! respack - Resource pack installation
//!
//! This library installs curated resource packs (model files, plugin
//! repositories, workflow definitions and auxiliary files) into a local
//! application installation, with per-resource progress tracking and
//! cooperative cancellation.
//!
//! - [`pack`] - pack definitions, validation and the catalog
//! - [`manager`] - downloads, installers, progress, orchestration, history
//! - [`config`] - INI configuration file
//! - [`logging`] - tracing subscriber setup

pub mod config;
pub mod logging;
pub mod manager;
pub mod pack;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
