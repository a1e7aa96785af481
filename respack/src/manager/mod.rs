//! Pack Manager for installing resource packs.
//!
//! This module turns catalog packs into files and plugin checkouts inside a
//! local application installation.
//!
//! # Overview
//!
//! The Manager handles:
//! - Streaming model, workflow and auxiliary file downloads
//! - Cloning plugin repositories through a plugin host
//! - Tracking per-task and per-resource progress
//! - Cancelling running installations
//! - Recording finished tasks
//!
//! # Architecture
//!
//! ```text
//! PackService ──► Orchestrator ──► ResourceInstallers ──┬──► HttpDownloader
//!      │               │                                └──► PluginHost
//!      │               ▼
//!      └─────────► ProgressManager          HistoryRecorder ◄── (terminal tasks)
//! ```
//!
//! - [`PackService`] - boundary operations (install, progress, cancel)
//! - [`Orchestrator`] - sequences resources on a background task
//! - [`ResourceInstallers`] - one installer per resource kind
//! - [`ProgressManager`] - canonical task state
//! - [`PluginHost`] - external plugin management, [`GitPluginHost`] by default
//! - [`HistoryRecorder`] - finished task summaries
//!
//! # Example
//!
//! ```ignore
//! use respack::manager::{ManagerConfig, PackService};
//! use respack::pack::PackCatalog;
//!
//! let catalog = Arc::new(PackCatalog::new("/etc/respack/packs"));
//! catalog.load()?;
//!
//! let service = PackService::new(ManagerConfig::new("/opt/app"), catalog)?;
//! let ticket = service.install("sdxl-starter", None, Some("mirror"))?;
//!
//! // Later, from any request handler
//! let task = service.get_progress(&ticket.task_id)?;
//! service.cancel(&ticket.task_id)?;
//! ```

mod config;
pub mod download;
mod error;
mod history;
pub mod installer;
mod orchestrator;
pub mod plugin_host;
pub mod progress;
mod rewrite;
mod service;

pub use config::{
    ManagerConfig, DEFAULT_EVICTION_INTERVAL, DEFAULT_HISTORY_LIMIT, DEFAULT_PROGRESS_INTERVAL,
    DEFAULT_RETENTION, DEFAULT_TIMEOUT,
};
pub use download::{DownloadOutcome, DownloadProgress, HttpDownloader};
pub use error::{ErrorKind, ManagerError, ManagerResult};
pub use history::{HistoryEntry, HistoryRecorder, JsonlHistory, MemoryHistory, NoopHistory};
pub use installer::{InstallContext, InstallEvents, InstallOutcome, ResourceEvent, ResourceInstallers};
pub use orchestrator::{select_resources, Orchestrator};
pub use plugin_host::{
    CloneOutcome, CloneRequest, GitPluginHost, InstalledPlugin, PluginHost,
};
pub use progress::{
    InstallationTask, ProgressManager, ResourceError, ResourceState, ResourceStatus, TaskStatus,
    TaskSummary, TaskTicket,
};
pub use rewrite::{rewrite_url, HostRewrite};
pub use service::{CancelResponse, InstallRequest, InstallTicket, PackService};
