//! HTTP download engine.
//!
//! This module streams one remote file to a local path:
//! - Streaming transfer with cancellation (`http`)
//! - Progress snapshots and rate limiting (`progress`)
//!
//! # Architecture
//!
//! ```text
//! HttpDownloader::download(url, dest, on_progress, cancel)
//!         │
//!         ├── GET url ──► <dest>.part   (chunks raced against cancel)
//!         │                   │
//!         │                   └── ProgressThrottle ──► on_progress
//!         │
//!         └── rename <dest>.part ──► dest
//! ```
//!
//! Whether to download at all is decided by the installers; the engine
//! always transfers.

mod http;
mod progress;

pub use http::{part_path, DownloadOutcome, HttpDownloader, USER_AGENT};
pub use progress::{DownloadProgress, ProgressThrottle};
