//! Error types for the Pack Manager.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::pack::ValidationError;

/// Result type for manager operations.
pub type ManagerResult<T> = Result<T, ManagerError>;

/// Coarse classification of a [`ManagerError`].
///
/// Installers and the orchestrator use this to decide how a failure is
/// reported: cancellations are never logged as failures, and network-class
/// errors trigger the same partial-output cleanup as transfer failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transfer failure (connection, HTTP status, timeout, empty result).
    Network,
    /// Directory or file operation failure.
    Filesystem,
    /// Malformed pack, resource, selection or configuration.
    Validation,
    /// The operation was canceled.
    Cancellation,
    /// The requested pack or task does not exist.
    NotFound,
    /// The requested transition conflicts with the current state.
    Conflict,
    /// An external process failed.
    Process,
}

/// Errors that can occur during pack management operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Failed to read a file or directory.
    #[error("failed to read {}: {source}", path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write a file or directory.
    #[error("failed to write {}: {source}", path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// Failed to remove a file or directory.
    #[error("failed to remove {}: {source}", path.display())]
    RemoveFailed { path: PathBuf, source: io::Error },

    /// Failed to download a resource.
    #[error("failed to download {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("request to {url} failed with status {status}")]
    HttpStatus { url: String, status: u16 },

    /// Network timeout.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    /// The transfer finished but produced no bytes.
    #[error("download of {url} produced an empty file at {}", path.display())]
    ZeroByteResult { url: String, path: PathBuf },

    /// A pack or resource definition is malformed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A selected resource id is not part of the pack.
    #[error("pack {pack_id} has no resource {resource_id}")]
    UnknownResource { pack_id: String, resource_id: String },

    /// The caller selected no resources.
    #[error("no resources selected for pack {0}")]
    EmptySelection(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The operation was canceled.
    #[error("operation canceled")]
    Canceled,

    /// Pack not found in the catalog.
    #[error("pack not found: {0}")]
    PackNotFound(String),

    /// Installation task not found.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// The task already reached a terminal state.
    #[error("task {task_id} already finished with status {status}")]
    TaskAlreadyFinished { task_id: String, status: String },

    /// Cloning a plugin repository failed.
    #[error("failed to clone {url}: {reason}")]
    CloneFailed { url: String, reason: String },

    /// An external process could not be started.
    #[error("failed to run {program}: {source}")]
    SpawnFailed { program: String, source: io::Error },
}

impl ManagerError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ReadFailed { .. }
            | Self::WriteFailed { .. }
            | Self::CreateDirFailed { .. }
            | Self::RemoveFailed { .. } => ErrorKind::Filesystem,
            Self::DownloadFailed { .. }
            | Self::HttpStatus { .. }
            | Self::Timeout { .. }
            | Self::ZeroByteResult { .. } => ErrorKind::Network,
            Self::Validation(_)
            | Self::UnknownResource { .. }
            | Self::EmptySelection(_)
            | Self::InvalidConfig(_) => ErrorKind::Validation,
            Self::Canceled => ErrorKind::Cancellation,
            Self::PackNotFound(_) | Self::TaskNotFound(_) => ErrorKind::NotFound,
            Self::TaskAlreadyFinished { .. } => ErrorKind::Conflict,
            Self::CloneFailed { .. } | Self::SpawnFailed { .. } => ErrorKind::Process,
        }
    }

    /// Returns true if this error is a cancellation.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}
