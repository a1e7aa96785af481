//! CLI error type.

use respack::manager::ManagerError;
use thiserror::Error;

/// Exit code for a run interrupted by the user.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid or missing configuration.
    #[error("{0}")]
    Config(String),

    /// Library failure.
    #[error(transparent)]
    Manager(#[from] ManagerError),

    /// The async runtime could not be started.
    #[error("failed to start runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// Output could not be encoded.
    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),

    /// The installation finished with failed resources.
    #[error("{failed} of {total} resources failed to install")]
    ResourcesFailed { failed: usize, total: usize },

    /// The background installation task died.
    #[error("installation failed: {0}")]
    TaskFailed(String),

    /// The user interrupted the installation.
    #[error("installation canceled")]
    Canceled,
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Canceled => EXIT_INTERRUPTED,
            _ => 1,
        }
    }
}
