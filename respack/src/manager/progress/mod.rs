//! Installation progress tracking.
//!
//! The [`ProgressManager`] is the only owner of task state. Installers never
//! touch it directly: the orchestrator turns their events into calls here.
//!
//! Overall progress is always the rounded average of the resource progress
//! values (0 for a task without resources), recomputed on every update.

mod manager;
mod types;

pub use manager::{ProgressManager, TaskTicket};
pub use types::{
    average_progress, InstallationTask, ResourceError, ResourceState, ResourceStatus,
    TaskStatus, TaskSummary,
};
