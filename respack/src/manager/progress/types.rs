//! Task and resource status records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pack::{Resource, ResourceType};

/// Overall status of an installation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Downloading,
    Installing,
    Completed,
    Error,
    Canceled,
}

impl TaskStatus {
    /// Whether the resource loop is running.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Downloading | Self::Installing)
    }

    /// Whether the task has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Canceled)
    }

    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Downloading => "DOWNLOADING",
            Self::Installing => "INSTALLING",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
            Self::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a single resource within a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceState {
    Pending,
    Downloading,
    Installing,
    Completed,
    Error,
    Skipped,
    Canceled,
}

impl ResourceState {
    /// Whether the resource has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Error | Self::Skipped | Self::Canceled
        )
    }

    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Downloading => "DOWNLOADING",
            Self::Installing => "INSTALLING",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
            Self::Skipped => "SKIPPED",
            Self::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub resource_id: String,
    pub resource_name: String,
    pub resource_type: ResourceType,
    pub optional: bool,
    pub state: ResourceState,
    /// Completion percentage, 0..=100.
    pub progress: u8,
    pub downloaded_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ResourceStatus {
    /// Fresh status for a resource that has not started.
    pub fn pending(resource: &Resource) -> Self {
        Self {
            resource_id: resource.id.clone(),
            resource_name: resource.name.clone(),
            resource_type: resource.resource_type(),
            optional: resource.optional,
            state: ResourceState::Pending,
            progress: 0,
            downloaded_bytes: 0,
            total_bytes: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// One attempt to install a pack or a subset of its resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallationTask {
    pub task_id: String,
    pub pack_id: String,
    pub pack_name: String,
    pub status: TaskStatus,
    /// Rounded average of the resource progress values.
    pub progress: u8,
    pub resources: Vec<ResourceStatus>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub canceled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InstallationTask {
    /// Look up a resource status by id.
    pub fn resource(&self, resource_id: &str) -> Option<&ResourceStatus> {
        self.resources.iter().find(|r| r.resource_id == resource_id)
    }

    pub(crate) fn resource_mut(&mut self, resource_id: &str) -> Option<&mut ResourceStatus> {
        self.resources
            .iter_mut()
            .find(|r| r.resource_id == resource_id)
    }

    /// Whether the task has finished.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether every resource has finished.
    pub fn all_resources_terminal(&self) -> bool {
        self.resources.iter().all(|r| r.state.is_terminal())
    }

    /// Count outcomes and collect resource errors.
    pub fn summary(&self) -> TaskSummary {
        let mut summary = TaskSummary::default();
        for resource in &self.resources {
            match resource.state {
                ResourceState::Completed => summary.completed += 1,
                ResourceState::Skipped => summary.skipped += 1,
                ResourceState::Canceled => summary.canceled += 1,
                ResourceState::Error => {
                    summary.failed += 1;
                    summary.errors.push(ResourceError {
                        resource_id: resource.resource_id.clone(),
                        message: resource.error.clone().unwrap_or_default(),
                    });
                }
                ResourceState::Pending
                | ResourceState::Downloading
                | ResourceState::Installing => summary.pending += 1,
            }
        }
        summary
    }
}

/// Rounded average of resource progress values, 0 for an empty list.
pub fn average_progress<I>(values: I) -> u8
where
    I: IntoIterator<Item = u8>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0u64, 0u64), |(sum, count), v| (sum + u64::from(v.min(100)), count + 1));
    if count == 0 {
        return 0;
    }
    ((sum as f64 / count as f64).round() as u64).min(100) as u8
}

/// Error message recorded for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceError {
    pub resource_id: String,
    pub message: String,
}

/// Outcome counts for a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub canceled: usize,
    /// Resources that never reached a terminal state.
    pub pending: usize,
    pub errors: Vec<ResourceError>,
}

impl TaskSummary {
    /// Whether any resource failed.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::{ResourceKind, WorkflowSpec};

    fn resource(id: &str) -> Resource {
        Resource::new(
            id,
            id.to_uppercase(),
            ResourceKind::Workflow(WorkflowSpec {
                url: "https://example.com/w.json".to_string(),
                filename: "w.json".to_string(),
            }),
        )
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Downloading).unwrap(),
            "\"DOWNLOADING\""
        );
        assert_eq!(
            serde_json::to_string(&ResourceState::Skipped).unwrap(),
            "\"SKIPPED\""
        );
        assert_eq!(TaskStatus::Canceled.to_string(), "CANCELED");
    }

    #[test]
    fn test_pending_is_not_active() {
        assert!(!TaskStatus::Pending.is_active());
        assert!(TaskStatus::Downloading.is_active());
        assert!(TaskStatus::Installing.is_active());
        assert!(!TaskStatus::Completed.is_active());
    }

    #[test]
    fn test_average_progress() {
        assert_eq!(average_progress(Vec::new()), 0);
        assert_eq!(average_progress([100, 0]), 50);
        assert_eq!(average_progress([100, 0, 0]), 33);
        assert_eq!(average_progress([100, 100, 1]), 67);
        assert_eq!(average_progress([255]), 100);
    }

    #[test]
    fn test_summary_counts() {
        let mut statuses: Vec<ResourceStatus> =
            ["a", "b", "c", "d", "e"].iter().map(|id| ResourceStatus::pending(&resource(id))).collect();
        statuses[0].state = ResourceState::Completed;
        statuses[1].state = ResourceState::Skipped;
        statuses[2].state = ResourceState::Error;
        statuses[2].error = Some("boom".to_string());
        statuses[3].state = ResourceState::Canceled;

        let task = InstallationTask {
            task_id: "t".to_string(),
            pack_id: "p".to_string(),
            pack_name: "P".to_string(),
            status: TaskStatus::Canceled,
            progress: 0,
            resources: statuses,
            started_at: Utc::now(),
            finished_at: None,
            canceled: true,
            error: None,
        };

        let summary = task.summary();
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.canceled, 1);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.errors[0].message, "boom");
        assert!(!task.all_resources_terminal());
    }
}
