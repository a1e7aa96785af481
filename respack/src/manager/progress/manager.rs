//! Canonical store of installation task state.

use std::time::Duration;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::types::{
    average_progress, InstallationTask, ResourceState, ResourceStatus, TaskStatus,
};
use crate::pack::{Resource, ResourcePack};

/// Result of [`ProgressManager::begin_task`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTicket {
    /// Task tracking the installation.
    pub task_id: String,
    /// True when an already running task was reused.
    pub existing: bool,
}

struct TaskEntry {
    task: InstallationTask,
    cancel: CancellationToken,
}

/// Owns every task record.
///
/// Records live in a [`DashMap`] keyed by task id, so updates to one task
/// never block another. A second map indexes the most recent task of each
/// pack for deduplication. Lock order is always pack index before tasks.
#[derive(Default)]
pub struct ProgressManager {
    tasks: DashMap<String, TaskEntry>,
    pack_index: DashMap<String, String>,
}

impl ProgressManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh task id.
    pub fn new_task_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Create a PENDING record for `resources` of `pack`.
    ///
    /// An existing record with the same id is replaced.
    pub fn create_progress(&self, pack: &ResourcePack, task_id: &str, resources: &[Resource]) {
        let entry = new_entry(pack, task_id, resources, TaskStatus::Pending);
        self.tasks.insert(task_id.to_string(), entry);
        self.pack_index.insert(pack.id.clone(), task_id.to_string());
    }

    /// Reuse the running task of `pack` or start a new one.
    ///
    /// A new task is created directly in DOWNLOADING, so a concurrent call
    /// for the same pack observes it as active and gets the same id back.
    pub fn begin_task(&self, pack: &ResourcePack, resources: &[Resource]) -> TaskTicket {
        match self.pack_index.entry(pack.id.clone()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get().clone();
                if self.has_active_task(&current) {
                    return TaskTicket {
                        task_id: current,
                        existing: true,
                    };
                }
                let task_id = self.insert_started(pack, resources);
                occupied.insert(task_id.clone());
                TaskTicket {
                    task_id,
                    existing: false,
                }
            }
            Entry::Vacant(vacant) => {
                let task_id = self.insert_started(pack, resources);
                vacant.insert(task_id.clone());
                TaskTicket {
                    task_id,
                    existing: false,
                }
            }
        }
    }

    fn insert_started(&self, pack: &ResourcePack, resources: &[Resource]) -> String {
        let task_id = Self::new_task_id();
        let entry = new_entry(pack, &task_id, resources, TaskStatus::Downloading);
        self.tasks.insert(task_id.clone(), entry);
        task_id
    }

    /// Snapshot of a task.
    pub fn get_progress(&self, task_id: &str) -> Option<InstallationTask> {
        self.tasks.get(task_id).map(|entry| entry.task.clone())
    }

    /// All tasks, oldest first.
    pub fn list_tasks(&self) -> Vec<InstallationTask> {
        let mut tasks: Vec<InstallationTask> =
            self.tasks.iter().map(|entry| entry.task.clone()).collect();
        tasks.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        tasks
    }

    /// Running task of a pack, if any.
    pub fn active_task_for_pack(&self, pack_id: &str) -> Option<String> {
        let task_id = self.pack_index.get(pack_id).map(|id| id.clone())?;
        self.has_active_task(&task_id).then_some(task_id)
    }

    /// Cancellation token of a task.
    pub fn cancellation(&self, task_id: &str) -> Option<CancellationToken> {
        self.tasks.get(task_id).map(|entry| entry.cancel.clone())
    }

    /// Set the state of one resource.
    ///
    /// Returns false when the task or resource is unknown, or the task was
    /// canceled. Entering a terminal state records `finished_at`.
    pub fn update_resource_status(
        &self,
        task_id: &str,
        resource_id: &str,
        state: ResourceState,
        progress: u8,
        error: Option<String>,
    ) -> bool {
        let Some(mut entry) = self.tasks.get_mut(task_id) else {
            return false;
        };
        let task = &mut entry.task;
        if task.canceled {
            return false;
        }
        let Some(resource) = task.resource_mut(resource_id) else {
            return false;
        };

        let now = Utc::now();
        if resource.started_at.is_none() && state != ResourceState::Pending {
            resource.started_at = Some(now);
        }
        resource.state = state;
        resource.progress = progress.min(100);
        resource.error = error;
        resource.finished_at = state.is_terminal().then_some(now);

        task.progress = average_progress(task.resources.iter().map(|r| r.progress));
        true
    }

    /// Record transfer counters for one resource.
    ///
    /// Ignored once the resource is terminal or the task was canceled.
    pub fn update_transfer(
        &self,
        task_id: &str,
        resource_id: &str,
        percent: u8,
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
    ) -> bool {
        let Some(mut entry) = self.tasks.get_mut(task_id) else {
            return false;
        };
        let task = &mut entry.task;
        if task.canceled {
            return false;
        }
        let Some(resource) = task.resource_mut(resource_id) else {
            return false;
        };
        if resource.state.is_terminal() {
            return false;
        }

        resource.progress = percent.min(100);
        resource.downloaded_bytes = downloaded_bytes;
        resource.total_bytes = total_bytes;

        task.progress = average_progress(task.resources.iter().map(|r| r.progress));
        true
    }

    /// Set the overall task status.
    ///
    /// A canceled task stays CANCELED, and COMPLETED is refused while any
    /// resource is still running.
    pub fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        error: Option<String>,
    ) -> bool {
        let Some(mut entry) = self.tasks.get_mut(task_id) else {
            return false;
        };
        let task = &mut entry.task;

        if task.canceled && status != TaskStatus::Canceled {
            debug!(task_id = %task_id, requested = %status, "Ignoring status change of canceled task");
            return false;
        }
        if status == TaskStatus::Completed && !task.all_resources_terminal() {
            warn!(task_id = %task_id, "Refusing to complete task with unfinished resources");
            return false;
        }

        task.status = status;
        if error.is_some() {
            task.error = error;
        }
        if status.is_terminal() && task.finished_at.is_none() {
            task.finished_at = Some(Utc::now());
        }
        true
    }

    /// Recompute the overall progress from the resource values.
    pub fn recompute_overall_progress(&self, task_id: &str) -> Option<u8> {
        let mut entry = self.tasks.get_mut(task_id)?;
        let progress = average_progress(entry.task.resources.iter().map(|r| r.progress));
        entry.task.progress = progress;
        Some(progress)
    }

    /// Cancel a task.
    ///
    /// Marks the task and every unfinished resource CANCELED and fires the
    /// task's cancellation token. Returns false when the task is unknown,
    /// already canceled, or already finished.
    pub fn cancel_task(&self, task_id: &str) -> bool {
        let Some(mut entry) = self.tasks.get_mut(task_id) else {
            return false;
        };
        if entry.task.canceled || entry.task.status.is_terminal() {
            return false;
        }

        let now = Utc::now();
        let task = &mut entry.task;
        task.canceled = true;
        task.status = TaskStatus::Canceled;
        task.finished_at = Some(now);
        for resource in task.resources.iter_mut() {
            if !resource.state.is_terminal() {
                resource.state = ResourceState::Canceled;
                resource.finished_at = Some(now);
            }
        }
        task.progress = average_progress(task.resources.iter().map(|r| r.progress));

        entry.cancel.cancel();
        debug!(task_id = %task_id, "Task canceled");
        true
    }

    /// Whether a task was canceled.
    pub fn is_canceled(&self, task_id: &str) -> bool {
        self.tasks
            .get(task_id)
            .map(|entry| entry.task.canceled)
            .unwrap_or(false)
    }

    /// Whether a task is DOWNLOADING or INSTALLING.
    pub fn has_active_task(&self, task_id: &str) -> bool {
        self.tasks
            .get(task_id)
            .map(|entry| entry.task.status.is_active())
            .unwrap_or(false)
    }

    /// Drop terminal tasks that finished more than `retention` ago.
    ///
    /// Returns the number of tasks removed.
    pub fn evict_terminal(&self, retention: Duration) -> usize {
        let cutoff = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention));

        let before = self.tasks.len();
        self.tasks.retain(|_, entry| {
            let task = &entry.task;
            match (task.status.is_terminal(), task.finished_at, cutoff) {
                (true, Some(finished), Some(cutoff)) => finished > cutoff,
                _ => true,
            }
        });
        let removed = before.saturating_sub(self.tasks.len());

        if removed > 0 {
            self.pack_index
                .retain(|_, task_id| self.tasks.contains_key(task_id.as_str()));
            debug!(removed, "Evicted finished tasks");
        }
        removed
    }

    /// Number of tracked tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no tasks are tracked.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

fn new_entry(
    pack: &ResourcePack,
    task_id: &str,
    resources: &[Resource],
    status: TaskStatus,
) -> TaskEntry {
    TaskEntry {
        task: InstallationTask {
            task_id: task_id.to_string(),
            pack_id: pack.id.clone(),
            pack_name: pack.name.clone(),
            status,
            progress: 0,
            resources: resources.iter().map(ResourceStatus::pending).collect(),
            started_at: Utc::now(),
            finished_at: None,
            canceled: false,
            error: None,
        },
        cancel: CancellationToken::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::{ModelSpec, ResourceKind, WorkflowSpec};
    use proptest::prelude::*;

    fn test_pack() -> ResourcePack {
        ResourcePack::new(
            "p1",
            "Pack One",
            vec![
                Resource::new(
                    "a",
                    "Model A",
                    ResourceKind::Model(ModelSpec::new(
                        "default",
                        "https://example.com/a.bin",
                        "checkpoints",
                        "a.bin",
                    )),
                ),
                Resource::new(
                    "b",
                    "Workflow B",
                    ResourceKind::Workflow(WorkflowSpec {
                        url: "https://example.com/b.json".to_string(),
                        filename: "b.json".to_string(),
                    }),
                ),
            ],
        )
    }

    #[test]
    fn test_create_progress_starts_pending() {
        let manager = ProgressManager::new();
        let pack = test_pack();
        manager.create_progress(&pack, "t1", &pack.resources);

        let task = manager.get_progress("t1").unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 0);
        assert_eq!(task.resources.len(), 2);
        assert!(task
            .resources
            .iter()
            .all(|r| r.state == ResourceState::Pending));
        assert!(!manager.has_active_task("t1"));
    }

    #[test]
    fn test_begin_task_dedups_active_pack() {
        let manager = ProgressManager::new();
        let pack = test_pack();

        let first = manager.begin_task(&pack, &pack.resources);
        let second = manager.begin_task(&pack, &pack.resources);

        assert!(!first.existing);
        assert!(second.existing);
        assert_eq!(first.task_id, second.task_id);
        assert_eq!(manager.len(), 1);
        assert_eq!(
            manager.active_task_for_pack("p1"),
            Some(first.task_id.clone())
        );
    }

    #[test]
    fn test_pending_task_is_superseded() {
        let manager = ProgressManager::new();
        let pack = test_pack();
        manager.create_progress(&pack, "stalled", &pack.resources);

        let ticket = manager.begin_task(&pack, &pack.resources);
        assert!(!ticket.existing);
        assert_ne!(ticket.task_id, "stalled");
    }

    #[test]
    fn test_finished_task_is_not_reused() {
        let manager = ProgressManager::new();
        let pack = test_pack();
        let first = manager.begin_task(&pack, &pack.resources);
        for id in ["a", "b"] {
            manager.update_resource_status(&first.task_id, id, ResourceState::Completed, 100, None);
        }
        assert!(manager.update_task_status(&first.task_id, TaskStatus::Completed, None));

        let second = manager.begin_task(&pack, &pack.resources);
        assert!(!second.existing);
        assert_ne!(first.task_id, second.task_id);
    }

    #[test]
    fn test_resource_updates_drive_overall_progress() {
        let manager = ProgressManager::new();
        let pack = test_pack();
        let ticket = manager.begin_task(&pack, &pack.resources);

        manager.update_resource_status(&ticket.task_id, "a", ResourceState::Skipped, 100, None);
        manager.update_transfer(&ticket.task_id, "b", 40, 400, Some(1000));

        let task = manager.get_progress(&ticket.task_id).unwrap();
        assert_eq!(task.progress, 70);
        let b = task.resource("b").unwrap();
        assert_eq!(b.downloaded_bytes, 400);
        assert_eq!(b.total_bytes, Some(1000));
        assert!(task.resource("a").unwrap().finished_at.is_some());
    }

    #[test]
    fn test_completed_refused_with_unfinished_resources() {
        let manager = ProgressManager::new();
        let pack = test_pack();
        let ticket = manager.begin_task(&pack, &pack.resources);
        manager.update_resource_status(&ticket.task_id, "a", ResourceState::Completed, 100, None);

        assert!(!manager.update_task_status(&ticket.task_id, TaskStatus::Completed, None));
        assert_eq!(
            manager.get_progress(&ticket.task_id).unwrap().status,
            TaskStatus::Downloading
        );
    }

    #[test]
    fn test_cancel_marks_unfinished_resources() {
        let manager = ProgressManager::new();
        let pack = test_pack();
        let ticket = manager.begin_task(&pack, &pack.resources);
        let token = manager.cancellation(&ticket.task_id).unwrap();

        manager.update_resource_status(&ticket.task_id, "a", ResourceState::Skipped, 100, None);
        manager.update_resource_status(&ticket.task_id, "b", ResourceState::Downloading, 0, None);

        assert!(manager.cancel_task(&ticket.task_id));
        assert!(token.is_cancelled());
        assert!(manager.is_canceled(&ticket.task_id));

        let task = manager.get_progress(&ticket.task_id).unwrap();
        assert_eq!(task.status, TaskStatus::Canceled);
        assert!(task.finished_at.is_some());
        assert_eq!(task.resource("a").unwrap().state, ResourceState::Skipped);
        assert_eq!(task.resource("b").unwrap().state, ResourceState::Canceled);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let manager = ProgressManager::new();
        let pack = test_pack();
        let ticket = manager.begin_task(&pack, &pack.resources);

        assert!(manager.cancel_task(&ticket.task_id));
        assert!(!manager.cancel_task(&ticket.task_id));
        assert!(!manager.cancel_task("unknown"));
    }

    #[test]
    fn test_canceled_task_is_frozen() {
        let manager = ProgressManager::new();
        let pack = test_pack();
        let ticket = manager.begin_task(&pack, &pack.resources);
        manager.cancel_task(&ticket.task_id);

        assert!(!manager.update_resource_status(
            &ticket.task_id,
            "b",
            ResourceState::Completed,
            100,
            None
        ));
        assert!(!manager.update_transfer(&ticket.task_id, "b", 50, 5, None));
        assert!(!manager.update_task_status(&ticket.task_id, TaskStatus::Completed, None));

        let task = manager.get_progress(&ticket.task_id).unwrap();
        assert_eq!(task.status, TaskStatus::Canceled);
        assert_eq!(task.resource("b").unwrap().state, ResourceState::Canceled);
    }

    #[test]
    fn test_evict_terminal() {
        let manager = ProgressManager::new();
        let pack = test_pack();
        let done = manager.begin_task(&pack, &pack.resources);
        manager.cancel_task(&done.task_id);

        let other = ResourcePack::new("p2", "Pack Two", pack.resources.clone());
        let running = manager.begin_task(&other, &other.resources);

        assert_eq!(manager.evict_terminal(Duration::from_secs(3600)), 0);
        assert_eq!(manager.evict_terminal(Duration::ZERO), 1);
        assert!(manager.get_progress(&done.task_id).is_none());
        assert!(manager.get_progress(&running.task_id).is_some());
        assert_eq!(manager.active_task_for_pack("p2"), Some(running.task_id));
        assert!(manager.active_task_for_pack("p1").is_none());
    }

    #[test]
    fn test_unknown_task_updates() {
        let manager = ProgressManager::new();
        assert!(manager.get_progress("missing").is_none());
        assert!(!manager.update_resource_status("missing", "a", ResourceState::Completed, 100, None));
        assert!(!manager.update_task_status("missing", TaskStatus::Completed, None));
        assert!(manager.recompute_overall_progress("missing").is_none());
        assert!(!manager.is_canceled("missing"));
        assert!(!manager.has_active_task("missing"));
    }

    proptest! {
        #[test]
        fn prop_overall_progress_is_rounded_average(
            values in prop::collection::vec(0u8..=100, 1..12)
        ) {
            let resources: Vec<Resource> = (0..values.len())
                .map(|i| Resource::new(
                    format!("r{}", i),
                    format!("R{}", i),
                    ResourceKind::Workflow(WorkflowSpec {
                        url: "https://example.com/w.json".to_string(),
                        filename: format!("w{}.json", i),
                    }),
                ))
                .collect();
            let pack = ResourcePack::new("prop", "Prop", resources.clone());
            let manager = ProgressManager::new();
            let ticket = manager.begin_task(&pack, &resources);

            for (i, value) in values.iter().enumerate() {
                manager.update_transfer(&ticket.task_id, &format!("r{}", i), *value, 0, None);

                let task = manager.get_progress(&ticket.task_id).unwrap();
                let sum: u32 = task.resources.iter().map(|r| u32::from(r.progress)).sum();
                let expected = (f64::from(sum) / task.resources.len() as f64).round() as u8;
                prop_assert_eq!(task.progress, expected);
            }

            prop_assert_eq!(
                manager.recompute_overall_progress(&ticket.task_id),
                Some(manager.get_progress(&ticket.task_id).unwrap().progress)
            );
        }
    }
}
