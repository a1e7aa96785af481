//! Resource pack installation orchestrator.
//!
//! Sequences the resources of one pack through their installers on a
//! background task and feeds installer events into the [`ProgressManager`].
//!
//! # State machine
//!
//! ```text
//! PENDING ──► DOWNLOADING ──┬──► COMPLETED   (loop finished, resource errors allowed)
//!                           ├──► CANCELED    (cancel requested)
//!                           └──► ERROR       (background task died)
//! ```
//!
//! A failing resource is recorded as ERROR and the loop moves on; only
//! cancellation stops it early.
//!
//! Runs of the same pack are serialized by a per-pack run lock held until
//! the run has cleaned up and recorded history. A task started right after
//! a cancel stays DOWNLOADING with pending resources until the canceled run
//! has removed its partial files.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::{ManagerError, ManagerResult};
use super::history::{HistoryEntry, HistoryRecorder};
use super::installer::{
    InstallContext, InstallEvents, InstallOutcome, ResourceEvent, ResourceInstallers,
};
use super::progress::{ProgressManager, ResourceState, TaskStatus, TaskTicket};
use crate::pack::{Resource, ResourcePack, ResourceType};

/// Drives installation tasks.
#[derive(Clone)]
pub struct Orchestrator {
    progress: Arc<ProgressManager>,
    installers: Arc<ResourceInstallers>,
    history: Arc<dyn HistoryRecorder>,
    run_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(
        progress: Arc<ProgressManager>,
        installers: Arc<ResourceInstallers>,
        history: Arc<dyn HistoryRecorder>,
    ) -> Self {
        Self {
            progress,
            installers,
            history,
            run_locks: Arc::new(DashMap::new()),
        }
    }

    fn run_lock(&self, pack_id: &str) -> Arc<Mutex<()>> {
        self.run_locks
            .entry(pack_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Progress store shared with callers.
    pub fn progress(&self) -> &Arc<ProgressManager> {
        &self.progress
    }

    /// Start installing `pack`, or return the task already running for it.
    ///
    /// `selection` restricts the run to the given resource ids; resources
    /// still run in pack order. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::EmptySelection`] or
    /// [`ManagerError::UnknownResource`] before any task is created.
    pub fn install(
        &self,
        pack: &ResourcePack,
        selection: Option<&[String]>,
        source: Option<String>,
    ) -> ManagerResult<TaskTicket> {
        let resources = select_resources(pack, selection)?;

        let ticket = self.progress.begin_task(pack, &resources);
        if ticket.existing {
            info!(
                pack = %pack.id,
                task_id = %ticket.task_id,
                "Installation already running, reusing task"
            );
            return Ok(ticket);
        }

        let Some(cancel) = self.progress.cancellation(&ticket.task_id) else {
            return Err(ManagerError::TaskNotFound(ticket.task_id));
        };

        info!(
            pack = %pack.id,
            task_id = %ticket.task_id,
            resources = resources.len(),
            "Starting installation"
        );

        let ctx = InstallContext {
            task_id: ticket.task_id.clone(),
            pack_id: pack.id.clone(),
            source,
        };
        let runner = TaskRunner {
            progress: Arc::clone(&self.progress),
            installers: Arc::clone(&self.installers),
            ctx,
            resources,
            cancel,
        };
        let supervisor = Supervisor {
            progress: Arc::clone(&self.progress),
            history: Arc::clone(&self.history),
            task_id: ticket.task_id.clone(),
        };

        let run_lock = self.run_lock(&pack.id);
        tokio::spawn(async move {
            let _run = match Arc::clone(&run_lock).try_lock_owned() {
                Ok(guard) => guard,
                Err(_) => {
                    debug!(
                        task_id = %supervisor.task_id,
                        "Waiting for the previous run of this pack to clean up"
                    );
                    run_lock.lock_owned().await
                }
            };
            let outcome = tokio::spawn(runner.run()).await;
            supervisor.finish(outcome).await;
        });

        Ok(ticket)
    }
}

/// Resolve the resources to install, in pack order.
pub fn select_resources(
    pack: &ResourcePack,
    selection: Option<&[String]>,
) -> ManagerResult<Vec<Resource>> {
    let Some(selection) = selection else {
        return Ok(pack.resources.clone());
    };
    if selection.is_empty() {
        return Err(ManagerError::EmptySelection(pack.id.clone()));
    }

    let wanted: HashSet<&str> = selection.iter().map(String::as_str).collect();
    if let Some(unknown) = wanted.iter().find(|id| pack.resource(id).is_none()) {
        return Err(ManagerError::UnknownResource {
            pack_id: pack.id.clone(),
            resource_id: unknown.to_string(),
        });
    }

    Ok(pack
        .resources
        .iter()
        .filter(|r| wanted.contains(r.id.as_str()))
        .cloned()
        .collect())
}

struct TaskRunner {
    progress: Arc<ProgressManager>,
    installers: Arc<ResourceInstallers>,
    ctx: InstallContext,
    resources: Vec<Resource>,
    cancel: CancellationToken,
}

impl TaskRunner {
    async fn run(self) {
        let task_id = self.ctx.task_id.as_str();

        for resource in &self.resources {
            if self.cancel.is_cancelled() || self.progress.is_canceled(task_id) {
                self.progress
                    .update_task_status(task_id, TaskStatus::Canceled, None);
                info!(task_id = %task_id, "Installation canceled");
                return;
            }
            self.install_one(resource).await;
        }

        if self.cancel.is_cancelled() {
            self.progress
                .update_task_status(task_id, TaskStatus::Canceled, None);
            info!(task_id = %task_id, "Installation canceled");
            return;
        }

        self.progress
            .update_task_status(task_id, TaskStatus::Completed, None);
        info!(task_id = %task_id, pack = %self.ctx.pack_id, "Installation finished");
    }

    async fn install_one(&self, resource: &Resource) {
        let task_id = self.ctx.task_id.as_str();
        let resource_id = resource.id.as_str();

        let initial = match resource.resource_type() {
            ResourceType::Plugin => ResourceState::Installing,
            ResourceType::Model | ResourceType::Workflow | ResourceType::Custom => {
                ResourceState::Downloading
            }
        };
        self.progress
            .update_resource_status(task_id, resource_id, initial, 0, None);
        debug!(task_id = %task_id, resource = %resource_id, state = %initial, "Resource started");

        let (events, mut rx) = InstallEvents::channel();
        let install = self
            .installers
            .install(resource, &self.ctx, events, &self.cancel);
        let drain = async {
            while let Some(event) = rx.recv().await {
                self.apply_event(resource_id, event);
            }
        };
        let (result, ()) = tokio::join!(install, drain);

        let (state, progress, message) = match result {
            Ok(InstallOutcome::Completed) => (ResourceState::Completed, 100, None),
            Ok(InstallOutcome::Skipped) => (ResourceState::Skipped, 100, None),
            Ok(InstallOutcome::Canceled) => (ResourceState::Canceled, 0, None),
            Err(e) if e.is_canceled() => (ResourceState::Canceled, 0, None),
            Err(e) => {
                warn!(
                    task_id = %task_id,
                    resource = %resource_id,
                    optional = resource.optional,
                    error = %e,
                    "Resource installation failed"
                );
                (ResourceState::Error, 0, Some(e.to_string()))
            }
        };

        self.progress
            .update_resource_status(task_id, resource_id, state, progress, message);
        debug!(task_id = %task_id, resource = %resource_id, state = %state, "Resource finished");
    }

    fn apply_event(&self, resource_id: &str, event: ResourceEvent) {
        let task_id = self.ctx.task_id.as_str();
        match event {
            ResourceEvent::State { state, progress } => {
                self.progress
                    .update_resource_status(task_id, resource_id, state, progress, None);
            }
            ResourceEvent::Transfer {
                percent,
                downloaded_bytes,
                total_bytes,
            } => {
                self.progress.update_transfer(
                    task_id,
                    resource_id,
                    percent,
                    downloaded_bytes,
                    total_bytes,
                );
            }
        }
    }
}

struct Supervisor {
    progress: Arc<ProgressManager>,
    history: Arc<dyn HistoryRecorder>,
    task_id: String,
}

impl Supervisor {
    async fn finish(self, outcome: Result<(), tokio::task::JoinError>) {
        if let Err(e) = outcome {
            error!(task_id = %self.task_id, error = %e, "Installation task died");
            self.progress.update_task_status(
                &self.task_id,
                TaskStatus::Error,
                Some(format!("installation task failed: {}", e)),
            );
        }

        let Some(task) = self.progress.get_progress(&self.task_id) else {
            return;
        };
        if !task.is_terminal() {
            return;
        }

        let entry = HistoryEntry::from_task(&task);
        let history = Arc::clone(&self.history);
        let recorded = tokio::task::spawn_blocking(move || history.record(&entry)).await;
        match recorded {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(task_id = %self.task_id, error = %e, "Failed to record history"),
            Err(e) => warn!(task_id = %self.task_id, error = %e, "History recorder panicked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::{ResourceKind, WorkflowSpec};

    fn pack() -> ResourcePack {
        let workflow = |id: &str| {
            Resource::new(
                id,
                id,
                ResourceKind::Workflow(WorkflowSpec {
                    url: format!("https://example.com/{}.json", id),
                    filename: format!("{}.json", id),
                }),
            )
        };
        ResourcePack::new("p", "P", vec![workflow("a"), workflow("b"), workflow("c")])
    }

    #[test]
    fn test_selection_keeps_pack_order() {
        let selection = vec!["c".to_string(), "a".to_string()];
        let selected = select_resources(&pack(), Some(selection.as_slice())).unwrap();
        let ids: Vec<&str> = selected.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_no_selection_means_everything() {
        assert_eq!(select_resources(&pack(), None).unwrap().len(), 3);
    }

    #[test]
    fn test_empty_selection_rejected() {
        assert!(matches!(
            select_resources(&pack(), Some(&[][..])),
            Err(ManagerError::EmptySelection(_))
        ));
    }

    #[test]
    fn test_unknown_resource_rejected() {
        let selection = vec!["a".to_string(), "zzz".to_string()];
        match select_resources(&pack(), Some(selection.as_slice())) {
            Err(ManagerError::UnknownResource { resource_id, .. }) => assert_eq!(resource_id, "zzz"),
            other => panic!("unexpected: {:?}", other.map(|r| r.len())),
        }
    }
}
