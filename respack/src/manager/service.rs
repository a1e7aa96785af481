//! Boundary operations for pack installation.
//!
//! [`PackService`] ties the catalog, orchestrator, progress store and
//! history together behind the operations a routing layer or the CLI calls.
//! All request and response types serialize to JSON.
//!
//! # Example
//!
//! ```ignore
//! let catalog = Arc::new(PackCatalog::new("/etc/respack/packs"));
//! catalog.load()?;
//!
//! let service = PackService::new(ManagerConfig::new("/opt/app"), catalog)?;
//! let ticket = service.install("sdxl-starter", None, None)?;
//!
//! let task = service.get_progress(&ticket.task_id)?;
//! println!("{}: {}%", task.status, task.progress);
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::ManagerConfig;
use super::download::HttpDownloader;
use super::error::{ManagerError, ManagerResult};
use super::history::{HistoryEntry, HistoryRecorder, JsonlHistory, MemoryHistory};
use super::installer::ResourceInstallers;
use super::orchestrator::Orchestrator;
use super::plugin_host::{GitPluginHost, PluginHost};
use super::progress::{InstallationTask, ProgressManager, TaskTicket};
use crate::pack::{PackCatalog, ResourcePack};

/// Response to an install request.
pub type InstallTicket = TaskTicket;

/// Install request as received from a routing layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRequest {
    pub pack_id: String,
    /// Resource ids to install; every resource when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<String>>,
    /// Preferred model source name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Response to a cancel request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResponse {
    pub success: bool,
    pub message: String,
}

/// Pack installation service.
pub struct PackService {
    config: ManagerConfig,
    catalog: Arc<PackCatalog>,
    progress: Arc<ProgressManager>,
    orchestrator: Orchestrator,
    history: Arc<dyn HistoryRecorder>,
}

impl PackService {
    /// Create a service with the git plugin host and the configured history.
    pub fn new(config: ManagerConfig, catalog: Arc<PackCatalog>) -> ManagerResult<Self> {
        let host: Arc<dyn PluginHost> = Arc::new(GitPluginHost::new(config.plugins_dir()));
        let history: Arc<dyn HistoryRecorder> = match &config.history_path {
            Some(path) => Arc::new(JsonlHistory::new(path, config.history_limit)),
            None => Arc::new(MemoryHistory::new(config.history_limit)),
        };
        Self::with_components(config, catalog, host, history)
    }

    /// Create a service with explicit plugin host and history.
    pub fn with_components(
        config: ManagerConfig,
        catalog: Arc<PackCatalog>,
        plugin_host: Arc<dyn PluginHost>,
        history: Arc<dyn HistoryRecorder>,
    ) -> ManagerResult<Self> {
        let downloader = Arc::new(HttpDownloader::from_config(&config)?);
        let installers = Arc::new(ResourceInstallers::new(&config, downloader, plugin_host));
        let progress = Arc::new(ProgressManager::new());
        let orchestrator =
            Orchestrator::new(Arc::clone(&progress), installers, Arc::clone(&history));

        Ok(Self {
            config,
            catalog,
            progress,
            orchestrator,
            history,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Shared progress store.
    pub fn progress(&self) -> &Arc<ProgressManager> {
        &self.progress
    }

    /// All catalog packs.
    ///
    /// Serves the cached catalog; see [`PackService::spawn_catalog_refresh_loop`].
    pub fn list_packs(&self) -> Vec<ResourcePack> {
        self.catalog.list()
    }

    /// One catalog pack.
    pub fn get_pack(&self, pack_id: &str) -> ManagerResult<ResourcePack> {
        self.catalog
            .get(pack_id)
            .ok_or_else(|| ManagerError::PackNotFound(pack_id.to_string()))
    }

    /// Start installing a pack.
    ///
    /// Returns the running task when the pack is already being installed.
    /// Must be called from within a Tokio runtime.
    pub fn install(
        &self,
        pack_id: &str,
        resources: Option<&[String]>,
        source: Option<&str>,
    ) -> ManagerResult<InstallTicket> {
        let pack = self.get_pack(pack_id)?;
        self.orchestrator
            .install(&pack, resources, source.map(str::to_string))
    }

    /// Start installing from a request body.
    pub fn install_request(&self, request: &InstallRequest) -> ManagerResult<InstallTicket> {
        self.install(
            &request.pack_id,
            request.resources.as_deref(),
            request.source.as_deref(),
        )
    }

    /// Current state of a task.
    pub fn get_progress(&self, task_id: &str) -> ManagerResult<InstallationTask> {
        self.progress
            .get_progress(task_id)
            .ok_or_else(|| ManagerError::TaskNotFound(task_id.to_string()))
    }

    /// Cancel a running task.
    ///
    /// # Errors
    ///
    /// [`ManagerError::TaskNotFound`] for unknown ids and
    /// [`ManagerError::TaskAlreadyFinished`] when the task already ended,
    /// including a second cancel of the same task.
    pub fn cancel(&self, task_id: &str) -> ManagerResult<CancelResponse> {
        if self.progress.cancel_task(task_id) {
            info!(task_id = %task_id, "Cancellation requested");
            return Ok(CancelResponse {
                success: true,
                message: format!("task {} canceled", task_id),
            });
        }

        let task = self.get_progress(task_id)?;
        Err(ManagerError::TaskAlreadyFinished {
            task_id: task_id.to_string(),
            status: task.status.to_string(),
        })
    }

    /// All tracked tasks, oldest first.
    pub fn list_tasks(&self) -> Vec<InstallationTask> {
        self.progress.list_tasks()
    }

    /// Most recent finished tasks, newest first.
    pub fn recent_history(&self, limit: usize) -> ManagerResult<Vec<HistoryEntry>> {
        self.history.recent(limit)
    }

    /// Drop finished tasks older than the retention window.
    pub fn evict_terminal(&self) -> usize {
        self.progress.evict_terminal(self.config.retention)
    }

    /// Run eviction periodically until `shutdown` fires.
    pub fn spawn_eviction_loop(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let progress = Arc::clone(&self.progress);
        let retention = self.config.retention;
        let period = self.config.eviction_interval.max(Duration::from_millis(10));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Eviction loop stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        progress.evict_terminal(retention);
                    }
                }
            }
        })
    }

    /// Reload the catalog in the background whenever it goes stale, until
    /// `shutdown` fires.
    ///
    /// Directory scans run on the blocking pool; a failed reload keeps the
    /// previous packs.
    pub fn spawn_catalog_refresh_loop(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let catalog = Arc::clone(&self.catalog);
        let period = catalog.refresh_interval().max(Duration::from_millis(10));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Catalog refresh loop stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let catalog = Arc::clone(&catalog);
                        match tokio::task::spawn_blocking(move || catalog.refresh_if_stale()).await {
                            Ok(Ok(Some(report))) => {
                                debug!(packs = report.loaded, "Catalog refreshed");
                            }
                            Ok(Ok(None)) => {}
                            Ok(Err(e)) => warn!(error = %e, "Catalog refresh failed, serving cached packs"),
                            Err(e) => warn!(error = %e, "Catalog refresh task panicked"),
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::history::NoopHistory;
    use crate::pack::{ModelSpec, Resource, ResourceKind};
    use tempfile::TempDir;

    fn service(root: &std::path::Path) -> PackService {
        let pack = ResourcePack::new(
            "starter",
            "Starter",
            vec![Resource::new(
                "base",
                "Base",
                ResourceKind::Model(ModelSpec::new(
                    "default",
                    "http://127.0.0.1:9/base.bin",
                    "checkpoints",
                    "base.bin",
                )),
            )],
        );
        let catalog = Arc::new(PackCatalog::from_packs(vec![pack]).unwrap());
        PackService::with_components(
            ManagerConfig::new(root).with_retention(Duration::ZERO),
            catalog,
            Arc::new(GitPluginHost::new(root.join("custom_nodes"))),
            Arc::new(NoopHistory),
        )
        .unwrap()
    }

    #[test]
    fn test_unknown_pack() {
        let temp = TempDir::new().unwrap();
        let service = service(temp.path());
        assert!(matches!(
            service.get_pack("missing"),
            Err(ManagerError::PackNotFound(_))
        ));
        assert!(matches!(
            service.install("missing", None, None),
            Err(ManagerError::PackNotFound(_))
        ));
        assert!(service.list_tasks().is_empty());
    }

    #[test]
    fn test_unknown_task() {
        let temp = TempDir::new().unwrap();
        let service = service(temp.path());
        assert!(matches!(
            service.get_progress("nope"),
            Err(ManagerError::TaskNotFound(_))
        ));
        assert!(matches!(
            service.cancel("nope"),
            Err(ManagerError::TaskNotFound(_))
        ));
    }

    #[test]
    fn test_install_request_shape() {
        let request: InstallRequest =
            serde_json::from_str(r#"{"pack_id": "starter", "resources": ["base"]}"#).unwrap();
        assert_eq!(request.resources.as_deref(), Some(&["base".to_string()][..]));
        assert!(request.source.is_none());
    }

    #[tokio::test]
    async fn test_eviction_loop_stops_on_shutdown() {
        let temp = TempDir::new().unwrap();
        let service = service(temp.path());
        let shutdown = CancellationToken::new();
        let handle = service.spawn_eviction_loop(shutdown.clone());
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    fn write_pack_file(dir: &std::path::Path, id: &str) {
        let body = format!(
            r#"{{"id": "{id}", "name": "{id}", "resources": [
                {{"id": "flow", "name": "Flow", "type": "workflow",
                  "url": "https://example.com/flow.json", "filename": "flow.json"}}
            ]}}"#
        );
        std::fs::write(dir.join(format!("{}.json", id)), body).unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_catalog_refreshed_in_background_not_on_requests() {
        let temp = TempDir::new().unwrap();
        let packs = temp.path().join("packs");
        std::fs::create_dir_all(&packs).unwrap();
        write_pack_file(&packs, "first");

        let catalog = PackCatalog::new(&packs).with_refresh_interval(Duration::from_millis(20));
        catalog.load().unwrap();
        let service =
            PackService::new(ManagerConfig::new(temp.path().join("app")), Arc::new(catalog))
                .unwrap();

        write_pack_file(&packs, "second");
        tokio::time::sleep(Duration::from_millis(60)).await;

        // Lookups serve the cached catalog even once it is stale.
        assert_eq!(service.list_packs().len(), 1);
        assert!(matches!(
            service.get_pack("second"),
            Err(ManagerError::PackNotFound(_))
        ));

        let shutdown = CancellationToken::new();
        let handle = service.spawn_catalog_refresh_loop(shutdown.clone());

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while service.list_packs().len() < 2 {
            assert!(std::time::Instant::now() < deadline, "catalog never refreshed");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(service.get_pack("second").unwrap().id, "second");

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
