//! Resource installers.
//!
//! One installer per [`ResourceKind`] variant turns a declaration into a
//! side effect on disk:
//!
//! | Kind     | Target                                   | Present already |
//! |----------|------------------------------------------|-----------------|
//! | Model    | `models_dir/<dir>/<filename>`            | skipped         |
//! | Plugin   | `plugins_dir/<repository name>`          | skipped         |
//! | Workflow | `workflows_dir/<filename>`               | overwritten     |
//! | Custom   | absolute or install-root relative path   | skipped         |
//!
//! Installers report progress through [`InstallEvents`] and finish with an
//! [`InstallOutcome`]. Failures are returned as errors; partially written
//! output is removed before returning.

mod common;
mod custom;
mod model;
mod plugin;
mod workflow;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::config::ManagerConfig;
use super::download::{DownloadProgress, HttpDownloader};
use super::error::ManagerResult;
use super::plugin_host::PluginHost;
use super::progress::ResourceState;
use crate::pack::{Resource, ResourceKind};

pub use custom::CustomInstaller;
pub use model::ModelInstaller;
pub use plugin::PluginInstaller;
pub use workflow::WorkflowInstaller;

/// Per-task context handed to installers.
#[derive(Debug, Clone, Default)]
pub struct InstallContext {
    /// Task the installation belongs to.
    pub task_id: String,
    /// Pack being installed.
    pub pack_id: String,
    /// Preferred model source name.
    pub source: Option<String>,
}

/// Status report from an installer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceEvent {
    /// The resource moved to a non-terminal state.
    State { state: ResourceState, progress: u8 },
    /// Transfer counters moved.
    Transfer {
        percent: u8,
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
    },
}

/// Sending half of an installer's event stream.
///
/// Sends never fail from the installer's point of view; events sent after
/// the receiver is gone are dropped.
#[derive(Debug, Clone)]
pub struct InstallEvents {
    tx: mpsc::UnboundedSender<ResourceEvent>,
}

impl InstallEvents {
    /// Create a connected sender and receiver.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ResourceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report a state change.
    pub fn state(&self, state: ResourceState, progress: u8) {
        let _ = self.tx.send(ResourceEvent::State { state, progress });
    }

    /// Report transfer progress.
    pub fn transfer(&self, progress: DownloadProgress) {
        let _ = self.tx.send(ResourceEvent::Transfer {
            percent: progress.percent,
            downloaded_bytes: progress.downloaded_bytes,
            total_bytes: progress.total_bytes,
        });
    }
}

/// Terminal result of an installation that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The resource was installed.
    Completed,
    /// The resource was already present; nothing changed.
    Skipped,
    /// The installation was aborted and partial output removed.
    Canceled,
}

/// The four installers behind one dispatch point.
pub struct ResourceInstallers {
    model: ModelInstaller,
    plugin: PluginInstaller,
    workflow: WorkflowInstaller,
    custom: CustomInstaller,
}

impl ResourceInstallers {
    /// Build installers from configuration.
    pub fn new(
        config: &ManagerConfig,
        downloader: Arc<HttpDownloader>,
        plugin_host: Arc<dyn PluginHost>,
    ) -> Self {
        Self {
            model: ModelInstaller::new(
                config.models_dir(),
                config.model_rewrites.clone(),
                Arc::clone(&downloader),
            ),
            plugin: PluginInstaller::new(
                config.plugins_dir(),
                config.repository_proxy.clone(),
                plugin_host,
            ),
            workflow: WorkflowInstaller::new(config.workflows_dir(), Arc::clone(&downloader)),
            custom: CustomInstaller::new(config.install_root.clone(), downloader),
        }
    }

    /// Install one resource with the installer matching its kind.
    pub async fn install(
        &self,
        resource: &Resource,
        ctx: &InstallContext,
        events: InstallEvents,
        cancel: &CancellationToken,
    ) -> ManagerResult<InstallOutcome> {
        match &resource.kind {
            ResourceKind::Model(spec) => self.model.install(resource, spec, ctx, events, cancel).await,
            ResourceKind::Plugin(spec) => {
                self.plugin.install(resource, spec, ctx, events, cancel).await
            }
            ResourceKind::Workflow(spec) => {
                self.workflow.install(resource, spec, ctx, events, cancel).await
            }
            ResourceKind::Custom(spec) => {
                self.custom.install(resource, spec, ctx, events, cancel).await
            }
        }
    }
}
