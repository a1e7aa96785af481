//! Workflow file installer.
//!
//! Workflows are expected to change between pack versions, so an existing
//! file is always replaced.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::common::download_to;
use super::{InstallContext, InstallEvents, InstallOutcome};
use crate::manager::download::HttpDownloader;
use crate::manager::error::ManagerResult;
use crate::pack::{Resource, WorkflowSpec};

/// Installs workflow files into the workflows directory.
pub struct WorkflowInstaller {
    workflows_dir: PathBuf,
    downloader: Arc<HttpDownloader>,
}

impl WorkflowInstaller {
    pub fn new(workflows_dir: PathBuf, downloader: Arc<HttpDownloader>) -> Self {
        Self {
            workflows_dir,
            downloader,
        }
    }

    /// Destination of a workflow declaration.
    pub fn target_path(&self, spec: &WorkflowSpec) -> PathBuf {
        self.workflows_dir.join(&spec.filename)
    }

    pub async fn install(
        &self,
        resource: &Resource,
        spec: &WorkflowSpec,
        ctx: &InstallContext,
        events: InstallEvents,
        cancel: &CancellationToken,
    ) -> ManagerResult<InstallOutcome> {
        let target = self.target_path(spec);
        debug!(
            task_id = %ctx.task_id,
            resource = %resource.id,
            url = %spec.url,
            path = %target.display(),
            "Downloading workflow"
        );
        // The download lands in a .part file first; the old workflow stays
        // intact until the rename.
        download_to(&self.downloader, &spec.url, &target, &events, cancel).await
    }
}
