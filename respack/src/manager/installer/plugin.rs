//! Plugin repository installer.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{InstallContext, InstallEvents, InstallOutcome};
use crate::manager::error::ManagerResult;
use crate::manager::plugin_host::{CloneOutcome, CloneRequest, PluginHost};
use crate::manager::progress::ResourceState;
use crate::manager::rewrite::HostRewrite;
use crate::pack::{PluginSpec, RepositoryId, Resource, ValidationError};

/// Installs plugins by cloning their repository through a [`PluginHost`].
pub struct PluginInstaller {
    plugins_dir: PathBuf,
    proxy: Option<HostRewrite>,
    host: Arc<dyn PluginHost>,
}

impl PluginInstaller {
    pub fn new(plugins_dir: PathBuf, proxy: Option<HostRewrite>, host: Arc<dyn PluginHost>) -> Self {
        Self {
            plugins_dir,
            proxy,
            host,
        }
    }

    /// URL used for the first clone attempt.
    ///
    /// Routed through the repository proxy when its host matches, otherwise
    /// the declared URL unchanged.
    pub fn clone_url(&self, spec: &PluginSpec, repository: &RepositoryId) -> String {
        self.proxy
            .as_ref()
            .and_then(|proxy| proxy.apply_repository(repository))
            .unwrap_or_else(|| spec.repository.clone())
    }

    pub async fn install(
        &self,
        resource: &Resource,
        spec: &PluginSpec,
        ctx: &InstallContext,
        events: InstallEvents,
        cancel: &CancellationToken,
    ) -> ManagerResult<InstallOutcome> {
        let repository = RepositoryId::parse(&spec.repository).ok_or_else(|| {
            ValidationError::InvalidRepository {
                resource_id: resource.id.clone(),
                repository: spec.repository.clone(),
            }
        })?;

        if cancel.is_cancelled() {
            return Ok(InstallOutcome::Canceled);
        }

        let installed = self.host.installed_plugins().await?;
        if let Some(existing) = installed.iter().find(|p| p.is_checkout_of(&repository)) {
            info!(
                task_id = %ctx.task_id,
                resource = %resource.id,
                path = %existing.path.display(),
                "Plugin already installed"
            );
            return Ok(InstallOutcome::Skipped);
        }

        let target_dir = self.plugins_dir.join(repository.dir_name());
        events.state(ResourceState::Installing, 0);

        let primary = self.clone_url(spec, &repository);
        let first = self
            .clone_once(&primary, spec, &target_dir, ctx, &events, cancel)
            .await;

        let error = match first {
            Ok(outcome) => return Ok(outcome),
            Err(e) if e.is_canceled() => return Ok(InstallOutcome::Canceled),
            Err(e) => e,
        };
        if cancel.is_cancelled() {
            return Ok(InstallOutcome::Canceled);
        }

        let fallback = repository.https_url();
        warn!(
            task_id = %ctx.task_id,
            resource = %resource.id,
            url = %primary,
            retry_url = %fallback,
            error = %error,
            "Plugin clone failed, retrying with normalized URL"
        );
        events.state(ResourceState::Installing, 0);
        self.clone_once(&fallback, spec, &target_dir, ctx, &events, cancel)
            .await
    }

    async fn clone_once(
        &self,
        url: &str,
        spec: &PluginSpec,
        target_dir: &std::path::Path,
        ctx: &InstallContext,
        events: &InstallEvents,
        cancel: &CancellationToken,
    ) -> ManagerResult<InstallOutcome> {
        debug!(task_id = %ctx.task_id, url = %url, "Cloning plugin");
        let request = CloneRequest {
            url: url.to_string(),
            branch: spec.branch.clone(),
            target_dir: target_dir.to_path_buf(),
            operation_id: ctx.task_id.clone(),
        };
        let progress_events = events.clone();
        let on_progress = Box::new(move |percent: u8| {
            progress_events.state(ResourceState::Installing, percent);
        });

        let outcome = self
            .host
            .clone_from_repository(request, on_progress, cancel)
            .await?;
        Ok(match outcome {
            CloneOutcome::Cloned => InstallOutcome::Completed,
            CloneOutcome::Canceled => InstallOutcome::Canceled,
        })
    }
}
