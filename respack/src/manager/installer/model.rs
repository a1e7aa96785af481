//! Model file installer.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::common::{download_to, skip_if_present};
use super::{InstallContext, InstallEvents, InstallOutcome};
use crate::manager::download::HttpDownloader;
use crate::manager::error::ManagerResult;
use crate::manager::rewrite::{rewrite_url, HostRewrite};
use crate::pack::{ModelSpec, Resource, ValidationError};

/// Installs model files under the models directory.
pub struct ModelInstaller {
    models_dir: PathBuf,
    rewrites: Vec<HostRewrite>,
    downloader: Arc<HttpDownloader>,
}

impl ModelInstaller {
    pub fn new(
        models_dir: PathBuf,
        rewrites: Vec<HostRewrite>,
        downloader: Arc<HttpDownloader>,
    ) -> Self {
        Self {
            models_dir,
            rewrites,
            downloader,
        }
    }

    /// Destination of a model declaration.
    pub fn target_path(&self, spec: &ModelSpec) -> PathBuf {
        self.models_dir.join(&spec.dir).join(&spec.filename)
    }

    /// Download URL for a source preference, after host rewrites.
    pub fn resolve_url(&self, spec: &ModelSpec, source: Option<&str>) -> Option<String> {
        spec.resolve_url(source)
            .map(|url| rewrite_url(&self.rewrites, url))
    }

    pub async fn install(
        &self,
        resource: &Resource,
        spec: &ModelSpec,
        ctx: &InstallContext,
        events: InstallEvents,
        cancel: &CancellationToken,
    ) -> ManagerResult<InstallOutcome> {
        let target = self.target_path(spec);
        if skip_if_present(&target).await? {
            info!(
                task_id = %ctx.task_id,
                resource = %resource.id,
                path = %target.display(),
                "Model already installed"
            );
            return Ok(InstallOutcome::Skipped);
        }

        let url = self
            .resolve_url(spec, ctx.source.as_deref())
            .ok_or_else(|| ValidationError::MissingField {
                resource_id: resource.id.clone(),
                field: "urls",
            })?;

        debug!(
            task_id = %ctx.task_id,
            resource = %resource.id,
            url = %url,
            path = %target.display(),
            "Downloading model"
        );
        download_to(&self.downloader, &url, &target, &events, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::ResourceKind;
    use tempfile::TempDir;

    fn installer(dir: &std::path::Path) -> ModelInstaller {
        ModelInstaller::new(
            dir.to_path_buf(),
            vec![HostRewrite::new("huggingface.co", "https://hf-mirror.com")],
            Arc::new(HttpDownloader::new().unwrap()),
        )
    }

    fn spec() -> ModelSpec {
        ModelSpec::new(
            "huggingface",
            "https://huggingface.co/acme/base/resolve/main/base.safetensors",
            "checkpoints",
            "base.safetensors",
        )
        .with_source("mirror", "http://127.0.0.1:9/base.safetensors")
    }

    #[test]
    fn test_target_path() {
        let installer = installer(std::path::Path::new("/models"));
        assert_eq!(
            installer.target_path(&spec()),
            PathBuf::from("/models/checkpoints/base.safetensors")
        );
    }

    #[test]
    fn test_resolve_url_applies_rewrites() {
        let installer = installer(std::path::Path::new("/models"));
        assert_eq!(
            installer.resolve_url(&spec(), None).as_deref(),
            Some("https://hf-mirror.com/acme/base/resolve/main/base.safetensors")
        );
        assert_eq!(
            installer.resolve_url(&spec(), Some("mirror")).as_deref(),
            Some("http://127.0.0.1:9/base.safetensors")
        );
    }

    #[tokio::test]
    async fn test_existing_model_is_skipped_without_network() {
        let temp = TempDir::new().unwrap();
        let installer = installer(temp.path());
        let spec = spec();
        let target = installer.target_path(&spec);
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(&target, vec![1u8; 1024]).unwrap();

        let resource = Resource::new("base", "Base", ResourceKind::Model(spec.clone()));
        let (events, _rx) = InstallEvents::channel();
        let outcome = installer
            .install(
                &resource,
                &spec,
                &InstallContext::default(),
                events,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome, InstallOutcome::Skipped);
        assert_eq!(std::fs::metadata(&target).unwrap().len(), 1024);
    }
}
