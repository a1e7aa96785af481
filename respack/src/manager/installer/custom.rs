//! Installer for arbitrary files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::common::{download_to, skip_if_present};
use super::{InstallContext, InstallEvents, InstallOutcome};
use crate::manager::download::HttpDownloader;
use crate::manager::error::ManagerResult;
use crate::pack::{CustomSpec, Resource};

/// Installs files at absolute or install-root relative destinations.
pub struct CustomInstaller {
    install_root: PathBuf,
    downloader: Arc<HttpDownloader>,
}

impl CustomInstaller {
    pub fn new(install_root: PathBuf, downloader: Arc<HttpDownloader>) -> Self {
        Self {
            install_root,
            downloader,
        }
    }

    /// Resolve the destination file of a declaration.
    ///
    /// A destination ending in `/` names a directory; the file name is then
    /// the last path segment of the URL, or the resource id when the URL
    /// has none.
    pub fn target_path(&self, resource_id: &str, spec: &CustomSpec) -> PathBuf {
        let destination = spec.destination.as_str();
        let base = if Path::new(destination).is_absolute() {
            PathBuf::from(destination)
        } else {
            self.install_root.join(destination)
        };

        if destination.ends_with('/') || destination.ends_with('\\') {
            base.join(url_file_name(&spec.url).unwrap_or_else(|| resource_id.to_string()))
        } else {
            base
        }
    }

    pub async fn install(
        &self,
        resource: &Resource,
        spec: &CustomSpec,
        ctx: &InstallContext,
        events: InstallEvents,
        cancel: &CancellationToken,
    ) -> ManagerResult<InstallOutcome> {
        let target = self.target_path(&resource.id, spec);
        if skip_if_present(&target).await? {
            info!(
                task_id = %ctx.task_id,
                resource = %resource.id,
                path = %target.display(),
                "File already present"
            );
            return Ok(InstallOutcome::Skipped);
        }

        debug!(
            task_id = %ctx.task_id,
            resource = %resource.id,
            url = %spec.url,
            path = %target.display(),
            "Downloading file"
        );
        download_to(&self.downloader, &spec.url, &target, &events, cancel).await
    }
}

fn url_file_name(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    let segment = parsed.path_segments()?.rev().find(|s| !s.is_empty())?;
    if segment == "." || segment == ".." {
        return None;
    }
    Some(segment.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installer() -> CustomInstaller {
        CustomInstaller::new(
            PathBuf::from("/app"),
            Arc::new(HttpDownloader::new().unwrap()),
        )
    }

    fn spec(url: &str, destination: &str) -> CustomSpec {
        CustomSpec {
            url: url.to_string(),
            destination: destination.to_string(),
        }
    }

    #[test]
    fn test_relative_destination() {
        assert_eq!(
            installer().target_path("x", &spec("https://e.com/a.txt", "input/extra.txt")),
            PathBuf::from("/app/input/extra.txt")
        );
    }

    #[test]
    fn test_absolute_destination() {
        assert_eq!(
            installer().target_path("x", &spec("https://e.com/a.txt", "/data/a.txt")),
            PathBuf::from("/data/a.txt")
        );
    }

    #[test]
    fn test_directory_destination_uses_url_name() {
        assert_eq!(
            installer().target_path("x", &spec("https://e.com/files/lut.cube?v=2", "input/luts/")),
            PathBuf::from("/app/input/luts/lut.cube")
        );
        assert_eq!(
            installer().target_path("fallback", &spec("https://e.com/", "input/")),
            PathBuf::from("/app/input/fallback")
        );
    }
}
