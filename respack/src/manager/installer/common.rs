//! Helpers shared by the file-based installers.

use std::io;
use std::path::Path;

use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{InstallEvents, InstallOutcome};
use crate::manager::download::{DownloadOutcome, HttpDownloader};
use crate::manager::error::{ManagerError, ManagerResult};

/// Presence of a target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Presence {
    /// Nothing at the path.
    Missing,
    /// A zero-byte leftover.
    Empty,
    /// A file with content.
    Present(u64),
}

/// Inspect `path`.
pub(crate) async fn presence(path: &Path) -> ManagerResult<Presence> {
    match fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Ok(Presence::Present(meta.len())),
        Ok(_) => Ok(Presence::Empty),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Presence::Missing),
        Err(source) => Err(ManagerError::ReadFailed {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Remove a file, treating a missing file as success.
pub(crate) async fn remove_file(path: &Path) -> ManagerResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ManagerError::RemoveFailed {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Ensure the parent directory of `path` exists.
pub(crate) async fn ensure_parent(path: &Path) -> ManagerResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|source| ManagerError::CreateDirFailed {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    Ok(())
}

/// Skip when a non-empty file exists; clear a zero-byte leftover.
///
/// Returns `true` when the resource should be skipped.
pub(crate) async fn skip_if_present(path: &Path) -> ManagerResult<bool> {
    match presence(path).await? {
        Presence::Present(size) => {
            debug!(path = %path.display(), size, "Already present");
            Ok(true)
        }
        Presence::Empty => {
            debug!(path = %path.display(), "Removing empty leftover");
            remove_file(path).await?;
            Ok(false)
        }
        Presence::Missing => Ok(false),
    }
}

/// Download `url` to `dest`, forwarding progress to `events`.
pub(crate) async fn download_to(
    downloader: &HttpDownloader,
    url: &str,
    dest: &Path,
    events: &InstallEvents,
    cancel: &CancellationToken,
) -> ManagerResult<InstallOutcome> {
    ensure_parent(dest).await?;
    let outcome = downloader
        .download(url, dest, |progress| events.transfer(progress), cancel)
        .await?;

    Ok(match outcome {
        DownloadOutcome::Completed { .. } => InstallOutcome::Completed,
        DownloadOutcome::Canceled => InstallOutcome::Canceled,
    })
}
