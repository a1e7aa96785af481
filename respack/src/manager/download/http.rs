//! Streaming HTTP downloader.
//!
//! Transfers are written to a sibling `<dest>.part` file and renamed onto
//! the destination only after the last byte arrived, so the destination
//! never holds a partial transfer.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::progress::{DownloadProgress, ProgressThrottle};
use crate::manager::config::{ManagerConfig, DEFAULT_PROGRESS_INTERVAL, DEFAULT_TIMEOUT};
use crate::manager::error::{ManagerError, ManagerResult};

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("respack/", env!("CARGO_PKG_VERSION"));

/// Terminal result of a transfer that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The destination holds the complete file.
    Completed { bytes: u64 },
    /// The transfer was aborted and the partial file removed.
    Canceled,
}

/// HTTP downloader sharing one connection pool.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
    timeout: Duration,
    progress_interval: Duration,
}

impl HttpDownloader {
    /// Create a downloader with the default timeout and report interval.
    pub fn new() -> ManagerResult<Self> {
        Self::with_settings(DEFAULT_TIMEOUT, DEFAULT_PROGRESS_INTERVAL)
    }

    /// Create a downloader from manager configuration.
    pub fn from_config(config: &ManagerConfig) -> ManagerResult<Self> {
        Self::with_settings(config.timeout, config.progress_interval)
    }

    /// Create a downloader with explicit settings.
    ///
    /// `timeout` bounds connecting and each individual read. A transfer that
    /// keeps receiving data is never cut off, however long it runs.
    pub fn with_settings(timeout: Duration, progress_interval: Duration) -> ManagerResult<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ManagerError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            timeout,
            progress_interval,
        })
    }

    /// Configured connect and idle read timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Download `url` to `dest`.
    ///
    /// `on_progress` receives rate-limited snapshots and always a final
    /// 100% snapshot on success. Cancellation is checked before the request
    /// and raced against every chunk read; a canceled transfer leaves no
    /// file behind and returns [`DownloadOutcome::Canceled`].
    ///
    /// # Errors
    ///
    /// Non-success status, transport failures and timeouts are reported as
    /// network errors. A transfer that produced no bytes fails with
    /// [`ManagerError::ZeroByteResult`] and leaves no file behind.
    pub async fn download<F>(
        &self,
        url: &str,
        dest: &Path,
        mut on_progress: F,
        cancel: &CancellationToken,
    ) -> ManagerResult<DownloadOutcome>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        if cancel.is_cancelled() {
            return Ok(DownloadOutcome::Canceled);
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| ManagerError::CreateDirFailed {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        debug!(url = %url, dest = %dest.display(), "Starting download");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(DownloadOutcome::Canceled),
            response = self.client.get(url).send() => {
                response.map_err(|e| self.transport_error(url, e))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ManagerError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let part = part_path(dest);
        let streamed = self
            .stream_to_part(url, response, &part, &mut on_progress, cancel)
            .await;

        let bytes = match streamed {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                remove_partial(&part).await;
                debug!(url = %url, "Download canceled");
                return Ok(DownloadOutcome::Canceled);
            }
            Err(e) => {
                remove_partial(&part).await;
                return Err(e);
            }
        };

        if bytes == 0 {
            remove_partial(&part).await;
            return Err(ManagerError::ZeroByteResult {
                url: url.to_string(),
                path: dest.to_path_buf(),
            });
        }

        if let Err(source) = fs::rename(&part, dest).await {
            remove_partial(&part).await;
            return Err(ManagerError::WriteFailed {
                path: dest.to_path_buf(),
                source,
            });
        }

        on_progress(DownloadProgress::finished(bytes));
        debug!(url = %url, bytes, "Download complete");
        Ok(DownloadOutcome::Completed { bytes })
    }

    /// Stream the body into `part`. Returns `None` when canceled.
    async fn stream_to_part<F>(
        &self,
        url: &str,
        response: reqwest::Response,
        part: &Path,
        on_progress: &mut F,
        cancel: &CancellationToken,
    ) -> ManagerResult<Option<u64>>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let write_err = |source: io::Error| ManagerError::WriteFailed {
            path: part.to_path_buf(),
            source,
        };

        let total = response.content_length();
        let mut file = fs::File::create(part).await.map_err(write_err)?;
        let mut stream = response.bytes_stream();
        let mut throttle = ProgressThrottle::new(self.progress_interval);
        let mut downloaded: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                next = stream.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(|e| self.transport_error(url, e))?;

            file.write_all(&chunk).await.map_err(write_err)?;
            downloaded += chunk.len() as u64;

            let progress = DownloadProgress::new(downloaded, total);
            if throttle.should_emit(progress) {
                trace!(url = %url, downloaded, percent = progress.percent, "Download progress");
                on_progress(progress);
            }
        }

        file.flush().await.map_err(write_err)?;
        Ok(Some(downloaded))
    }

    fn transport_error(&self, url: &str, error: reqwest::Error) -> ManagerError {
        if error.is_timeout() {
            ManagerError::Timeout {
                url: url.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            ManagerError::DownloadFailed {
                url: url.to_string(),
                reason: error.to_string(),
            }
        }
    }
}

/// Path of the in-progress file for `dest`.
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name: OsString = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

async fn remove_partial(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => debug!(path = %path.display(), error = %e, "Failed to remove partial download"),
    }
}
