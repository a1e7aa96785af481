//! Plugin host abstraction and the git-backed implementation.
//!
//! The plugin installer never runs `git` itself. It asks a [`PluginHost`]
//! which plugins are present and to clone new ones, which keeps the
//! installer testable with an in-memory host.
//!
//! # Design Principles
//!
//! - **Dyn-compatible**: async methods return boxed futures so hosts can be
//!   stored as `Arc<dyn PluginHost>`
//! - **Cancellable**: clones observe a [`CancellationToken`] and clean up
//!   their target directory when aborted or failed

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use ini::Ini;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::manager::error::{ManagerError, ManagerResult};
use crate::pack::RepositoryId;

/// Boxed future used by dyn-compatible async traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Clone progress callback receiving a percentage.
pub type CloneProgress = Box<dyn Fn(u8) + Send + Sync>;

/// A plugin found in the plugins directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPlugin {
    /// Directory name.
    pub name: String,
    /// Directory path.
    pub path: PathBuf,
    /// Origin repository URL, when known.
    pub repository: Option<String>,
}

impl InstalledPlugin {
    /// Whether this plugin is a checkout of `repository`.
    ///
    /// Matches on repository identity, or on a directory named like the
    /// repository.
    pub fn is_checkout_of(&self, repository: &RepositoryId) -> bool {
        let same_origin = self
            .repository
            .as_deref()
            .and_then(RepositoryId::parse)
            .is_some_and(|origin| origin.same_repository(repository));

        same_origin || self.name.eq_ignore_ascii_case(repository.dir_name())
    }
}

/// Parameters of a clone operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneRequest {
    /// URL handed to the clone command.
    pub url: String,
    /// Branch to check out.
    pub branch: Option<String>,
    /// Directory to clone into; must not exist or be empty.
    pub target_dir: PathBuf,
    /// Identifier for log correlation (the task id).
    pub operation_id: String,
}

/// Terminal result of a clone that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneOutcome {
    Cloned,
    Canceled,
}

/// External plugin-management capability.
pub trait PluginHost: Send + Sync {
    /// List plugins currently installed.
    fn installed_plugins(&self) -> BoxFuture<'_, ManagerResult<Vec<InstalledPlugin>>>;

    /// Clone a repository into `request.target_dir`.
    ///
    /// On failure or cancellation the target directory is removed before
    /// returning.
    fn clone_from_repository<'a>(
        &'a self,
        request: CloneRequest,
        on_progress: CloneProgress,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ManagerResult<CloneOutcome>>;
}

/// Plugin host that shells out to `git`.
#[derive(Debug, Clone)]
pub struct GitPluginHost {
    plugins_dir: PathBuf,
    program: String,
}

impl GitPluginHost {
    /// Create a host managing `plugins_dir`.
    pub fn new(plugins_dir: impl Into<PathBuf>) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
            program: "git".to_string(),
        }
    }

    /// Use a different git executable.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Plugins directory.
    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    async fn scan(&self) -> ManagerResult<Vec<InstalledPlugin>> {
        let mut entries = match fs::read_dir(&self.plugins_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ManagerError::ReadFailed {
                    path: self.plugins_dir.clone(),
                    source,
                })
            }
        };

        let mut plugins = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(ManagerError::ReadFailed {
                        path: self.plugins_dir.clone(),
                        source,
                    })
                }
            };

            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !path.is_dir() {
                continue;
            }

            let repository = read_origin_url(&path).await;
            plugins.push(InstalledPlugin {
                name,
                path,
                repository,
            });
        }

        plugins.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(plugins)
    }

    async fn run_clone(
        &self,
        request: CloneRequest,
        on_progress: CloneProgress,
        cancel: &CancellationToken,
    ) -> ManagerResult<CloneOutcome> {
        let target = request.target_dir.as_path();
        if cancel.is_cancelled() {
            return Ok(CloneOutcome::Canceled);
        }
        if !dir_is_absent_or_empty(target).await {
            return Err(ManagerError::CloneFailed {
                url: request.url.clone(),
                reason: format!("{} already exists", target.display()),
            });
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| ManagerError::CreateDirFailed {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let mut command = Command::new(&self.program);
        command.arg("clone").arg("--progress");
        if let Some(branch) = &request.branch {
            command.arg("--branch").arg(branch);
        }
        command
            .arg("--depth")
            .arg("1")
            .arg(&request.url)
            .arg(target)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            operation_id = %request.operation_id,
            url = %request.url,
            target = %target.display(),
            "Cloning plugin repository"
        );

        let mut child = command.spawn().map_err(|source| ManagerError::SpawnFailed {
            program: self.program.clone(),
            source,
        })?;

        let mut stderr = child.stderr.take();
        let mut output = StderrTail::default();
        let mut buf = [0u8; 2048];
        let mut last_percent = None;

        let status = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break None,
                read = read_some(&mut stderr, &mut buf), if stderr.is_some() => match read {
                    Some(n) => {
                        for line in output.push(&buf[..n]) {
                            if let Some(percent) = parse_receiving_percent(&line) {
                                if last_percent != Some(percent) {
                                    last_percent = Some(percent);
                                    on_progress(percent);
                                }
                            }
                        }
                    }
                    None => stderr = None,
                },
                status = child.wait() => break Some(status),
            }
        };

        let status = match status {
            None => {
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "Failed to kill clone process");
                }
                remove_dir_quietly(target).await;
                info!(operation_id = %request.operation_id, url = %request.url, "Clone canceled");
                return Ok(CloneOutcome::Canceled);
            }
            Some(Ok(status)) => status,
            Some(Err(e)) => {
                remove_dir_quietly(target).await;
                return Err(ManagerError::CloneFailed {
                    url: request.url.clone(),
                    reason: e.to_string(),
                });
            }
        };

        if !status.success() {
            if let Some(mut rest) = stderr {
                let mut remaining = Vec::new();
                if rest.read_to_end(&mut remaining).await.is_ok() {
                    output.push(&remaining);
                }
            }
            remove_dir_quietly(target).await;
            let reason = output
                .last_line()
                .unwrap_or_else(|| format!("git exited with {}", status));
            return Err(ManagerError::CloneFailed {
                url: request.url.clone(),
                reason,
            });
        }

        if last_percent != Some(100) {
            on_progress(100);
        }
        Ok(CloneOutcome::Cloned)
    }
}

impl PluginHost for GitPluginHost {
    fn installed_plugins(&self) -> BoxFuture<'_, ManagerResult<Vec<InstalledPlugin>>> {
        Box::pin(self.scan())
    }

    fn clone_from_repository<'a>(
        &'a self,
        request: CloneRequest,
        on_progress: CloneProgress,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ManagerResult<CloneOutcome>> {
        Box::pin(self.run_clone(request, on_progress, cancel))
    }
}

/// Read the `remote "origin"` URL from a checkout's `.git/config`.
async fn read_origin_url(plugin_dir: &Path) -> Option<String> {
    let config_path = plugin_dir.join(".git").join("config");
    let contents = fs::read_to_string(&config_path).await.ok()?;
    match Ini::load_from_str(&contents) {
        Ok(config) => config
            .iter()
            .find(|(name, _)| name.is_some_and(is_origin_section))
            .and_then(|(_, section)| section.get("url"))
            .map(|url| url.trim().to_string()),
        Err(e) => {
            warn!(path = %config_path.display(), error = %e, "Unreadable git config");
            None
        }
    }
}

/// Matches `remote "origin"` with or without the quotes kept by the parser.
fn is_origin_section(name: &str) -> bool {
    let mut words = name.split(|c: char| c.is_whitespace() || c == '"').filter(|w| !w.is_empty());
    matches!((words.next(), words.next(), words.next()), (Some("remote"), Some("origin"), None))
}

async fn read_some(
    stderr: &mut Option<tokio::process::ChildStderr>,
    buf: &mut [u8],
) -> Option<usize> {
    let reader = stderr.as_mut()?;
    match reader.read(buf).await {
        Ok(0) | Err(_) => None,
        Ok(n) => Some(n),
    }
}

async fn dir_is_absent_or_empty(path: &Path) -> bool {
    match fs::read_dir(path).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
        Err(e) => e.kind() == io::ErrorKind::NotFound,
    }
}

async fn remove_dir_quietly(path: &Path) {
    match fs::remove_dir_all(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial clone"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial clone"),
    }
}

/// Extract the percentage from a `Receiving objects: NN% (...)` line.
pub fn parse_receiving_percent(line: &str) -> Option<u8> {
    let rest = line.split("Receiving objects:").nth(1)?;
    let number = rest.split('%').next()?.trim();
    number.parse::<u8>().ok().map(|p| p.min(100))
}

/// Splits git's `\r`/`\n` separated stderr into lines and keeps the last one.
#[derive(Default)]
struct StderrTail {
    pending: String,
    last: Option<String>,
}

impl StderrTail {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(bytes));
        let mut lines = Vec::new();
        while let Some(idx) = self.pending.find(['\r', '\n']) {
            let line: String = self.pending.drain(..=idx).collect();
            let line = line.trim().to_string();
            if !line.is_empty() {
                self.last = Some(line.clone());
                lines.push(line);
            }
        }
        lines
    }

    fn last_line(&self) -> Option<String> {
        let pending = self.pending.trim();
        if pending.is_empty() {
            self.last.clone()
        } else {
            Some(pending.to_string())
        }
    }
}
