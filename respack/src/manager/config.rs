//! Configuration for the Pack Manager.

use std::path::PathBuf;
use std::time::Duration;

use super::rewrite::HostRewrite;

/// Default HTTP connect and idle read timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default minimum interval between transfer progress reports.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Default time a finished task stays queryable.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Default period of the background eviction loop.
pub const DEFAULT_EVICTION_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of history entries kept.
pub const DEFAULT_HISTORY_LIMIT: usize = 200;

/// Configuration for the Pack Manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Root of the downstream application installation.
    ///
    /// Relative custom destinations and the default resource directories
    /// are resolved against this path.
    pub install_root: PathBuf,

    /// Models directory override.
    pub models_dir: Option<PathBuf>,

    /// Plugins directory override.
    pub plugins_dir: Option<PathBuf>,

    /// Workflows directory override.
    pub workflows_dir: Option<PathBuf>,

    /// Host rewrites applied to model download URLs.
    ///
    /// The first rule whose host matches wins.
    pub model_rewrites: Vec<HostRewrite>,

    /// Proxy for plugin repository hosts.
    pub repository_proxy: Option<HostRewrite>,

    /// HTTP connect timeout, and the longest a transfer may go without
    /// receiving data.
    pub timeout: Duration,

    /// Minimum interval between transfer progress reports.
    pub progress_interval: Duration,

    /// How long terminal tasks stay queryable.
    pub retention: Duration,

    /// Period of the background eviction loop.
    pub eviction_interval: Duration,

    /// JSON-lines file receiving finished task summaries.
    ///
    /// History is kept in memory when unset.
    pub history_path: Option<PathBuf>,

    /// Maximum number of history entries kept.
    pub history_limit: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            install_root: PathBuf::from("."),
            models_dir: None,
            plugins_dir: None,
            workflows_dir: None,
            model_rewrites: Vec::new(),
            repository_proxy: None,
            timeout: DEFAULT_TIMEOUT,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            retention: DEFAULT_RETENTION,
            eviction_interval: DEFAULT_EVICTION_INTERVAL,
            history_path: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl ManagerConfig {
    /// Create a new configuration rooted at the given install directory.
    pub fn new(install_root: impl Into<PathBuf>) -> Self {
        Self {
            install_root: install_root.into(),
            ..Default::default()
        }
    }

    /// Directory receiving model files (`<root>/models` by default).
    pub fn models_dir(&self) -> PathBuf {
        self.models_dir
            .clone()
            .unwrap_or_else(|| self.install_root.join("models"))
    }

    /// Directory receiving plugin clones (`<root>/custom_nodes` by default).
    pub fn plugins_dir(&self) -> PathBuf {
        self.plugins_dir
            .clone()
            .unwrap_or_else(|| self.install_root.join("custom_nodes"))
    }

    /// Directory receiving workflow files (`<root>/user/default/workflows` by default).
    pub fn workflows_dir(&self) -> PathBuf {
        self.workflows_dir
            .clone()
            .unwrap_or_else(|| self.install_root.join("user").join("default").join("workflows"))
    }

    /// Set the models directory.
    pub fn with_models_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.models_dir = Some(path.into());
        self
    }

    /// Set the plugins directory.
    pub fn with_plugins_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.plugins_dir = Some(path.into());
        self
    }

    /// Set the workflows directory.
    pub fn with_workflows_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.workflows_dir = Some(path.into());
        self
    }

    /// Add a model host rewrite.
    pub fn with_model_rewrite(mut self, rewrite: HostRewrite) -> Self {
        self.model_rewrites.push(rewrite);
        self
    }

    /// Set the repository proxy.
    pub fn with_repository_proxy(mut self, proxy: HostRewrite) -> Self {
        self.repository_proxy = Some(proxy);
        self
    }

    /// Set the HTTP connect and idle read timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the progress report interval.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Set the terminal task retention window.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Set the eviction loop period.
    pub fn with_eviction_interval(mut self, interval: Duration) -> Self {
        self.eviction_interval = interval;
        self
    }

    /// Persist history to a JSON-lines file.
    pub fn with_history_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.history_path = Some(path.into());
        self
    }

    /// Set the number of history entries kept.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }
}
