//! Configuration file support.
//!
//! Settings live in an INI file, by default at
//! `~/.config/respack/config.ini`:
//!
//! ```ini
//! [paths]
//! install_root = ~/ComfyUI
//! catalog_dir = ~/.config/respack/packs
//!
//! [mirrors]
//! huggingface.co = https://hf-mirror.com
//!
//! [repository]
//! proxy_host = github.com
//! proxy_endpoint = https://gh.proxy.example
//!
//! [network]
//! timeout_secs = 300
//! progress_interval_ms = 250
//!
//! [tasks]
//! retention_secs = 3600
//! eviction_interval_secs = 60
//! history_file = ~/.local/share/respack/history.jsonl
//! history_limit = 200
//! ```
//!
//! Missing files and missing keys fall back to defaults. Unknown keys are
//! ignored. Malformed values are reported as
//! [`ManagerError::InvalidConfig`].

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use tracing::debug;

use crate::manager::{
    HostRewrite, ManagerConfig, ManagerError, ManagerResult, DEFAULT_EVICTION_INTERVAL,
    DEFAULT_HISTORY_LIMIT, DEFAULT_PROGRESS_INTERVAL, DEFAULT_RETENTION, DEFAULT_TIMEOUT,
};

/// Name of the configuration file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Directory holding respack configuration.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("respack")
}

/// Default configuration file path.
pub fn config_file_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// `[paths]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathSettings {
    pub install_root: Option<PathBuf>,
    pub models_dir: Option<PathBuf>,
    pub plugins_dir: Option<PathBuf>,
    pub workflows_dir: Option<PathBuf>,
    /// Directory of pack definition files.
    pub catalog_dir: Option<PathBuf>,
}

/// `[repository]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositorySettings {
    pub proxy_host: Option<String>,
    pub proxy_endpoint: Option<String>,
}

/// `[network]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSettings {
    /// Connect timeout, and the longest a download may stall without data.
    pub timeout_secs: u64,
    pub progress_interval_ms: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL.as_millis() as u64,
        }
    }
}

/// `[tasks]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSettings {
    pub retention_secs: u64,
    pub eviction_interval_secs: u64,
    pub history_file: Option<PathBuf>,
    pub history_limit: usize,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            retention_secs: DEFAULT_RETENTION.as_secs(),
            eviction_interval_secs: DEFAULT_EVICTION_INTERVAL.as_secs(),
            history_file: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub paths: PathSettings,
    /// Model download host rewrites, in file order.
    pub mirrors: Vec<HostRewrite>,
    pub repository: RepositorySettings,
    pub network: NetworkSettings,
    pub tasks: TaskSettings,
}

impl ConfigFile {
    /// Load from the default location.
    ///
    /// A missing file yields the defaults.
    pub fn load() -> ManagerResult<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load from an explicit path. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> ManagerResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ManagerError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = Self::parse(&content)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse INI text.
    pub fn parse(content: &str) -> ManagerResult<Self> {
        let ini = Ini::load_from_str(content)
            .map_err(|e| ManagerError::InvalidConfig(format!("malformed INI: {}", e)))?;

        let mut config = Self::default();

        if let Some(section) = ini.section(Some("paths")) {
            config.paths = PathSettings {
                install_root: path_value(section, "install_root"),
                models_dir: path_value(section, "models_dir"),
                plugins_dir: path_value(section, "plugins_dir"),
                workflows_dir: path_value(section, "workflows_dir"),
                catalog_dir: path_value(section, "catalog_dir"),
            };
        }

        if let Some(section) = ini.section(Some("mirrors")) {
            for (host, endpoint) in section.iter() {
                config.mirrors.push(parse_rewrite("mirrors", host, endpoint)?);
            }
        }

        if let Some(section) = ini.section(Some("repository")) {
            config.repository = RepositorySettings {
                proxy_host: string_value(section, "proxy_host"),
                proxy_endpoint: string_value(section, "proxy_endpoint"),
            };
        }

        if let Some(section) = ini.section(Some("network")) {
            let network = &mut config.network;
            if let Some(v) = number_value(section, "network", "timeout_secs")? {
                network.timeout_secs = v;
            }
            if let Some(v) = number_value(section, "network", "progress_interval_ms")? {
                network.progress_interval_ms = v;
            }
        }

        if let Some(section) = ini.section(Some("tasks")) {
            let tasks = &mut config.tasks;
            if let Some(v) = number_value(section, "tasks", "retention_secs")? {
                tasks.retention_secs = v;
            }
            if let Some(v) = number_value(section, "tasks", "eviction_interval_secs")? {
                tasks.eviction_interval_secs = v;
            }
            if let Some(v) = number_value(section, "tasks", "history_limit")? {
                tasks.history_limit = v;
            }
            tasks.history_file = path_value(section, "history_file");
        }

        Ok(config)
    }

    /// Repository proxy rule, when both proxy keys are set.
    pub fn repository_proxy(&self) -> ManagerResult<Option<HostRewrite>> {
        match (&self.repository.proxy_host, &self.repository.proxy_endpoint) {
            (Some(host), Some(endpoint)) => {
                parse_rewrite("repository", host, endpoint).map(Some)
            }
            (None, None) => Ok(None),
            _ => Err(ManagerError::InvalidConfig(
                "[repository] needs both proxy_host and proxy_endpoint".to_string(),
            )),
        }
    }

    /// Build the manager configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::InvalidConfig`] when no install root is set
    /// or the repository proxy is incomplete.
    pub fn to_manager_config(&self) -> ManagerResult<ManagerConfig> {
        let install_root = self.paths.install_root.clone().ok_or_else(|| {
            ManagerError::InvalidConfig("[paths] install_root is not set".to_string())
        })?;

        let mut config = ManagerConfig::new(install_root)
            .with_timeout(Duration::from_secs(self.network.timeout_secs))
            .with_progress_interval(Duration::from_millis(self.network.progress_interval_ms))
            .with_retention(Duration::from_secs(self.tasks.retention_secs))
            .with_eviction_interval(Duration::from_secs(self.tasks.eviction_interval_secs))
            .with_history_limit(self.tasks.history_limit);

        if let Some(dir) = &self.paths.models_dir {
            config = config.with_models_dir(dir);
        }
        if let Some(dir) = &self.paths.plugins_dir {
            config = config.with_plugins_dir(dir);
        }
        if let Some(dir) = &self.paths.workflows_dir {
            config = config.with_workflows_dir(dir);
        }
        for rewrite in &self.mirrors {
            config = config.with_model_rewrite(rewrite.clone());
        }
        if let Some(proxy) = self.repository_proxy()? {
            config = config.with_repository_proxy(proxy);
        }
        if let Some(path) = &self.tasks.history_file {
            config = config.with_history_path(path);
        }

        Ok(config)
    }
}

fn string_value(section: &Properties, key: &str) -> Option<String> {
    section
        .get(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn path_value(section: &Properties, key: &str) -> Option<PathBuf> {
    string_value(section, key).map(|v| expand_tilde(&v))
}

fn number_value<T: FromStr>(
    section: &Properties,
    section_name: &str,
    key: &str,
) -> ManagerResult<Option<T>> {
    let Some(raw) = string_value(section, key) else {
        return Ok(None);
    };
    raw.parse().map(Some).map_err(|_| {
        ManagerError::InvalidConfig(format!(
            "[{}] {} must be a non-negative integer, got '{}'",
            section_name, key, raw
        ))
    })
}

fn parse_rewrite(section_name: &str, host: &str, endpoint: &str) -> ManagerResult<HostRewrite> {
    let host = host.trim();
    let endpoint = endpoint.trim();
    if host.is_empty() {
        return Err(ManagerError::InvalidConfig(format!(
            "[{}] has an entry without a host",
            section_name
        )));
    }
    match url::Url::parse(endpoint) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
            Ok(HostRewrite::new(host, endpoint))
        }
        _ => Err(ManagerError::InvalidConfig(format!(
            "[{}] endpoint for {} is not an http(s) URL: '{}'",
            section_name, host, endpoint
        ))),
    }
}

/// Expand a leading `~` to the home directory.
fn expand_tilde(raw: &str) -> PathBuf {
    if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}
