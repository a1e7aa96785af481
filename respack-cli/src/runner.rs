//! Shared command setup: logging, configuration, catalog and service.

use std::path::PathBuf;
use std::sync::Arc;

use respack::config::{config_dir, config_file_path, ConfigFile};
use respack::logging::{self, LogGuard, LoggingConfig};
use respack::manager::{ManagerConfig, PackService};
use respack::pack::PackCatalog;
use tracing::{info, warn};

use crate::error::CliError;

/// Global options shared by every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
    pub install_root: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub verbose: bool,
}

/// Command runner holding resolved configuration.
pub struct CliRunner {
    config: ConfigFile,
    config_path: PathBuf,
    _log_guard: Option<LogGuard>,
}

impl CliRunner {
    /// Initialize logging and load configuration.
    ///
    /// Command-line options take precedence over the configuration file.
    pub fn new(options: &GlobalOptions) -> Result<Self, CliError> {
        let mut logging_config = LoggingConfig::new().with_verbose(options.verbose);
        if let Some(path) = &options.log_file {
            logging_config = logging_config.with_log_file(path);
        }
        let log_guard = logging::init(&logging_config)?;

        let config_path = options.config.clone().unwrap_or_else(config_file_path);
        let mut config = ConfigFile::load_from(&config_path)?;
        apply_overrides(&mut config, options);

        let mut runner = Self::with_config(config, config_path);
        runner._log_guard = Some(log_guard);
        Ok(runner)
    }

    /// Runner over an already resolved configuration, without logging.
    pub fn with_config(config: ConfigFile, config_path: PathBuf) -> Self {
        Self {
            config,
            config_path,
            _log_guard: None,
        }
    }

    /// Path the configuration was read from.
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Log the command being run.
    pub fn log_startup(&self, command: &str) {
        info!(
            version = respack::VERSION,
            command = command,
            config = %self.config_path.display(),
            "respack starting"
        );
    }

    /// Directory holding pack definitions.
    pub fn catalog_dir(&self) -> PathBuf {
        self.config
            .paths
            .catalog_dir
            .clone()
            .unwrap_or_else(|| config_dir().join("packs"))
    }

    /// Load the pack catalog, reporting rejected definitions.
    pub fn load_catalog(&self) -> Result<Arc<PackCatalog>, CliError> {
        let dir = self.catalog_dir();
        if !dir.is_dir() {
            return Err(CliError::Config(format!(
                "Pack catalog directory {} does not exist. \
                 Use --catalog or set catalog_dir in config.ini [paths] section.",
                dir.display()
            )));
        }

        let catalog = PackCatalog::new(dir);
        let report = catalog.load()?;
        for rejected in &report.rejected {
            warn!(
                source = %rejected.source.display(),
                pack = rejected.pack_id.as_deref().unwrap_or("?"),
                reason = %rejected.reason,
                "Skipped pack definition"
            );
        }
        Ok(Arc::new(catalog))
    }

    /// Manager configuration built from the resolved settings.
    pub fn manager_config(&self) -> Result<ManagerConfig, CliError> {
        Ok(self.config.to_manager_config()?)
    }

    /// Create the pack service over a loaded catalog.
    pub fn create_service(&self, catalog: Arc<PackCatalog>) -> Result<PackService, CliError> {
        Ok(PackService::new(self.manager_config()?, catalog)?)
    }
}

/// Apply command-line overrides, defaulting the install root to the current
/// directory.
fn apply_overrides(config: &mut ConfigFile, options: &GlobalOptions) {
    if let Some(dir) = &options.catalog {
        config.paths.catalog_dir = Some(dir.clone());
    }
    if let Some(root) = &options.install_root {
        config.paths.install_root = Some(root.clone());
    }
    if config.paths.install_root.is_none() {
        config.paths.install_root = Some(PathBuf::from("."));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn runner_for(catalog_dir: PathBuf, install_root: PathBuf) -> CliRunner {
        let mut config = ConfigFile::default();
        config.paths.catalog_dir = Some(catalog_dir);
        config.paths.install_root = Some(install_root);
        CliRunner::with_config(config, PathBuf::from("config.ini"))
    }

    #[test]
    fn test_missing_catalog_dir_is_config_error() {
        let temp = TempDir::new().unwrap();
        let runner = runner_for(temp.path().join("absent"), temp.path().to_path_buf());
        assert!(matches!(runner.load_catalog(), Err(CliError::Config(_))));
    }

    #[test]
    fn test_catalog_and_service_from_directory() {
        let temp = TempDir::new().unwrap();
        let packs = temp.path().join("packs");
        std::fs::create_dir_all(&packs).unwrap();
        std::fs::write(
            packs.join("starter.json"),
            r#"{
                "id": "starter",
                "name": "Starter",
                "resources": [
                    {"id": "flow", "name": "Flow", "type": "workflow",
                     "url": "https://example.com/flow.json", "filename": "flow.json"}
                ]
            }"#,
        )
        .unwrap();

        let runner = runner_for(packs, temp.path().join("app"));
        let catalog = runner.load_catalog().unwrap();
        assert_eq!(catalog.len(), 1);

        let service = runner.create_service(catalog).unwrap();
        assert_eq!(service.get_pack("starter").unwrap().resources.len(), 1);
        assert_eq!(
            service.config().workflows_dir(),
            temp.path().join("app/user/default/workflows")
        );
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = ConfigFile::default();
        config.paths.install_root = Some(PathBuf::from("/from/file"));
        config.paths.catalog_dir = Some(PathBuf::from("/file/packs"));

        let options = GlobalOptions {
            install_root: Some(PathBuf::from("/from/cli")),
            catalog: Some(PathBuf::from("/cli/packs")),
            ..Default::default()
        };
        apply_overrides(&mut config, &options);

        assert_eq!(config.paths.install_root, Some(PathBuf::from("/from/cli")));
        assert_eq!(config.paths.catalog_dir, Some(PathBuf::from("/cli/packs")));
    }

    #[test]
    fn test_install_root_defaults_to_current_dir() {
        let mut config = ConfigFile::default();
        apply_overrides(&mut config, &GlobalOptions::default());
        assert_eq!(config.paths.install_root, Some(PathBuf::from(".")));
        assert!(config.to_manager_config().is_ok());
    }

    #[test]
    fn test_file_values_kept_without_overrides() {
        let mut config = ConfigFile::default();
        config.paths.install_root = Some(PathBuf::from("/from/file"));
        apply_overrides(&mut config, &GlobalOptions::default());
        assert_eq!(config.paths.install_root, Some(PathBuf::from("/from/file")));
        assert!(config.paths.catalog_dir.is_none());
    }
}
