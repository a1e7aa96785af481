//! Configuration CLI commands.
//!
//! Provides `config path` and `config show` for inspecting the settings a
//! command would run with.

use clap::Subcommand;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Show resolved settings, including command-line overrides
    Show,
}

/// Run a config subcommand.
pub fn run(runner: &CliRunner, command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => {
            println!("{}", runner.config_path().display());
            Ok(())
        }
        ConfigCommands::Show => run_show(runner),
    }
}

fn run_show(runner: &CliRunner) -> Result<(), CliError> {
    let config = runner.manager_config()?;

    println!("Configuration Settings");
    println!("======================");
    println!();
    println!("[paths]");
    println!("  install_root  = {}", config.install_root.display());
    println!("  models_dir    = {}", config.models_dir().display());
    println!("  plugins_dir   = {}", config.plugins_dir().display());
    println!("  workflows_dir = {}", config.workflows_dir().display());
    println!("  catalog_dir   = {}", runner.catalog_dir().display());
    println!();

    println!("[mirrors]");
    if config.model_rewrites.is_empty() {
        println!("  (none)");
    }
    for rewrite in &config.model_rewrites {
        println!("  {} = {}", rewrite.host, rewrite.endpoint);
    }
    println!();

    println!("[repository]");
    match &config.repository_proxy {
        Some(proxy) => println!("  {} = {}", proxy.host, proxy.endpoint),
        None => println!("  (no proxy)"),
    }
    println!();

    println!("[network]");
    println!("  timeout_secs         = {}", config.timeout.as_secs());
    println!(
        "  progress_interval_ms = {}",
        config.progress_interval.as_millis()
    );
    println!();

    println!("[tasks]");
    println!("  retention_secs         = {}", config.retention.as_secs());
    println!(
        "  eviction_interval_secs = {}",
        config.eviction_interval.as_secs()
    );
    match &config.history_path {
        Some(path) => println!("  history_file           = {}", path.display()),
        None => println!("  history_file           = (not set)"),
    }
    println!("  history_limit          = {}", config.history_limit);
    Ok(())
}
