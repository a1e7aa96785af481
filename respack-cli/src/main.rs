//! respack CLI - Command-line interface
//!
//! Lists catalog packs and installs them into a local application
//! directory, with live per-resource progress.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use error::CliError;
use runner::{CliRunner, GlobalOptions};

#[derive(Debug, Parser)]
#[command(name = "respack")]
#[command(version, about = "Install resource packs (models, plugins, workflows)", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.config/respack/config.ini)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory of pack definition files
    #[arg(long, global = true, value_name = "DIR")]
    catalog: Option<PathBuf>,

    /// Application directory receiving installed resources
    #[arg(long, global = true, value_name = "DIR")]
    install_root: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List available packs
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show the resources of a pack
    Show {
        /// Pack identifier
        pack: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Install a pack
    Install {
        /// Pack identifier
        pack: String,

        /// Install only these resources (comma-separated ids)
        #[arg(long, value_delimiter = ',', value_name = "IDS")]
        only: Vec<String>,

        /// Preferred model download source
        #[arg(long, value_name = "NAME")]
        source: Option<String>,
    },

    /// Show recently finished installations
    History {
        /// Number of entries to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

impl Cli {
    fn global_options(&self) -> GlobalOptions {
        GlobalOptions {
            config: self.config.clone(),
            catalog: self.catalog.clone(),
            install_root: self.install_root.clone(),
            log_file: self.log_file.clone(),
            verbose: self.verbose,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let runner = CliRunner::new(&cli.global_options())?;

    match cli.command {
        Commands::List { json } => {
            runner.log_startup("list");
            commands::packs::run_list(&runner, json)
        }
        Commands::Show { pack, json } => {
            runner.log_startup("show");
            commands::packs::run_show(&runner, &pack, json)
        }
        Commands::Install { pack, only, source } => {
            runner.log_startup("install");
            commands::install::run(
                &runner,
                commands::install::InstallArgs { pack, only, source },
            )
        }
        Commands::History { limit } => {
            runner.log_startup("history");
            commands::history::run(&runner, limit)
        }
        Commands::Config(command) => commands::config::run(&runner, command),
    }
}
