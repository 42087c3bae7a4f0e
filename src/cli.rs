//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};

use prefab::output::OutputConfig;

use crate::commands;

/// Prefab - Keep local, version-tracked overrides of registry packages
#[derive(Parser, Debug)]
#[command(name = "prefab")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Materialize prefabs after packages were installed or updated
    Install(commands::install::InstallArgs),

    /// Capture prefabs of packages about to be removed into patches
    Remove(commands::remove::RemoveArgs),

    /// Show the state of every prefab in the project
    Status(commands::status::StatusArgs),

    /// Manage the package cache
    Cache(commands::cache::CacheArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        OutputConfig::from_env_and_flag(&self.color).apply();
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&self.log_level))
            .format_timestamp(None)
            .format_target(false)
            .init();

        match self.command {
            Commands::Install(args) => commands::install::execute(args),
            Commands::Remove(args) => commands::remove::execute(args),
            Commands::Status(args) => commands::status::execute(args),
            Commands::Cache(args) => commands::cache::execute(args),
        }
    }
}
