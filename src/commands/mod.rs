//! # CLI Command Implementations
//!
//! Each subcommand lives in its own file with an `Args` struct derived with
//! `clap` and an `execute` function that calls into the `prefab` library.
//! Commands that work on a project share [`ProjectArgs`].

pub mod cache;
pub mod install;
pub mod remove;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use prefab::config::Config;
use prefab::defaults::{default_cache_root, DEFAULT_MERGE_JOBS, DEFAULT_REGISTRY_URL};

/// Settings shared by every command that works on a project
#[derive(Args, Debug)]
pub struct ProjectArgs {
    /// Project root holding package.json
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub project_root: PathBuf,

    /// Registry base URL used to fetch pristine package versions
    #[arg(
        long,
        value_name = "URL",
        env = "PREFAB_REGISTRY",
        default_value = DEFAULT_REGISTRY_URL
    )]
    pub registry: String,

    /// The root directory for the package cache.
    ///
    /// Defaults to the system's cache directory (e.g. `~/.cache/prefab`
    /// on Linux).
    #[arg(long, value_name = "DIR", env = "PREFAB_CACHE")]
    pub cache_root: Option<PathBuf>,

    /// Maximum number of files merged at once
    #[arg(
        long,
        value_name = "N",
        env = "PREFAB_MERGE_JOBS",
        default_value_t = DEFAULT_MERGE_JOBS
    )]
    pub merge_jobs: usize,
}

impl ProjectArgs {
    /// Resolves the arguments into a library [`Config`].
    pub fn config(&self) -> Result<Config> {
        let cache_root = self.cache_root.clone().unwrap_or_else(default_cache_root);
        let config = Config::new(&self.project_root, &self.registry, cache_root)
            .with_context(|| {
                format!(
                    "Invalid project settings for {}",
                    self.project_root.display()
                )
            })?;
        Ok(config.with_merge_jobs(self.merge_jobs))
    }
}
