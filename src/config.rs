//! # Invocation Settings
//!
//! [`Config`] carries everything the prefab engine needs from its caller:
//! the project root, the registry base URL, the cache root and the merge
//! worker budget. The command layer fills it from CLI flags, environment
//! variables (`PREFAB_REGISTRY`, `PREFAB_CACHE`, `PREFAB_MERGE_JOBS`) and
//! the values in [`crate::defaults`], in that order of precedence.

use std::fs;
use std::path::{Path, PathBuf};

use url::Url;

use crate::defaults::{DEFAULT_MERGE_JOBS, MANIFEST_FILE};
use crate::error::{Error, Result};
use crate::path::find_module_dirs;
use crate::registry::PackageFetcher;

/// Resolved settings for one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Absolute, symlink-free project root
    pub project_root: PathBuf,
    /// Registry base URL, always ending in `/`
    pub registry_url: String,
    pub cache_root: PathBuf,
    /// Maximum number of files merged at once
    pub merge_jobs: usize,
}

impl Config {
    /// Builds a config, resolving the project root and normalizing the
    /// registry URL.
    pub fn new(project_root: &Path, registry_url: &str, cache_root: PathBuf) -> Result<Self> {
        let project_root = fs::canonicalize(project_root)
            .map_err(|e| Error::fs("resolve project root", project_root, e))?;
        Ok(Self {
            project_root,
            registry_url: normalize_registry_url(registry_url)?,
            cache_root,
            merge_jobs: DEFAULT_MERGE_JOBS,
        })
    }

    /// Sets the merge worker budget; zero is raised to one.
    pub fn with_merge_jobs(mut self, jobs: usize) -> Self {
        self.merge_jobs = jobs.max(1);
        self
    }

    /// The project's own manifest.
    pub fn manifest_path(&self) -> PathBuf {
        self.project_root.join(MANIFEST_FILE)
    }

    /// Module directories searched for installed packages, nearest first.
    pub fn module_dirs(&self) -> Vec<PathBuf> {
        find_module_dirs(&self.project_root)
    }

    /// A fetcher for this config's registry and cache root.
    pub fn fetcher(&self) -> PackageFetcher {
        PackageFetcher::new(&self.registry_url, self.cache_root.clone())
    }
}

/// Validates a registry URL and makes sure its path ends in `/`, so that
/// appending a package name yields the metadata URL.
pub fn normalize_registry_url(raw: &str) -> Result<String> {
    let mut url = Url::parse(raw.trim())?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url.to_string())
}
