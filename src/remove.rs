//! # Prefab Capture
//!
//! `remove` runs before the package manager drops packages from the
//! project. Every prefab that is reachable now but would no longer be
//! reachable without the removed packages is captured: its local edits are
//! diffed against the pristine cache entry of its version, the override
//! tree and module slot are deleted, and the diff is kept as the only file
//! in the override directory. A later `install` expands it again.

use std::fs;
use std::path::PathBuf;

use log::{debug, info};

use crate::cache::{CacheKey, ManifestCache};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::graph::{discover_prefabs, PrefabNode};
use crate::patch::create_patch;
use crate::path::remove_dir_and_empty_parents;
use crate::prefab::patch_path;
use crate::registry::PackageFetcher;

/// One captured prefab
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPrefab {
    pub name: String,
    pub version: String,
    pub override_dir: PathBuf,
    /// The written patch file; `None` when the override had no local edits
    pub patch_file: Option<PathBuf>,
}

/// Captures the prefabs that removing `package_names` makes unreachable,
/// using the configured registry.
pub fn remove(config: &Config, package_names: &[String]) -> Result<Vec<CapturedPrefab>> {
    remove_with(config, package_names, &config.fetcher())
}

/// Captures the prefabs that removing `package_names` makes unreachable.
pub fn remove_with(
    config: &Config,
    package_names: &[String],
    fetcher: &PackageFetcher,
) -> Result<Vec<CapturedPrefab>> {
    let manifest_path = config.manifest_path();
    let module_dirs = config.module_dirs();
    let cache = ManifestCache::new();

    let before = discover_prefabs(&manifest_path, &module_dirs, &[], &cache)?;
    let after = discover_prefabs(&manifest_path, &module_dirs, package_names, &cache)?;

    let mut captured = Vec::new();
    for node in before.difference(&after) {
        if let Some(prefab) = capture_prefab(node, fetcher)? {
            captured.push(prefab);
        }
    }
    Ok(captured)
}

fn capture_prefab(node: &PrefabNode, fetcher: &PackageFetcher) -> Result<Option<CapturedPrefab>> {
    let is_link = fs::symlink_metadata(&node.module_dir)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);
    if !is_link {
        debug!("{} was never materialized, nothing to capture", node.name);
        return Ok(None);
    }

    let override_dir = fs::canonicalize(&node.module_dir)
        .map_err(|e| Error::fs("resolve", &node.module_dir, e))?;
    let name = &node.manifest.name;
    let version = &node.manifest.version;

    let base = fetcher.fetch(name, version)?;
    let patch = create_patch(&base, &override_dir, &CacheKey::new(name, version))?;

    let cleanup = remove_dir_and_empty_parents(&override_dir)
        .and_then(|()| remove_dir_and_empty_parents(&node.module_dir));

    let patch_file = if patch.is_empty() {
        None
    } else {
        fs::create_dir_all(&override_dir).map_err(|e| Error::fs("create", &override_dir, e))?;
        let path = patch_path(&override_dir);
        fs::write(&path, patch.to_string()).map_err(|e| Error::fs("write", &path, e))?;
        Some(path)
    };
    cleanup?;

    match &patch_file {
        Some(path) => info!(
            "Captured {}@{} ({} changed files) into {}",
            name,
            version,
            patch.len(),
            path.display()
        ),
        None => info!("Removed {}@{} without local changes", name, version),
    }

    Ok(Some(CapturedPrefab {
        name: node.name.clone(),
        version: version.clone(),
        override_dir,
        patch_file,
    }))
}
