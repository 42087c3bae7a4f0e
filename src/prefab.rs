//! Prefab state and override directory layout
//!
//! An override directory is in one of three states:
//!
//! - absent: it holds neither a manifest nor a patch file,
//! - materialized: it holds the full editable package tree,
//! - captured: it holds only `<basename>.patch`, the local edits against
//!   the version recorded in the patch header.
//!
//! A directory holding a patch file next to anything else is rejected.

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::cache::ManifestCache;
use crate::config::Config;
use crate::defaults::MANIFEST_FILE;
use crate::error::{Error, Result};
use crate::graph::{discover_prefabs, DependencyGraph};
use crate::manifest::Manifest;
use crate::patch::version_from_patch_file;
use crate::path::list_files;

/// State of one override directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefabState {
    Absent,
    Materialized { version: String },
    Captured { version: String },
}

impl PrefabState {
    /// Inspects `override_dir`.
    pub fn detect(override_dir: &Path) -> Result<Self> {
        let patch = patch_path(override_dir);
        if patch.is_file() {
            if list_files(override_dir)?.len() > 1 {
                return Err(Error::UnexpectedContents {
                    path: override_dir.display().to_string(),
                });
            }
            return Ok(PrefabState::Captured {
                version: version_from_patch_file(&patch)?,
            });
        }

        let manifest = override_dir.join(MANIFEST_FILE);
        if manifest.is_file() {
            let manifest = Manifest::from_file_conflict_aware(&manifest)?;
            return Ok(PrefabState::Materialized {
                version: manifest.version,
            });
        }

        Ok(PrefabState::Absent)
    }

    /// The recorded version, if any.
    pub fn version(&self) -> Option<&str> {
        match self {
            PrefabState::Absent => None,
            PrefabState::Materialized { version } | PrefabState::Captured { version } => {
                Some(version)
            }
        }
    }
}

impl fmt::Display for PrefabState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefabState::Absent => write!(f, "absent"),
            PrefabState::Materialized { version } => write!(f, "materialized ({})", version),
            PrefabState::Captured { version } => write!(f, "captured ({})", version),
        }
    }
}

/// `<override_dir>/<basename(override_dir)>.patch`
pub fn patch_path(override_dir: &Path) -> PathBuf {
    let base = override_dir
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    override_dir.join(format!("{}.patch", base))
}

/// Resolves a declared override path against the project root.
///
/// `.` and `..` components are resolved lexically so that two spellings of
/// the same directory compare equal.
pub fn override_dir(project_root: &Path, declared: &str) -> PathBuf {
    let mut resolved = PathBuf::new();
    for component in project_root.join(declared).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other.as_os_str()),
        }
    }
    resolved
}

/// Fails if two prefabs resolve to the same override directory.
pub fn check_collisions(project_root: &Path, graph: &DependencyGraph) -> Result<()> {
    let mut seen: HashMap<PathBuf, &str> = HashMap::new();
    for node in graph.nodes() {
        let dir = override_dir(project_root, node.declared_path());
        if let Some(first) = seen.insert(dir.clone(), &node.name) {
            return Err(Error::OverrideCollision {
                path: dir.display().to_string(),
                first: first.to_string(),
                second: node.name.clone(),
            });
        }
    }
    Ok(())
}

/// One discovered prefab and the state of its override directory
#[derive(Debug, Clone)]
pub struct PrefabStatus {
    pub name: String,
    pub override_dir: PathBuf,
    pub state: PrefabState,
    /// The module slot is a symlink into the override directory
    pub linked: bool,
}

/// Reports every prefab reachable from the project manifest.
pub fn status(config: &Config) -> Result<Vec<PrefabStatus>> {
    let graph = discover_prefabs(
        &config.manifest_path(),
        &config.module_dirs(),
        &[],
        &ManifestCache::new(),
    )?;

    graph
        .nodes()
        .iter()
        .map(|node| {
            let dir = override_dir(&config.project_root, node.declared_path());
            let linked = node
                .module_dir
                .symlink_metadata()
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false)
                && node.module_dir.canonicalize().ok() == dir.canonicalize().ok();
            Ok(PrefabStatus {
                name: node.name.clone(),
                state: PrefabState::detect(&dir)?,
                override_dir: dir,
                linked,
            })
        })
        .collect()
}
