//! Prefab discovery
//!
//! Walks a project's dependency graph and collects every installed package
//! whose manifest declares an override directory. Discovery is transitive
//! through prefabs: the regular dependencies of a prefab are walked too, so
//! a prefab nested inside another prefab is found. The project root
//! contributes its optional dependencies as well; a prefab's optional
//! dependencies and the dependencies of ordinary packages are not walked.
//!
//! A visited-name set guards the walk, so packages that depend on each
//! other are each recorded once and the walk terminates.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::cache::ManifestCache;
use crate::defaults::MANIFEST_FILE;
use crate::error::Result;
use crate::manifest::Manifest;
use crate::path::find_module;

/// One discovered prefab
#[derive(Debug, Clone)]
pub struct PrefabNode {
    /// Package name as listed in the dependent's manifest
    pub name: String,
    /// Manifest of the installed package
    pub manifest: Manifest,
    /// Installed location in the module tree (may be a symlink)
    pub module_dir: PathBuf,
}

impl PrefabNode {
    /// The project-relative override directory declared by the package.
    pub fn declared_path(&self) -> &str {
        self.manifest.override_path().unwrap_or_default()
    }
}

/// Every prefab reachable from a root manifest, in discovery order
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<PrefabNode>,
}

impl DependencyGraph {
    pub fn from_nodes(nodes: Vec<PrefabNode>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[PrefabNode] {
        &self.nodes
    }

    pub fn names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&PrefabNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Prefabs present in `self` but not in `other`, in discovery order.
    pub fn difference<'a>(&'a self, other: &DependencyGraph) -> Vec<&'a PrefabNode> {
        self.nodes
            .iter()
            .filter(|n| !other.contains(&n.name))
            .collect()
    }
}

/// Discovers the prefabs reachable from the manifest at `manifest_path`.
///
/// Root dependencies listed in `excluded` are skipped. A missing root
/// manifest yields an empty graph. Dependency manifests that cannot be
/// read are skipped with a warning.
pub fn discover_prefabs(
    manifest_path: &Path,
    module_dirs: &[PathBuf],
    excluded: &[String],
    cache: &ManifestCache,
) -> Result<DependencyGraph> {
    let mut graph = DependencyGraph::default();
    if !manifest_path.exists() {
        debug!("No manifest at {}, nothing to discover", manifest_path.display());
        return Ok(graph);
    }

    let root = Manifest::from_file(manifest_path)?;
    let deps: Vec<&str> = root
        .runtime_dependencies()
        .into_iter()
        .filter(|name| !excluded.iter().any(|e| e == name))
        .collect();

    let mut visited = HashSet::new();
    collect_prefabs(&deps, module_dirs, cache, &mut visited, &mut graph)?;
    Ok(graph)
}

fn collect_prefabs(
    deps: &[&str],
    module_dirs: &[PathBuf],
    cache: &ManifestCache,
    visited: &mut HashSet<String>,
    graph: &mut DependencyGraph,
) -> Result<()> {
    for &dep in deps {
        if !visited.insert(dep.to_string()) {
            continue;
        }

        let Some(module_dir) = find_module(dep, module_dirs) else {
            debug!("Dependency {} is not installed", dep);
            continue;
        };

        let manifest = match cache.get_or_load(&module_dir.join(MANIFEST_FILE)) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("Skipping {}: {}", dep, e);
                continue;
            }
        };

        if manifest.override_path().is_none() {
            continue;
        }

        debug!(
            "Found prefab {} -> {}",
            dep,
            manifest.override_path().unwrap_or_default()
        );
        let children: Vec<String> = manifest.dependencies.keys().cloned().collect();
        graph.nodes.push(PrefabNode {
            name: dep.to_string(),
            manifest,
            module_dir,
        });

        let children: Vec<&str> = children.iter().map(String::as_str).collect();
        collect_prefabs(&children, module_dirs, cache, visited, graph)?;
    }
    Ok(())
}
