//! # Prefab Materialization
//!
//! `install` turns every discovered prefab into an editable override
//! directory inside the project and points its module slot at it:
//!
//! 1.  An absent override receives the installed package tree.
//! 2.  A materialized override at a different version is three-way merged
//!     with the freshly installed version, using the cache entry of the
//!     override's recorded version as the base.
//! 3.  A captured override is expanded again: the installed tree (or, if
//!     the upstream version moved, the recorded base version) is laid out
//!     and the patch is applied on top.
//!
//! The installed directory is then replaced by a relative symlink to the
//! override.
//!
//! Patch failures only abort the prefab they belong to. They are collected
//! in the [`InstallReport`] and the remaining prefabs are still installed.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::cache::ManifestCache;
use crate::config::Config;
use crate::defaults::MANIFEST_FILE;
use crate::error::{Error, Result};
use crate::graph::{discover_prefabs, PrefabNode};
use crate::manifest::Manifest;
use crate::merge::{merge_trees, Diff3, LineMerger, MergeReport};
use crate::patch::Patch;
use crate::path::{copy_dir, relative_path, remove_path, symlink_dir};
use crate::prefab::{check_collisions, override_dir, patch_path, PrefabState};
use crate::registry::PackageFetcher;

/// What `install` did with one prefab
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallAction {
    /// The module slot already pointed at the override
    AlreadyLinked,
    /// The installed tree became the override
    Moved,
    /// The override was kept as it is
    Kept,
    /// The override was merged with a new upstream version
    Merged(MergeReport),
    /// A captured patch was expanded into the override
    Restored,
    /// A captured patch was expanded and merged with a new upstream version
    RestoredAndMerged(MergeReport),
}

#[derive(Debug, Clone)]
pub struct InstalledPrefab {
    pub name: String,
    pub override_dir: PathBuf,
    pub action: InstallAction,
}

#[derive(Debug)]
pub struct PrefabFailure {
    pub name: String,
    pub error: Error,
}

/// Outcome of an install run
#[derive(Debug, Default)]
pub struct InstallReport {
    pub installed: Vec<InstalledPrefab>,
    pub failed: Vec<PrefabFailure>,
}

impl InstallReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Files left with conflict markers, as `(prefab, file)` pairs.
    pub fn conflicts(&self) -> Vec<(&str, &str)> {
        self.installed
            .iter()
            .flat_map(|prefab| {
                let files: &[String] = match &prefab.action {
                    InstallAction::Merged(report) | InstallAction::RestoredAndMerged(report) => {
                        &report.conflicted
                    }
                    _ => &[],
                };
                files.iter().map(move |f| (prefab.name.as_str(), f.as_str()))
            })
            .collect()
    }
}

/// Materializes every prefab of the project using the configured registry
/// and the external `diff3`.
pub fn install(config: &Config) -> Result<InstallReport> {
    install_with(config, &config.fetcher(), &Diff3::new())
}

/// Materializes every prefab of the project with the given fetcher and
/// line merger.
pub fn install_with(
    config: &Config,
    fetcher: &PackageFetcher,
    merger: &dyn LineMerger,
) -> Result<InstallReport> {
    let graph = discover_prefabs(
        &config.manifest_path(),
        &config.module_dirs(),
        &[],
        &ManifestCache::new(),
    )?;
    check_collisions(&config.project_root, &graph)?;
    debug!("Installing {} prefabs", graph.len());

    let mut report = InstallReport::default();
    for node in graph.nodes() {
        match install_prefab(config, node, fetcher, merger) {
            Ok(prefab) => report.installed.push(prefab),
            Err(error @ (Error::PatchApply { .. } | Error::PatchFormat { .. })) => {
                warn!("Failed to materialize {}: {}", node.name, error);
                report.failed.push(PrefabFailure {
                    name: node.name.clone(),
                    error: as_apply_error(error),
                });
            }
            Err(error) => return Err(error),
        }
    }
    Ok(report)
}

fn install_prefab(
    config: &Config,
    node: &PrefabNode,
    fetcher: &PackageFetcher,
    merger: &dyn LineMerger,
) -> Result<InstalledPrefab> {
    let target = override_dir(&config.project_root, node.declared_path());
    let installed_dir = fs::canonicalize(&node.module_dir)
        .map_err(|e| Error::fs("resolve", &node.module_dir, e))?;
    let done = |action: InstallAction| InstalledPrefab {
        name: node.name.clone(),
        override_dir: target.clone(),
        action,
    };

    if fs::canonicalize(&target).ok().as_ref() == Some(&installed_dir) {
        debug!("{} already points at {}", node.name, target.display());
        return Ok(done(InstallAction::AlreadyLinked));
    }

    let installed = Manifest::from_file(&installed_dir.join(MANIFEST_FILE))?;

    let action = match PrefabState::detect(&target)? {
        PrefabState::Absent => {
            move_tree(&installed_dir, &target)?;
            info!("Materialized {} into {}", node.name, target.display());
            InstallAction::Moved
        }
        PrefabState::Materialized { version } if version == installed.version => {
            remove_path(&installed_dir)?;
            InstallAction::Kept
        }
        PrefabState::Materialized { version } => {
            info!(
                "Merging {} {} -> {} into {}",
                node.name,
                version,
                installed.version,
                target.display()
            );
            let base = fetcher.fetch(&installed.name, &version)?;
            let merged = merge_trees(&target, &base, &installed_dir, merger, config.merge_jobs)?;
            remove_path(&installed_dir)?;
            InstallAction::Merged(merged)
        }
        PrefabState::Captured { version } if version == installed.version => {
            let captured = read_patch(&target)?;
            expand_patch(&installed_dir, &target, &captured)?;
            remove_path(&installed_dir)?;
            info!("Restored {} into {}", node.name, target.display());
            InstallAction::Restored
        }
        PrefabState::Captured { version } => {
            info!(
                "Restoring {} {} and merging to {}",
                node.name, version, installed.version
            );
            let captured = read_patch(&target)?;
            let base = fetcher.fetch(&installed.name, &version)?;
            expand_patch(&base, &target, &captured)?;
            let merged = merge_trees(&target, &base, &installed_dir, merger, config.merge_jobs)?;
            remove_path(&installed_dir)?;
            InstallAction::RestoredAndMerged(merged)
        }
    };

    link_module(&installed_dir, &target)?;
    Ok(done(action))
}

/// Moves the installed tree to `target`, copying when `target` already
/// exists (an empty placeholder) or the rename is not possible.
fn move_tree(installed_dir: &Path, target: &Path) -> Result<()> {
    if fs::symlink_metadata(target).is_err() {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::fs("create", parent, e))?;
        }
        match fs::rename(installed_dir, target) {
            Ok(()) => return Ok(()),
            Err(e) => debug!(
                "Cannot rename {} ({}), copying instead",
                installed_dir.display(),
                e
            ),
        }
    }
    copy_dir(installed_dir, target)?;
    remove_path(installed_dir)
}

/// Replaces the installed location with a relative symlink to `target`.
fn link_module(installed_dir: &Path, target: &Path) -> Result<()> {
    remove_path(installed_dir)?;
    let slot_parent = installed_dir.parent().unwrap_or(Path::new("/"));
    let resolved = fs::canonicalize(target).map_err(|e| Error::fs("resolve", target, e))?;
    let link_target = relative_path(slot_parent, &resolved);
    symlink_dir(&link_target, installed_dir)?;
    debug!(
        "Linked {} -> {}",
        installed_dir.display(),
        link_target.display()
    );
    Ok(())
}

/// Reads the captured patch, before the override is filled with files.
fn read_patch(target: &Path) -> Result<(PathBuf, Patch)> {
    let path = patch_path(target);
    let patch = Patch::from_file(&path)?;
    Ok((path, patch))
}

/// Lays out `source` in the captured override, applies the patch on top
/// and deletes the patch file.
///
/// If the patch does not apply, the override is reset to holding only the
/// patch file.
fn expand_patch(source: &Path, target: &Path, (path, patch): &(PathBuf, Patch)) -> Result<()> {
    copy_dir(source, target)?;
    if let Err(e) = patch.apply_to_dir(target, path) {
        for entry in fs::read_dir(target)? {
            let entry = entry?.path();
            if entry != *path {
                remove_path(&entry)?;
            }
        }
        return Err(e);
    }
    fs::remove_file(path).map_err(|e| Error::fs("remove", path, e))?;
    debug!("Applied and removed {}", path.display());
    Ok(())
}

fn as_apply_error(error: Error) -> Error {
    match error {
        Error::PatchFormat { path, message } => Error::PatchApply { path, message },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheKey;
    use crate::merge::MergeOutput;
    use crate::patch::create_patch;
    use crate::path::list_files;
    use tempfile::TempDir;

    /// Merger for trees where no file changed on both sides
    struct NoConflictMerger;

    impl LineMerger for NoConflictMerger {
        fn merge(
            &self,
            file: &str,
            _mine: Option<&Path>,
            _base: Option<&Path>,
            _theirs: Option<&Path>,
        ) -> Result<MergeOutput> {
            Err(Error::MergeTool {
                file: file.to_string(),
                message: "unexpected merge".to_string(),
            })
        }
    }

    fn write_tree(dir: &Path, files: &[(&str, &str)]) {
        for (name, contents) in files {
            let path = dir.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
    }

    fn core_files(version: &str, index: &str) -> Vec<(&'static str, String)> {
        vec![
            (
                "package.json",
                format!(
                    r#"{{"name": "@scope/core", "version": "{}", "prefab": "modules/core"}}"#,
                    version
                ),
            ),
            ("index.ts", index.to_string()),
        ]
    }

    fn write_owned(dir: &Path, files: &[(&str, String)]) {
        let borrowed: Vec<(&str, &str)> = files.iter().map(|(n, c)| (*n, c.as_str())).collect();
        write_tree(dir, &borrowed);
    }

    /// A project depending on `@scope/core`, installed at `version`
    fn project(version: &str) -> (TempDir, Config) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("app");
        write_tree(
            &root,
            &[(
                "package.json",
                r#"{"name": "app", "dependencies": {"@scope/core": "^1.0.0"}}"#,
            )],
        );
        write_owned(
            &root.join("node_modules/@scope/core"),
            &core_files(version, "console.log('Hello!');\n"),
        );
        let config =
            Config::new(&root, "http://127.0.0.1:9/", temp.path().join("cache")).unwrap();
        (temp, config)
    }

    fn run(config: &Config) -> InstallReport {
        let fetcher = PackageFetcher::new(&config.registry_url, config.cache_root.clone());
        install_with(config, &fetcher, &NoConflictMerger).unwrap()
    }

    fn seed_cache(config: &Config, version: &str, index: &str) -> PathBuf {
        let entry = CacheKey::new("@scope/core", version).path(&config.cache_root);
        write_owned(&entry, &core_files(version, index));
        entry
    }

    #[cfg(unix)]
    #[test]
    fn test_install_moves_and_links() {
        let (_temp, config) = project("1.0.0");
        let slot = config.project_root.join("node_modules/@scope/core");

        let report = run(&config);

        assert!(report.is_success());
        assert_eq!(report.installed.len(), 1);
        assert_eq!(report.installed[0].action, InstallAction::Moved);
        assert_eq!(
            fs::read_link(&slot).unwrap(),
            PathBuf::from("../../modules/core")
        );
        assert_eq!(
            fs::read_to_string(config.project_root.join("modules/core/index.ts")).unwrap(),
            "console.log('Hello!');\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_install_twice_is_already_linked() {
        let (_temp, config) = project("1.0.0");
        run(&config);

        let report = run(&config);

        assert_eq!(report.installed[0].action, InstallAction::AlreadyLinked);
        assert!(config.project_root.join("modules/core/index.ts").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_install_keeps_override_at_same_version() {
        let (_temp, config) = project("1.0.0");
        let target = config.project_root.join("modules/core");
        write_owned(&target, &core_files("1.0.0", "console.log('mine');\n"));

        let report = run(&config);

        assert_eq!(report.installed[0].action, InstallAction::Kept);
        assert_eq!(
            fs::read_to_string(target.join("index.ts")).unwrap(),
            "console.log('mine');\n"
        );
        assert!(fs::symlink_metadata(config.project_root.join("node_modules/@scope/core"))
            .unwrap()
            .file_type()
            .is_symlink());
    }

    #[cfg(unix)]
    #[test]
    fn test_install_merges_new_upstream_version() {
        let (_temp, config) = project("1.1.0");
        seed_cache(&config, "1.0.0", "console.log('Hello!');\n");
        let target = config.project_root.join("modules/core");
        write_owned(&target, &core_files("1.0.0", "console.log('Hello!');\n"));
        write_tree(&target, &[("local.ts", "export const local = 1;\n")]);

        let report = run(&config);

        match &report.installed[0].action {
            InstallAction::Merged(merge) => assert!(!merge.has_conflicts()),
            other => panic!("unexpected action: {:?}", other),
        }
        let manifest = Manifest::from_file(&target.join("package.json")).unwrap();
        assert_eq!(manifest.version, "1.1.0");
        assert!(target.join("local.ts").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_install_restores_captured_patch() {
        let (temp, config) = project("1.0.0");
        let base = seed_cache(&config, "1.0.0", "console.log('Hello!');\n");
        let edited = temp.path().join("edited");
        write_owned(&edited, &core_files("1.0.0", "console.log('Hello, world!');\n"));
        let patch = create_patch(&base, &edited, &CacheKey::new("@scope/core", "1.0.0")).unwrap();
        let target = config.project_root.join("modules/core");
        write_tree(&target, &[("core.patch", patch.to_string().as_str())]);

        let report = run(&config);

        assert_eq!(report.installed[0].action, InstallAction::Restored);
        assert_eq!(
            fs::read_to_string(target.join("index.ts")).unwrap(),
            "console.log('Hello, world!');\n"
        );
        assert!(!target.join("core.patch").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_install_records_patch_failure_and_continues() {
        let (temp, config) = project("1.0.0");
        let root = &config.project_root;
        write_tree(
            root,
            &[
                (
                    "package.json",
                    r#"{"name": "app", "dependencies": {"@scope/core": "1.0.0", "util": "1.0.0"}}"#,
                ),
                (
                    "node_modules/util/package.json",
                    r#"{"name": "util", "version": "1.0.0", "prefab": "modules/util"}"#,
                ),
            ],
        );

        // A patch against contents the installed tree does not have
        let base = temp.path().join("other-base");
        let edited = temp.path().join("other-edited");
        write_tree(&base, &[("index.ts", "something else\n")]);
        write_tree(&edited, &[("index.ts", "something new\n")]);
        let patch = create_patch(&base, &edited, &CacheKey::new("@scope/core", "1.0.0")).unwrap();
        let target = root.join("modules/core");
        write_tree(&target, &[("core.patch", patch.to_string().as_str())]);

        let report = run(&config);

        assert!(!report.is_success());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].name, "@scope/core");
        assert!(matches!(report.failed[0].error, Error::PatchApply { .. }));
        assert_eq!(list_files(&target).unwrap(), vec![PathBuf::from("core.patch")]);
        assert!(root.join("node_modules/@scope/core/index.ts").exists());

        assert_eq!(report.installed.len(), 1);
        assert_eq!(report.installed[0].name, "util");
        assert!(root.join("modules/util/package.json").exists());
    }

    #[test]
    fn test_install_rejects_colliding_overrides() {
        let (_temp, config) = project("1.0.0");
        let root = &config.project_root;
        write_tree(
            root,
            &[
                (
                    "package.json",
                    r#"{"name": "app", "dependencies": {"@scope/core": "1.0.0", "copy": "1.0.0"}}"#,
                ),
                (
                    "node_modules/copy/package.json",
                    r#"{"name": "copy", "version": "1.0.0", "prefab": "./modules/core"}"#,
                ),
            ],
        );
        let fetcher = PackageFetcher::new(&config.registry_url, config.cache_root.clone());

        let err = install_with(&config, &fetcher, &NoConflictMerger).unwrap_err();

        assert!(matches!(err, Error::OverrideCollision { .. }));
        assert!(!root.join("modules").exists());
    }

    #[test]
    fn test_install_without_prefabs() {
        let (_temp, config) = project("1.0.0");
        write_tree(
            &config.project_root,
            &[("package.json", r#"{"name": "app", "dependencies": {}}"#)],
        );

        let report = run(&config);

        assert!(report.is_success());
        assert!(report.installed.is_empty());
    }
}
