//! Path utilities for locating installed packages and walking prefab trees

use std::fs;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::defaults::{MANIFEST_FILE, MODULES_DIR};
use crate::error::{Error, Result};

/// File name prefix reserved for prefab's own bookkeeping files.
///
/// Files starting with this prefix are never listed, diffed or merged.
pub const INTERNAL_PREFIX: &str = ".prefab-";

/// Returns `dir/rel` for `dir` and every ancestor of `dir`, nearest first.
pub fn up_dirs(dir: &Path, rel: &str) -> Vec<PathBuf> {
    dir.ancestors().map(|ancestor| ancestor.join(rel)).collect()
}

/// Finds every existing module directory from `project_root` upward.
///
/// The project-local directory comes first, followed by each ancestor's.
pub fn find_module_dirs(project_root: &Path) -> Vec<PathBuf> {
    up_dirs(project_root, MODULES_DIR)
        .into_iter()
        .filter(|dir| dir.is_dir())
        .collect()
}

/// Resolves the installed directory of package `name`.
///
/// Searches `module_dirs` in order and returns the first directory that
/// holds a manifest for the package.
pub fn find_module(name: &str, module_dirs: &[PathBuf]) -> Option<PathBuf> {
    module_dirs
        .iter()
        .map(|dir| dir.join(name))
        .find(|package_dir| package_dir.join(MANIFEST_FILE).exists())
}

/// Returns true if a path component names an internal bookkeeping file.
pub fn is_internal(name: &str) -> bool {
    name.starts_with(INTERNAL_PREFIX)
}

/// Lists every file below `dir` as a sorted list of relative paths.
///
/// Internal bookkeeping files are skipped. Symlinks are followed, so a
/// materialized prefab reached through its module slot lists its contents.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }

    for entry in WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_internal(&e.file_name().to_string_lossy()))
    {
        let entry = entry.map_err(|e| Error::fs("walk", dir, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| Error::fs("relativize", entry.path(), e))?;
        files.push(relative.to_path_buf());
    }

    files.sort();
    Ok(files)
}

/// Computes the path of `target` relative to the directory `base`.
///
/// Both paths are expected to be absolute (or both relative to the same
/// directory); the result is used as a symlink target.
pub fn relative_path(base: &Path, target: &Path) -> PathBuf {
    let base: Vec<Component> = base.components().collect();
    let target: Vec<Component> = target.components().collect();

    let common = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common..base.len() {
        result.push("..");
    }
    for component in &target[common..] {
        result.push(component.as_os_str());
    }
    if result.as_os_str().is_empty() {
        result.push(".");
    }
    result
}

/// Removes `path` (file, symlink or directory tree), then removes each
/// parent directory that became empty.
///
/// Ascent stops at the first non-empty ancestor, so unrelated siblings are
/// never touched.
pub fn remove_dir_and_empty_parents(path: &Path) -> Result<()> {
    remove_path(path)?;

    let mut dir = path.parent();
    while let Some(current) = dir {
        if current.as_os_str().is_empty() {
            break;
        }
        let is_empty = match fs::read_dir(current) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => false,
        };
        if !is_empty {
            break;
        }
        fs::remove_dir(current).map_err(|e| Error::fs("remove", current, e))?;
        dir = current.parent();
    }
    Ok(())
}

/// Removes a file, a symlink (without following it) or a directory tree.
///
/// A missing path is not an error.
pub fn remove_path(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::fs("stat", path, e)),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| Error::fs("remove", path, e))
}

/// Recursively copies the directory `from` into `to`, creating `to`.
///
/// Internal bookkeeping files are not copied.
pub fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to).map_err(|e| Error::fs("create", to, e))?;
    for entry in WalkDir::new(from)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !is_internal(&e.file_name().to_string_lossy()))
    {
        let entry = entry.map_err(|e| Error::fs("walk", from, e))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| Error::fs("relativize", entry.path(), e))?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| Error::fs("create", &target, e))?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::fs("create", parent, e))?;
            }
            fs::copy(entry.path(), &target).map_err(|e| Error::fs("copy", entry.path(), e))?;
        }
    }
    Ok(())
}

/// Creates a directory symlink at `link` pointing at `target`.
#[cfg(unix)]
pub fn symlink_dir(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link).map_err(|e| Error::fs("symlink", link, e))
}

/// Creates a directory symlink at `link` pointing at `target`.
#[cfg(windows)]
pub fn symlink_dir(target: &Path, link: &Path) -> Result<()> {
    std::os::windows::fs::symlink_dir(target, link).map_err(|e| Error::fs("symlink", link, e))
}
