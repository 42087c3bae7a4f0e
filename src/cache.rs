//! Cache entry layout and in-process manifest caching
//!
//! A cache entry is an immutable directory holding the pristine extracted
//! tree of one published `(name, version)`. Its directory name is the
//! entry's key, `npm-<name with / as ->-<version>`; that key is also
//! embedded in patch headers so a patch records its base version.
//!
//! [`ManifestCache`] is the per-invocation cache of parsed manifests used
//! by the dependency graph walk. It is an explicit object owned by the
//! caller, never global state.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::error::{Error, Result};
use crate::manifest::Manifest;

/// Prefix of every cache entry directory name.
pub const CACHE_PREFIX: &str = "npm-";

/// Sentinel file holding the registry metadata of a cache entry.
pub const METADATA_FILE: &str = ".prefab-metadata.json";

/// Sentinel file holding the raw downloaded archive of a cache entry.
pub const TARBALL_FILE: &str = ".prefab-tarball.tgz";

/// Cache key combining package name and exact version
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub name: String,
    pub version: String,
}

impl CacheKey {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
        }
    }

    /// The entry's directory name, e.g. `npm-@scope-pkg-1.0.0`.
    pub fn dir_name(&self) -> String {
        format!(
            "{}{}-{}",
            CACHE_PREFIX,
            self.name.replace('/', "-"),
            self.version
        )
    }

    /// The entry's directory below `cache_root`.
    pub fn path(&self, cache_root: &Path) -> PathBuf {
        cache_root.join(self.dir_name())
    }
}

/// Summary of one on-disk cache entry
#[derive(Debug, Clone)]
pub struct CacheEntryInfo {
    pub dir_name: String,
    pub path: PathBuf,
    pub file_count: usize,
    pub size: u64,
    pub last_modified: Option<SystemTime>,
}

/// Lists every cache entry below `cache_root`, sorted by directory name.
///
/// A missing cache root yields an empty list.
pub fn list_entries(cache_root: &Path) -> Result<Vec<CacheEntryInfo>> {
    let mut entries = Vec::new();
    if !cache_root.is_dir() {
        return Ok(entries);
    }

    for entry in fs::read_dir(cache_root)? {
        let entry = entry?;
        let dir_name = entry.file_name().to_string_lossy().to_string();
        if !entry.file_type()?.is_dir() || !dir_name.starts_with(CACHE_PREFIX) {
            continue;
        }

        let mut file_count = 0;
        let mut size = 0;
        for file in walkdir::WalkDir::new(entry.path())
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            file_count += 1;
            size += file.metadata().map(|m| m.len()).unwrap_or(0);
        }

        entries.push(CacheEntryInfo {
            dir_name,
            path: entry.path(),
            file_count,
            size,
            last_modified: entry.metadata().and_then(|m| m.modified()).ok(),
        });
    }

    entries.sort_by(|a, b| a.dir_name.cmp(&b.dir_name));
    Ok(entries)
}

/// Deletes one cache entry directory.
pub fn remove_entry(entry: &CacheEntryInfo) -> Result<()> {
    fs::remove_dir_all(&entry.path).map_err(|e| Error::fs("remove", &entry.path, e))
}

/// In-process cache of parsed manifests, keyed by manifest path
#[derive(Debug, Clone, Default)]
pub struct ManifestCache {
    cache: Arc<Mutex<HashMap<PathBuf, Manifest>>>,
}

impl ManifestCache {
    /// Create a new empty manifest cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached manifest, or read and cache it if not present
    ///
    /// Manifests are read conflict-aware: a module slot may point at an
    /// override whose manifest still carries merge conflict markers.
    pub fn get_or_load(&self, path: &Path) -> Result<Manifest> {
        {
            let cache = self.lock()?;
            if let Some(cached) = cache.get(path) {
                return Ok(cached.clone());
            }
        }

        let manifest = Manifest::from_file_conflict_aware(path)?;

        self.lock()?.insert(path.to_path_buf(), manifest.clone());
        Ok(manifest)
    }

    /// Get the number of cached manifests
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<PathBuf, Manifest>>> {
        self.cache.lock().map_err(|_| Error::Filesystem {
            message: "Manifest cache lock poisoned".to_string(),
        })
    }
}
