//! Default values for prefab configuration.
//!
//! This module provides centralized default values used across commands,
//! ensuring consistency and avoiding duplication.

use std::path::PathBuf;

/// Registry used when neither `--registry` nor `PREFAB_REGISTRY` is set.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org/";

/// Maximum number of external merge invocations in flight at once.
pub const DEFAULT_MERGE_JOBS: usize = 32;

/// Name of the directory that holds installed packages.
pub const MODULES_DIR: &str = "node_modules";

/// Name of a package manifest file.
pub const MANIFEST_FILE: &str = "package.json";

/// Returns the default cache root directory.
///
/// Uses the platform-appropriate cache directory:
/// - Linux: `~/.cache/prefab` (XDG Base Directory)
/// - macOS: `~/Library/Caches/prefab`
/// - Windows: `{FOLDERID_LocalAppData}\prefab`
///
/// Falls back to `.prefab-cache` in the current directory if the
/// platform cache directory cannot be determined.
///
/// This can be overridden by the `--cache-root` CLI flag or the
/// `PREFAB_CACHE` environment variable.
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".prefab-cache"))
        .join("prefab")
}
