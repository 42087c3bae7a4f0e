//! # Registry Download and Cache Population
//!
//! This module fetches an exact published version of a package from a
//! registry and extracts it into an immutable cache entry.
//!
//! ## Design
//!
//! The network side is behind the [`RegistryClient`] trait so that tests can
//! count requests or simulate failures without a server. [`HttpRegistry`] is
//! the real implementation backed by `ureq`.
//!
//! [`PackageFetcher::fetch`] follows the registry protocol:
//!
//! 1.  If the cache entry directory exists, return it. No request is made.
//! 2.  `GET <registry><name>` and select `versions[<version>]`.
//! 3.  `GET` the `dist.tarball` URL of that entry.
//! 4.  Unpack the archive, stripping its top-level directory.
//!
//! Everything is written into a staging directory next to the entry and
//! renamed into place only once extraction finished, so a failed download
//! never leaves behind a directory that later looks like a cache hit.

use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use log::{debug, info, warn};
use serde_json::Value;

use crate::cache::{CacheKey, METADATA_FILE, TARBALL_FILE};
use crate::error::{Error, Result};

/// Trait for registry requests - allows mocking in tests
pub trait RegistryClient: Send + Sync {
    /// Fetches and parses a JSON document.
    fn get_json(&self, url: &str) -> Result<Value>;

    /// Fetches a binary resource.
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

/// The default implementation of `RegistryClient`, which performs real HTTP
/// requests.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    agent: ureq::Agent,
}

impl HttpRegistry {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .user_agent(concat!("prefab/", env!("CARGO_PKG_VERSION")))
                .build(),
        }
    }

    fn call(&self, url: &str) -> Result<ureq::Response> {
        debug!("GET {}", url);
        self.agent.get(url).call().map_err(|e| Error::Network {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

impl Default for HttpRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryClient for HttpRegistry {
    fn get_json(&self, url: &str) -> Result<Value> {
        self.call(url)?.into_json().map_err(|e| Error::Network {
            url: url.to_string(),
            message: format!("Failed to parse response: {}", e),
        })
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.call(url)?
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| Error::Network {
                url: url.to_string(),
                message: format!("Failed to read response body: {}", e),
            })?;
        Ok(bytes)
    }
}

/// Fetches exact package versions into the content-addressed cache.
pub struct PackageFetcher {
    registry_url: String,
    cache_root: PathBuf,
    client: Box<dyn RegistryClient>,
}

impl PackageFetcher {
    /// Creates a fetcher that talks to `registry_url` over HTTP.
    pub fn new(registry_url: &str, cache_root: PathBuf) -> Self {
        Self::with_client(registry_url, cache_root, Box::new(HttpRegistry::new()))
    }

    /// Creates a fetcher with a custom `RegistryClient`.
    pub fn with_client(
        registry_url: &str,
        cache_root: PathBuf,
        client: Box<dyn RegistryClient>,
    ) -> Self {
        Self {
            registry_url: registry_url.to_string(),
            cache_root,
            client,
        }
    }

    /// The cache directory an exact version is (or would be) stored in.
    pub fn cache_path(&self, name: &str, version: &str) -> PathBuf {
        CacheKey::new(name, version).path(&self.cache_root)
    }

    /// Returns true if the exact version is already cached.
    pub fn is_cached(&self, name: &str, version: &str) -> bool {
        self.cache_path(name, version).is_dir()
    }

    /// Returns the cache entry for `name@version`, downloading it on a miss.
    pub fn fetch(&self, name: &str, version: &str) -> Result<PathBuf> {
        semver::Version::parse(version).map_err(|_| Error::InvalidVersion {
            version: version.to_string(),
        })?;

        let entry_dir = self.cache_path(name, version);
        if entry_dir.is_dir() {
            debug!("Cache hit for {}@{}: {}", name, version, entry_dir.display());
            return Ok(entry_dir);
        }

        fs::create_dir_all(&self.cache_root)
            .map_err(|e| Error::fs("create", &self.cache_root, e))?;
        let staging = tempfile::Builder::new()
            .prefix(".prefab-fetch-")
            .tempdir_in(&self.cache_root)?;

        let metadata_url = format!("{}{}", self.registry_url, name);
        let metadata = self.client.get_json(&metadata_url)?;
        let entry = metadata
            .get("versions")
            .and_then(|versions| versions.get(version))
            .ok_or_else(|| Error::MissingVersion {
                name: name.to_string(),
                version: version.to_string(),
            })?;
        fs::write(
            staging.path().join(METADATA_FILE),
            serde_json::to_vec_pretty(entry)?,
        )?;

        let tarball_url = entry
            .get("dist")
            .and_then(|dist| dist.get("tarball"))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Network {
                url: metadata_url.clone(),
                message: format!("No dist.tarball for version {}", version),
            })?;
        let archive = self.client.get_bytes(tarball_url)?;
        fs::write(staging.path().join(TARBALL_FILE), &archive)?;

        extract_archive(&archive, staging.path())?;

        fs::rename(staging.path(), &entry_dir).map_err(|e| Error::fs("rename", &entry_dir, e))?;
        let _ = staging.keep();

        info!("Fetched {}@{} into {}", name, version, entry_dir.display());
        Ok(entry_dir)
    }
}

/// Unpacks a (possibly gzip-compressed) tar archive into `dest`.
///
/// The archive's top-level directory is stripped so that extracted paths
/// are package-relative. Entries that would escape `dest` and entries that
/// are neither files nor directories are skipped. Returns once every entry
/// has been written.
pub fn extract_archive(bytes: &[u8], dest: &Path) -> Result<()> {
    let reader: Box<dyn Read + '_> = if bytes.starts_with(&[0x1f, 0x8b]) {
        Box::new(GzDecoder::new(bytes))
    } else {
        Box::new(bytes)
    };
    let mut archive = tar::Archive::new(reader);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();

        if entry_path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            warn!("Skipping archive entry outside the package: {}", entry_path.display());
            continue;
        }

        let relative = strip_top_level(&entry_path);
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(&relative);

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry_type.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            entry.unpack(&target)?;
        } else {
            debug!("Skipping archive entry {} ({:?})", entry_path.display(), entry_type);
        }
    }
    Ok(())
}

/// Drops the first component of an archive path. Single-component paths are
/// kept as they are, for archives that have no top-level directory.
fn strip_top_level(path: &Path) -> PathBuf {
    let components: Vec<Component> = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    if components.len() <= 1 {
        return components.iter().collect();
    }
    components[1..].iter().collect()
}
