//! Package manifest model
//!
//! Only the fields prefab needs are modeled; everything else in a
//! `package.json` is ignored on read.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::conflict::read_maybe_conflicted;
use crate::error::{Error, Result};

/// A parsed package descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub optional_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
    /// Project-relative directory where this package is materialized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefab: Option<String>,
    /// Legacy spelling of `prefab`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub larix: Option<String>,
}

impl Manifest {
    /// Parses a manifest from JSON text.
    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Manifest {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Reads and parses a manifest file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::Manifest {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&text, path)
    }

    /// Reads a manifest that may contain unresolved merge conflicts.
    ///
    /// When conflicts are present the upstream (`yours`) side is parsed,
    /// since that side carries the version the override was merged to.
    pub fn from_file_conflict_aware(path: &Path) -> Result<Self> {
        let split = read_maybe_conflicted(path).map_err(|e| Error::Manifest {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(split.yours(), path)
    }

    /// The declared override directory, preferring `prefab` over the legacy key.
    pub fn override_path(&self) -> Option<&str> {
        self.prefab
            .as_deref()
            .or(self.larix.as_deref())
            .filter(|p| !p.is_empty())
    }

    /// Names from `dependencies` then `optionalDependencies`, deduplicated.
    pub fn runtime_dependencies(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self
            .dependencies
            .keys()
            .chain(self.optional_dependencies.keys())
        {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }
}
