//! Shared fixtures for integration tests: a fake package registry served by
//! `httpmock` and a builder for project trees.

#![allow(dead_code)]

use std::path::PathBuf;

use assert_fs::prelude::*;
use flate2::write::GzEncoder;
use flate2::Compression;
use httpmock::prelude::*;
use httpmock::Mock;

/// Builds a gzipped tarball with every file under `package/`, the way
/// registries publish packages.
pub fn build_tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("package/{}", path), content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// A package manifest declaring a prefab at `prefab`
pub fn prefab_manifest(name: &str, version: &str, prefab: &str) -> String {
    format!(
        r#"{{"name": "{}", "version": "{}", "prefab": "{}"}}"#,
        name, version, prefab
    )
}

/// Mocks registered for one published package
pub struct Published<'a> {
    pub metadata: Mock<'a>,
    pub tarballs: Vec<Mock<'a>>,
}

/// An HTTP registry serving package metadata and tarballs
pub struct FakeRegistry {
    pub server: MockServer,
}

impl FakeRegistry {
    pub fn start() -> Self {
        Self {
            server: MockServer::start(),
        }
    }

    /// Registry base URL, as passed to `--registry`
    pub fn url(&self) -> String {
        format!("{}/", self.server.base_url())
    }

    /// Publishes every version of `name` with the given files.
    pub fn publish(&self, name: &str, versions: &[(&str, &[(&str, &str)])]) -> Published<'_> {
        let mut entries = serde_json::Map::new();
        let mut tarballs = Vec::new();
        for (version, files) in versions {
            let tarball_path = format!("/{}/-/{}.tgz", name, version);
            entries.insert(
                version.to_string(),
                serde_json::json!({
                    "name": name,
                    "version": version,
                    "dist": { "tarball": self.server.url(&tarball_path) },
                }),
            );
            let body = build_tarball(files);
            tarballs.push(self.server.mock(|when, then| {
                when.method(GET).path(tarball_path.as_str());
                then.status(200)
                    .header("content-type", "application/octet-stream")
                    .body(body);
            }));
        }

        let metadata_body = serde_json::json!({ "name": name, "versions": entries });
        let metadata = self.server.mock(|when, then| {
            when.method(GET).path(format!("/{}", name));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(metadata_body);
        });
        Published { metadata, tarballs }
    }
}

/// A project directory with a root manifest and installed modules
pub struct Project {
    pub temp: assert_fs::TempDir,
}

impl Project {
    /// Creates a project whose root manifest depends on `dependencies`.
    pub fn new(dependencies: &[(&str, &str)]) -> Self {
        let temp = assert_fs::TempDir::new().unwrap();
        let deps: serde_json::Map<String, serde_json::Value> = dependencies
            .iter()
            .map(|(name, range)| (name.to_string(), serde_json::json!(range)))
            .collect();
        let manifest = serde_json::json!({
            "name": "app",
            "version": "0.0.1",
            "dependencies": deps,
        });
        temp.child("app/package.json")
            .write_str(&serde_json::to_string_pretty(&manifest).unwrap())
            .unwrap();
        Self { temp }
    }

    pub fn root(&self) -> PathBuf {
        self.temp.path().join("app")
    }

    pub fn cache_root(&self) -> PathBuf {
        self.temp.path().join("cache")
    }

    /// Simulates the package manager installing `name` into `node_modules`.
    pub fn install_module(&self, name: &str, files: &[(&str, &str)]) {
        for (path, content) in files {
            self.temp
                .child(format!("app/node_modules/{}/{}", name, path))
                .write_str(content)
                .unwrap();
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.path(rel)).unwrap()
    }

    pub fn write(&self, rel: &str, content: &str) {
        self.temp
            .child(format!("app/{}", rel))
            .write_str(content)
            .unwrap();
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.path(rel).exists()
    }
}
