//! # Error Handling
//!
//! This module defines the centralized error type for the `prefab` library.
//! It uses the `thiserror` library to create an `Error` enum whose variants
//! map one-to-one onto the failure modes of the prefab engine:
//!
//! - Registry access (`Network`, `MissingVersion`, `InvalidVersion`).
//! - Patch handling (`PatchFormat`, `PatchApply`, `UnencodableFile`).
//! - Three-way merging (`MergeTool`). Textual conflicts are not errors.
//! - Project layout problems (`Manifest`, `OverrideCollision`,
//!   `UnexpectedContents`, `Filesystem`).
//! - Wrapped errors from the standard library and third-party crates.
//!
//! Every error is fail-fast: nothing in the library retries. Callers are
//! expected to add the command in progress (the binary does this with
//! `anyhow::Context`) and report the error.

use thiserror::Error;

/// Main error type for prefab operations
#[derive(Error, Debug)]
pub enum Error {
    /// A registry metadata or tarball request failed.
    #[error("Network operation error: {url} - {message}")]
    Network { url: String, message: String },

    /// The registry metadata does not list the requested version.
    #[error("Version {version} of {name} is not published in the registry")]
    MissingVersion { name: String, version: String },

    /// The caller supplied something that is not an exact version.
    #[error("Invalid exact version: {version}")]
    InvalidVersion { version: String },

    /// A patch file was not produced by prefab or is malformed.
    #[error("Patch format error in {path}: {message}")]
    PatchFormat { path: String, message: String },

    /// A file differs from its base but cannot be written into a patch.
    #[error("Cannot capture {path}: contents are not UTF-8 text and differ from the base version")]
    UnencodableFile { path: String },

    /// A diff block could not be applied to the current file contents.
    #[error("Applying patch {path} failed: {message}")]
    PatchApply { path: String, message: String },

    /// The external line merger failed hard (distinct from textual conflicts).
    #[error("Error merging file {file}: {message}")]
    MergeTool { file: String, message: String },

    /// A filesystem operation on a project or cache tree failed.
    #[error("Filesystem operation error: {message}")]
    Filesystem { message: String },

    /// A required package manifest is missing or unreadable.
    #[error("Manifest error in {path}: {message}")]
    Manifest { path: String, message: String },

    /// Two prefabs declare the same override directory.
    #[error("Prefabs {first} and {second} both declare override directory {path}")]
    OverrideCollision {
        path: String,
        first: String,
        second: String,
    },

    /// A captured prefab directory holds more than its patch file.
    #[error("Unexpected contents of a prefab dir: {path}. Expected to find only patch file there")]
    UnexpectedContents { path: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// A semantic versioning parsing error, wrapped from `semver::Error`.
    #[error("Semver parsing error: {0}")]
    Semver(#[from] semver::Error),
}

impl Error {
    /// Build a `Filesystem` error naming the operation and the path involved.
    pub(crate) fn fs(operation: &str, path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        Error::Filesystem {
            message: format!("{} {}: {}", operation, path.display(), err),
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
