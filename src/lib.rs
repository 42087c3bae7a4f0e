//! # Prefab Library
//!
//! This library lets a project depend on a registry package while keeping a
//! locally editable, version-tracked copy of it (a *prefab*) inside the
//! project tree. It is used by the `prefab` command-line tool, which runs
//! around the package manager: `remove` before packages are dropped,
//! `install` after packages were installed.
//!
//! ## Core Concepts
//!
//! - **Cache entries (`cache`, `registry`)**: immutable, version-keyed
//!   extracted copies of published packages. They are the merge base and
//!   the diff base for local edits.
//! - **Discovery (`graph`)**: every installed package whose manifest
//!   declares an override directory, found transitively through prefabs.
//! - **Patches (`patch`)**: whole-tree unified diffs whose headers record the
//!   base version they were taken against.
//! - **Merging (`merge`, `conflict`)**: three-way merges of whole trees with
//!   an external line merger, committed atomically.
//! - **Lifecycle (`prefab`, `install`, `remove`)**: an override directory is
//!   absent, materialized (full editable tree) or captured (patch only).
//!
//! ## Execution Flow
//!
//! `install` discovers the prefabs of a project and, for each, moves the
//! installed package into its override directory, merges an existing
//! override with a new upstream version, or expands a captured patch. The
//! installed location is replaced by a symlink to the override.
//!
//! `remove` discovers which prefabs become unreachable when packages are
//! removed, diffs each against its pristine cache entry and leaves only
//! the patch behind.

pub mod cache;
pub mod config;
pub mod conflict;
pub mod defaults;
pub mod error;
pub mod graph;
pub mod install;
pub mod manifest;
pub mod merge;
pub mod output;
pub mod patch;
pub mod path;
pub mod prefab;
pub mod registry;
pub mod remove;
