//! # Three-Way Tree Merge
//!
//! Reconciles an edited override (`mine`) with a new upstream version
//! (`theirs`), using the pristine cache entry of the override's recorded
//! version as the common ancestor (`base`).
//!
//! Every relative path present in any of the three trees is merged on its
//! own. Files where at most one side changed are resolved directly; the
//! rest go through a [`LineMerger`], by default the external `diff3 -m`.
//! Textual conflicts are written out with conflict markers and reported in
//! the [`MergeReport`]; they are not errors.
//!
//! Merges run on a bounded `rayon` pool. Output is written to a staging
//! directory next to `mine`, and committed by renaming `mine` to
//! `<mine>.bkp`, the staging directory to `mine`, and deleting the backup.
//! Any hard failure before the commit leaves `mine` untouched.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::patch::DEV_NULL;
use crate::path::{list_files, remove_path};

/// Suffix of the backup `mine` is moved to during commit.
pub const BACKUP_SUFFIX: &str = ".bkp";

const STAGING_PREFIX: &str = ".prefab-merge-";

/// Result of merging one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutput {
    pub contents: Vec<u8>,
    /// The contents carry conflict markers
    pub conflicted: bool,
}

impl MergeOutput {
    pub fn clean(contents: Vec<u8>) -> Self {
        Self {
            contents,
            conflicted: false,
        }
    }
}

/// Trait for line-based three-way merging of a single file
///
/// An absent side is passed as `None` and treated as an empty file.
pub trait LineMerger: Send + Sync {
    fn merge(
        &self,
        file: &str,
        mine: Option<&Path>,
        base: Option<&Path>,
        theirs: Option<&Path>,
    ) -> Result<MergeOutput>;
}

/// [`LineMerger`] running the external `diff3 -m`
///
/// Exit status 0 is a clean merge, 1 a merge with conflicts; anything else
/// is a hard failure.
#[derive(Debug, Clone)]
pub struct Diff3 {
    program: PathBuf,
}

impl Default for Diff3 {
    fn default() -> Self {
        Self {
            program: PathBuf::from("diff3"),
        }
    }
}

impl Diff3 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific executable instead of `diff3` from `PATH`.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Returns true if the executable can be run.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }
}

impl LineMerger for Diff3 {
    fn merge(
        &self,
        file: &str,
        mine: Option<&Path>,
        base: Option<&Path>,
        theirs: Option<&Path>,
    ) -> Result<MergeOutput> {
        let side = |path: Option<&Path>| path.unwrap_or(Path::new(DEV_NULL)).to_path_buf();

        let output = Command::new(&self.program)
            .args(["-m", "-L", "mine", "-L", "base", "-L", "theirs"])
            .arg(side(mine))
            .arg(side(base))
            .arg(side(theirs))
            .output()
            .map_err(|e| Error::MergeTool {
                file: file.to_string(),
                message: format!("failed to run {}: {}", self.program.display(), e),
            })?;

        match output.status.code() {
            Some(0) => Ok(MergeOutput::clean(output.stdout)),
            Some(1) => Ok(MergeOutput {
                contents: output.stdout,
                conflicted: true,
            }),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(Error::MergeTool {
                    file: file.to_string(),
                    message: if stderr.trim().is_empty() {
                        output.status.to_string()
                    } else {
                        stderr.trim().to_string()
                    },
                })
            }
        }
    }
}

/// Files written by a tree merge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Every file in the committed tree
    pub merged: Vec<String>,
    /// Files that contain conflict markers
    pub conflicted: Vec<String>,
}

impl MergeReport {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicted.is_empty()
    }
}

enum FileOutcome {
    Written { name: String, conflicted: bool },
    Dropped,
}

/// Merges `base -> theirs` into `mine`, replacing `mine` with the result.
///
/// At most `jobs` files are merged at once.
pub fn merge_trees(
    mine: &Path,
    base: &Path,
    theirs: &Path,
    merger: &dyn LineMerger,
    jobs: usize,
) -> Result<MergeReport> {
    recover_stale_backup(mine)?;

    let files: BTreeSet<PathBuf> = list_files(mine)?
        .into_iter()
        .chain(list_files(base)?)
        .chain(list_files(theirs)?)
        .collect();
    let files: Vec<PathBuf> = files.into_iter().collect();
    debug!("Merging {} files into {}", files.len(), mine.display());

    let parent = staging_parent(mine);
    fs::create_dir_all(&parent).map_err(|e| Error::fs("create", &parent, e))?;
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(&parent)
        .map_err(|e| Error::fs("create staging directory in", &parent, e))?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .map_err(|e| Error::Filesystem {
            message: format!("failed to start merge workers: {}", e),
        })?;

    let outcomes = pool.install(|| {
        files
            .par_iter()
            .map(|rel| merge_file(rel, mine, base, theirs, staging.path(), merger))
            .collect::<Result<Vec<_>>>()
    })?;

    let mut report = MergeReport::default();
    for outcome in outcomes {
        if let FileOutcome::Written { name, conflicted } = outcome {
            if conflicted {
                report.conflicted.push(name.clone());
            }
            report.merged.push(name);
        }
    }

    commit(staging.keep(), mine)?;

    if report.has_conflicts() {
        warn!(
            "Merged {} with conflicts in: {}",
            mine.display(),
            report.conflicted.join(", ")
        );
    } else {
        info!("Merged {} ({} files)", mine.display(), report.merged.len());
    }
    Ok(report)
}

/// Cleans up after a merge that was interrupted during commit.
///
/// If `<mine>.bkp` exists alongside `mine`, the new tree was already in
/// place and the backup is deleted. If only the backup exists, it is moved
/// back to `mine`. Leftover staging directories next to `mine` are removed.
/// Returns true if a backup was found.
pub fn recover_stale_backup(mine: &Path) -> Result<bool> {
    let parent = staging_parent(mine);
    if let Ok(entries) = fs::read_dir(&parent) {
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
                debug!("Removing leftover staging directory {}", entry.path().display());
                remove_path(&entry.path())?;
            }
        }
    }

    let backup = backup_path(mine);
    if fs::symlink_metadata(&backup).is_err() {
        return Ok(false);
    }

    if fs::symlink_metadata(mine).is_ok() {
        warn!("Removing stale merge backup {}", backup.display());
        remove_path(&backup)?;
    } else {
        warn!(
            "Restoring {} from stale merge backup {}",
            mine.display(),
            backup.display()
        );
        fs::rename(&backup, mine).map_err(|e| Error::fs("rename", &backup, e))?;
    }
    Ok(true)
}

/// `<mine>.bkp`
pub fn backup_path(mine: &Path) -> PathBuf {
    let mut name = OsString::from(mine.as_os_str());
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

fn staging_parent(mine: &Path) -> PathBuf {
    match mine.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn commit(staged: PathBuf, mine: &Path) -> Result<()> {
    let backup = backup_path(mine);
    let had_mine = fs::symlink_metadata(mine).is_ok();
    if had_mine {
        if let Err(e) = fs::rename(mine, &backup) {
            let _ = fs::remove_dir_all(&staged);
            return Err(Error::fs("rename", mine, e));
        }
    }

    if let Err(e) = fs::rename(&staged, mine) {
        if had_mine {
            let _ = fs::rename(&backup, mine);
        }
        let _ = fs::remove_dir_all(&staged);
        return Err(Error::fs("rename", &staged, e));
    }

    if had_mine {
        remove_path(&backup)?;
    }
    Ok(())
}

fn read_side(path: &Path) -> Result<Option<Vec<u8>>> {
    if !path.is_file() {
        return Ok(None);
    }
    fs::read(path)
        .map(Some)
        .map_err(|e| Error::fs("read", path, e))
}

fn merge_file(
    rel: &Path,
    mine_root: &Path,
    base_root: &Path,
    theirs_root: &Path,
    out_root: &Path,
    merger: &dyn LineMerger,
) -> Result<FileOutcome> {
    let name = rel.to_string_lossy().replace('\\', "/");
    let mine = mine_root.join(rel);
    let base = base_root.join(rel);
    let theirs = theirs_root.join(rel);

    let mine_bytes = read_side(&mine)?;
    let base_bytes = read_side(&base)?;
    let theirs_bytes = read_side(&theirs)?;

    // Only run the line merger when both sides changed
    let resolved = if mine_bytes == theirs_bytes || base_bytes == theirs_bytes {
        mine_bytes.map(MergeOutput::clean)
    } else if base_bytes == mine_bytes {
        theirs_bytes.map(MergeOutput::clean)
    } else {
        let present = |path: &Path| path.is_file().then(|| path.to_path_buf());
        Some(merger.merge(
            &name,
            present(&mine).as_deref(),
            present(&base).as_deref(),
            present(&theirs).as_deref(),
        )?)
    };

    let Some(output) = resolved else {
        debug!("Dropping deleted file {}", name);
        return Ok(FileOutcome::Dropped);
    };

    let target = out_root.join(rel);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::fs("create", parent, e))?;
    }
    fs::write(&target, &output.contents).map_err(|e| Error::fs("write", &target, e))?;

    let mode_source = if mine.is_file() { &mine } else { &theirs };
    if let Ok(metadata) = fs::metadata(mode_source) {
        fs::set_permissions(&target, metadata.permissions())
            .map_err(|e| Error::fs("set permissions on", &target, e))?;
    }

    if output.conflicted {
        debug!("Conflicts in {}", name);
    }
    Ok(FileOutcome::Written {
        name,
        conflicted: output.conflicted,
    })
}
