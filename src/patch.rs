//! # Whole-Tree Patches
//!
//! A prefab patch is a unified diff covering every file that differs
//! between a pristine cache entry and an edited override directory. Each
//! per-file block records its base in the old-side header:
//!
//! ```text
//! --- npm-@scope-pkg-1.0.0/index.ts	1.0.0
//! +++ index.ts
//! @@ -1,1 +1,2 @@
//!  console.log('Hello!');
//! +console.log('edited');
//! ```
//!
//! The old-side path starts with the cache entry key and the tab-separated
//! trailer repeats the exact version, so the base version of a patch can be
//! recovered from its text alone. A patch whose first header does not follow
//! this convention is rejected by [`Patch::parse`].
//!
//! Files that exist only in the override are diffed against empty text; a
//! new empty file is a block with headers and no hunks. Files removed from
//! the override are written with `+++ /dev/null` and are deleted again on
//! apply. `\ No newline at end of file` markers keep the round trip
//! byte-exact. Files that differ from the base but are not UTF-8 cannot be
//! represented and make [`create_patch`] fail.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use log::debug;
use regex::{Captures, Regex};

use crate::cache::{CacheKey, CACHE_PREFIX};
use crate::error::{Error, Result};
use crate::path::list_files;

/// Lines of unchanged context around each change.
const CONTEXT: usize = 3;

/// Largest LCS table computed before falling back to a full replacement
/// of the differing middle section.
const MAX_LCS_CELLS: usize = 4_000_000;

/// Name used on the new side of a block for a deleted file.
pub const DEV_NULL: &str = "/dev/null";

const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

/// Kind of a line inside a hunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Context,
    Removed,
    Added,
}

/// One line of a hunk, without its terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkLine {
    pub kind: LineKind,
    pub text: String,
    /// False for a final line that has no trailing newline
    pub newline: bool,
}

/// A contiguous region of changes with surrounding context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub lines: Vec<HunkLine>,
}

/// The diff block of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    /// Path relative to the package root, `/`-separated
    pub path: String,
    /// Cache entry key of the base version, e.g. `npm-@scope-pkg-1.0.0`
    pub base_key: String,
    /// Exact base version
    pub version: String,
    /// The file does not exist on the new side
    pub deleted: bool,
    /// Empty for a file created or deleted with no contents
    pub hunks: Vec<Hunk>,
}

/// A whole-tree patch: relative path to diff block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    files: BTreeMap<String, FileDiff>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TextLine<'a> {
    text: &'a str,
    newline: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal,
    Delete,
    Insert,
}

enum FileText {
    Missing,
    Text(String),
}

impl FileText {
    fn as_str(&self) -> &str {
        match self {
            FileText::Text(text) => text,
            FileText::Missing => "",
        }
    }
}

impl Patch {
    pub fn files(&self) -> impl Iterator<Item = &FileDiff> {
        self.files.values()
    }

    pub fn get(&self, path: &str) -> Option<&FileDiff> {
        self.files.get(path)
    }

    pub fn insert(&mut self, diff: FileDiff) {
        self.files.insert(diff.path.clone(), diff);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// The base version recorded in the first block.
    pub fn version(&self) -> Option<&str> {
        self.files.values().next().map(|d| d.version.as_str())
    }

    /// Parses patch text. `source` names the patch in error messages.
    pub fn parse(text: &str, source: &str) -> Result<Self> {
        let hunk_header = Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@")?;
        let format_err = |message: String| Error::PatchFormat {
            path: source.to_string(),
            message,
        };

        let mut lines: Vec<&str> = text.split('\n').collect();
        if lines.last() == Some(&"") {
            lines.pop();
        }

        let mut patch = Patch::default();
        let mut i = 0;
        while i < lines.len() {
            let Some(old_header) = lines[i].strip_prefix("--- ") else {
                i += 1;
                continue;
            };
            let (base_key, path, version) = parse_old_header(old_header).ok_or_else(|| {
                format_err(format!(
                    "line {}: header does not carry a prefab base version: {}",
                    i + 1,
                    lines[i]
                ))
            })?;
            i += 1;

            let new_header = lines
                .get(i)
                .and_then(|l| l.strip_prefix("+++ "))
                .ok_or_else(|| format_err(format!("line {}: expected '+++' header", i + 1)))?;
            let deleted = new_header.split('\t').next() == Some(DEV_NULL);
            i += 1;

            let mut hunks = Vec::new();
            while i < lines.len() && lines[i].starts_with("@@") {
                let caps = hunk_header.captures(lines[i]).ok_or_else(|| {
                    format_err(format!("line {}: malformed hunk header: {}", i + 1, lines[i]))
                })?;
                let (old_start, old_len) = (capture_num(&caps, 1, 0), capture_num(&caps, 2, 1));
                let (new_start, new_len) = (capture_num(&caps, 3, 0), capture_num(&caps, 4, 1));
                i += 1;

                let mut body: Vec<HunkLine> = Vec::new();
                let (mut old_seen, mut new_seen) = (0, 0);
                while old_seen < old_len || new_seen < new_len {
                    let raw = *lines
                        .get(i)
                        .ok_or_else(|| format_err(format!("unexpected end of hunk in {}", path)))?;
                    i += 1;
                    let (kind, text) = match raw.as_bytes().first() {
                        None => (LineKind::Context, ""),
                        Some(b' ') => (LineKind::Context, &raw[1..]),
                        Some(b'-') => (LineKind::Removed, &raw[1..]),
                        Some(b'+') => (LineKind::Added, &raw[1..]),
                        Some(b'\\') => {
                            if let Some(last) = body.last_mut() {
                                last.newline = false;
                            }
                            continue;
                        }
                        Some(_) => {
                            return Err(format_err(format!(
                                "line {}: unexpected line in hunk: {}",
                                i, raw
                            )))
                        }
                    };
                    match kind {
                        LineKind::Context => {
                            old_seen += 1;
                            new_seen += 1;
                        }
                        LineKind::Removed => old_seen += 1,
                        LineKind::Added => new_seen += 1,
                    }
                    body.push(HunkLine {
                        kind,
                        text: text.to_string(),
                        newline: true,
                    });
                }
                if old_seen != old_len || new_seen != new_len {
                    return Err(format_err(format!(
                        "hunk line counts do not match its header in {}",
                        path
                    )));
                }
                if lines.get(i).is_some_and(|l| l.starts_with('\\')) {
                    if let Some(last) = body.last_mut() {
                        last.newline = false;
                    }
                    i += 1;
                }

                hunks.push(Hunk {
                    old_start,
                    old_len,
                    new_start,
                    new_len,
                    lines: body,
                });
            }

            patch.insert(FileDiff {
                path,
                base_key,
                version,
                deleted,
                hunks,
            });
        }

        if patch.is_empty() {
            return Err(format_err("no prefab patch header found".to_string()));
        }
        Ok(patch)
    }

    /// Reads and parses a patch file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Applies every block to the files below `dir`.
    ///
    /// All blocks are applied in memory first; nothing is written unless
    /// every block applies. `source` names the patch in error messages.
    pub fn apply_to_dir(&self, dir: &Path, source: &Path) -> Result<()> {
        let apply_err = |message: String| Error::PatchApply {
            path: source.display().to_string(),
            message,
        };

        let mut results = Vec::with_capacity(self.files.len());
        for diff in self.files.values() {
            let file_path = dir.join(&diff.path);
            let current = match fs::read_to_string(&file_path) {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
                Err(e) => return Err(apply_err(format!("{}: {}", diff.path, e))),
            };
            let result = diff
                .apply(&current)
                .map_err(|message| apply_err(format!("{}: {}", diff.path, message)))?;
            results.push((file_path, result));
        }

        for (file_path, result) in results {
            match result {
                Some(text) => {
                    if let Some(parent) = file_path.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(&file_path, text)?;
                }
                None => {
                    if file_path.exists() {
                        fs::remove_file(&file_path)?;
                    }
                }
            }
            debug!("Patched {}", file_path.display());
        }
        Ok(())
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diff in self.files.values() {
            write!(f, "{}", diff)?;
        }
        Ok(())
    }
}

impl fmt::Display for FileDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- {}/{}\t{}", self.base_key, self.path, self.version)?;
        if self.deleted {
            writeln!(f, "+++ {}", DEV_NULL)?;
        } else {
            writeln!(f, "+++ {}", self.path)?;
        }
        for hunk in &self.hunks {
            writeln!(
                f,
                "@@ -{},{} +{},{} @@",
                hunk.old_start, hunk.old_len, hunk.new_start, hunk.new_len
            )?;
            for line in &hunk.lines {
                let prefix = match line.kind {
                    LineKind::Context => ' ',
                    LineKind::Removed => '-',
                    LineKind::Added => '+',
                };
                writeln!(f, "{}{}", prefix, line.text)?;
                if !line.newline {
                    writeln!(f, "{}", NO_NEWLINE_MARKER)?;
                }
            }
        }
        Ok(())
    }
}

impl FileDiff {
    /// Applies this block to `text`.
    ///
    /// Returns `None` when the block deletes the file. A hunk that does not
    /// match at its recorded position is searched for nearby, after the end
    /// of the previous hunk.
    pub fn apply(&self, text: &str) -> std::result::Result<Option<String>, String> {
        let lines = split_lines(text);
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        let mut shift: isize = 0;

        for (n, hunk) in self.hunks.iter().enumerate() {
            let old: Vec<TextLine> = hunk
                .lines
                .iter()
                .filter(|l| l.kind != LineKind::Added)
                .map(|l| TextLine {
                    text: &l.text,
                    newline: l.newline,
                })
                .collect();

            let recorded = if hunk.old_len == 0 {
                hunk.old_start
            } else {
                hunk.old_start.saturating_sub(1)
            };
            let expected = (recorded as isize + shift).max(cursor as isize) as usize;
            let pos = find_hunk(&lines, &old, expected, cursor)
                .ok_or_else(|| format!("hunk {} does not match", n + 1))?;
            shift = pos as isize - recorded as isize;

            for line in &lines[cursor..pos] {
                push_line(&mut out, line.text, line.newline);
            }
            for line in hunk.lines.iter().filter(|l| l.kind != LineKind::Removed) {
                push_line(&mut out, &line.text, line.newline);
            }
            cursor = pos + old.len();
        }

        if self.deleted {
            return Ok(None);
        }
        for line in &lines[cursor..] {
            push_line(&mut out, line.text, line.newline);
        }
        Ok(Some(out))
    }
}

/// Computes the patch turning `base` into `modified`.
///
/// Directories are compared recursively over the union of their files;
/// internal bookkeeping files are skipped. Two files produce a single
/// block named after `modified`. `key` is the cache entry `base` came from.
pub fn create_patch(base: &Path, modified: &Path, key: &CacheKey) -> Result<Patch> {
    let mut patch = Patch::default();
    let base_key = key.dir_name();

    if base.is_dir() || modified.is_dir() {
        let paths: BTreeSet<PathBuf> = list_files(base)?
            .into_iter()
            .chain(list_files(modified)?)
            .collect();
        for rel in paths {
            let rel_name = rel.to_string_lossy().replace('\\', "/");
            if let Some(diff) = diff_file(
                &base.join(&rel),
                &modified.join(&rel),
                &rel_name,
                &base_key,
                &key.version,
            )? {
                patch.insert(diff);
            }
        }
    } else {
        let name = modified
            .file_name()
            .or_else(|| base.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if let Some(diff) = diff_file(base, modified, &name, &base_key, &key.version)? {
            patch.insert(diff);
        }
    }

    Ok(patch)
}

/// Reads the base version recorded in a patch file.
pub fn version_from_patch_file(path: &Path) -> Result<String> {
    let patch = Patch::from_file(path)?;
    patch
        .version()
        .map(str::to_string)
        .ok_or_else(|| Error::PatchFormat {
            path: path.display().to_string(),
            message: "no prefab patch header found".to_string(),
        })
}

fn diff_file(
    old_path: &Path,
    new_path: &Path,
    rel_name: &str,
    base_key: &str,
    version: &str,
) -> Result<Option<FileDiff>> {
    let old = read_bytes(old_path)?;
    let new = read_bytes(new_path)?;
    if old == new {
        return Ok(None);
    }
    let (Some(old), Some(new)) = (decode(old), decode(new)) else {
        return Err(Error::UnencodableFile {
            path: rel_name.to_string(),
        });
    };

    // A differing pair always yields a block; one without hunks creates
    // or deletes an empty file.
    let deleted = matches!(new, FileText::Missing);
    Ok(Some(FileDiff {
        path: rel_name.to_string(),
        base_key: base_key.to_string(),
        version: version.to_string(),
        deleted,
        hunks: diff_hunks(old.as_str(), new.as_str()),
    }))
}

fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::fs("read", path, e)),
    }
}

/// `None` when the contents are not UTF-8.
fn decode(bytes: Option<Vec<u8>>) -> Option<FileText> {
    match bytes {
        None => Some(FileText::Missing),
        Some(bytes) => String::from_utf8(bytes).ok().map(FileText::Text),
    }
}

/// Splits the old-side header into cache key, relative path and version.
fn parse_old_header(header: &str) -> Option<(String, String, String)> {
    let (name, trailer) = match header.split_once('\t') {
        Some((name, trailer)) => (name, Some(trailer.trim())),
        None => (header.trim_end(), None),
    };
    if !name.starts_with(CACHE_PREFIX) {
        return None;
    }
    let (key, path) = name.split_once('/')?;
    if key.is_empty() || !is_safe_relative(path) {
        return None;
    }

    let version = trailer
        .filter(|t| semver::Version::parse(t).is_ok())
        .map(str::to_string)
        .or_else(|| version_from_key(key))?;
    Some((key.to_string(), path.to_string(), version))
}

/// Recovers the version from a cache key: the longest `-`-separated
/// suffix that is a valid version.
fn version_from_key(key: &str) -> Option<String> {
    key.match_indices('-')
        .map(|(idx, _)| &key[idx + 1..])
        .find(|candidate| semver::Version::parse(candidate).is_ok())
        .map(str::to_string)
}

fn is_safe_relative(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn capture_num(caps: &Captures, idx: usize, default: usize) -> usize {
    caps.get(idx)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(default)
}

fn split_lines(text: &str) -> Vec<TextLine<'_>> {
    text.split_inclusive('\n')
        .map(|line| match line.strip_suffix('\n') {
            Some(text) => TextLine {
                text,
                newline: true,
            },
            None => TextLine {
                text: line,
                newline: false,
            },
        })
        .collect()
}

fn push_line(out: &mut String, text: &str, newline: bool) {
    out.push_str(text);
    if newline {
        out.push('\n');
    }
}

/// Finds where `old` occurs in `lines`, at or after `cursor`, closest to
/// `expected`.
fn find_hunk(lines: &[TextLine], old: &[TextLine], expected: usize, cursor: usize) -> Option<usize> {
    let last = lines.len().checked_sub(old.len())?;
    if cursor > last {
        return None;
    }
    let matches_at = |pos: usize| lines[pos..pos + old.len()] == *old;
    let expected = expected.clamp(cursor, last);

    for distance in 0..=(last - cursor) {
        let forward = expected + distance;
        if forward <= last && matches_at(forward) {
            return Some(forward);
        }
        if let Some(backward) = expected.checked_sub(distance) {
            if distance > 0 && backward >= cursor && matches_at(backward) {
                return Some(backward);
            }
        }
    }
    None
}

/// Computes the hunks turning `old` into `new`.
fn diff_hunks(old: &str, new: &str) -> Vec<Hunk> {
    let old = split_lines(old);
    let new = split_lines(new);
    let ops = diff_ops(&old, &new);
    build_hunks(&ops, &old, &new)
}

fn diff_ops(old: &[TextLine], new: &[TextLine]) -> Vec<Op> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let max_suffix = old.len().min(new.len()) - prefix;
    let suffix = old
        .iter()
        .rev()
        .zip(new.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let mut ops = vec![Op::Equal; prefix];
    if old_mid.len().saturating_mul(new_mid.len()) > MAX_LCS_CELLS {
        ops.extend(std::iter::repeat(Op::Delete).take(old_mid.len()));
        ops.extend(std::iter::repeat(Op::Insert).take(new_mid.len()));
    } else {
        let table = lcs_table(old_mid, new_mid);
        ops.extend(backtrack(&table, old_mid, new_mid));
    }
    ops.extend(std::iter::repeat(Op::Equal).take(suffix));
    ops
}

/// Build the LCS length table for two slices of lines.
fn lcs_table(old: &[TextLine], new: &[TextLine]) -> Vec<Vec<u32>> {
    let m = old.len();
    let n = new.len();
    let mut table = vec![vec![0u32; n + 1]; m + 1];
    for i in 1..=m {
        for j in 1..=n {
            if old[i - 1] == new[j - 1] {
                table[i][j] = table[i - 1][j - 1] + 1;
            } else {
                table[i][j] = table[i - 1][j].max(table[i][j - 1]);
            }
        }
    }
    table
}

/// Backtrack through the LCS table to produce edit operations.
///
/// Within a changed region deletions come before insertions.
fn backtrack(table: &[Vec<u32>], old: &[TextLine], new: &[TextLine]) -> Vec<Op> {
    let mut ops = Vec::new();
    let mut i = old.len();
    let mut j = new.len();

    while i > 0 || j > 0 {
        if i > 0 && j > 0 && old[i - 1] == new[j - 1] {
            ops.push(Op::Equal);
            i -= 1;
            j -= 1;
        } else if j > 0 && (i == 0 || table[i][j - 1] >= table[i - 1][j]) {
            ops.push(Op::Insert);
            j -= 1;
        } else {
            ops.push(Op::Delete);
            i -= 1;
        }
    }

    ops.reverse();
    ops
}

fn build_hunks(ops: &[Op], old: &[TextLine], new: &[TextLine]) -> Vec<Hunk> {
    // Line positions before each op
    let mut old_pos = Vec::with_capacity(ops.len() + 1);
    let mut new_pos = Vec::with_capacity(ops.len() + 1);
    let (mut o, mut n) = (0, 0);
    for op in ops {
        old_pos.push(o);
        new_pos.push(n);
        match op {
            Op::Equal => {
                o += 1;
                n += 1;
            }
            Op::Delete => o += 1,
            Op::Insert => n += 1,
        }
    }
    old_pos.push(o);
    new_pos.push(n);

    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for (k, op) in ops.iter().enumerate() {
        if *op == Op::Equal {
            continue;
        }
        let start = k.saturating_sub(CONTEXT);
        let end = (k + 1 + CONTEXT).min(ops.len());
        match ranges.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => ranges.push((start, end)),
        }
    }

    ranges
        .into_iter()
        .map(|(start, end)| {
            let lines = (start..end)
                .map(|k| {
                    let (kind, line) = match ops[k] {
                        Op::Equal => (LineKind::Context, old[old_pos[k]]),
                        Op::Delete => (LineKind::Removed, old[old_pos[k]]),
                        Op::Insert => (LineKind::Added, new[new_pos[k]]),
                    };
                    HunkLine {
                        kind,
                        text: line.text.to_string(),
                        newline: line.newline,
                    }
                })
                .collect();
            let old_len = old_pos[end] - old_pos[start];
            let new_len = new_pos[end] - new_pos[start];
            Hunk {
                old_start: if old_len == 0 { old_pos[start] } else { old_pos[start] + 1 },
                old_len,
                new_start: if new_len == 0 { new_pos[start] } else { new_pos[start] + 1 },
                new_len,
                lines,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn key() -> CacheKey {
        CacheKey::new("@scope/pkg", "1.0.0")
    }

    fn file_diff(old: &str, new: &str) -> FileDiff {
        FileDiff {
            path: "file.txt".to_string(),
            base_key: key().dir_name(),
            version: "1.0.0".to_string(),
            deleted: false,
            hunks: diff_hunks(old, new),
        }
    }

    fn round_trip(old: &str, new: &str) -> String {
        let mut patch = Patch::default();
        patch.insert(file_diff(old, new));
        let parsed = Patch::parse(&patch.to_string(), "test.patch").unwrap();
        let diff = parsed.get("file.txt").unwrap();
        diff.apply(old).unwrap().unwrap()
    }

    #[test]
    fn test_identical_text_has_no_hunks() {
        assert!(diff_hunks("a\nb\n", "a\nb\n").is_empty());
    }

    #[test]
    fn test_serialized_format() {
        let mut patch = Patch::default();
        patch.insert(file_diff("console.log('Hello!');\n", "console.log('Hello!');\nedited();\n"));
        assert_eq!(
            patch.to_string(),
            concat!(
                "--- npm-@scope-pkg-1.0.0/file.txt\t1.0.0\n",
                "+++ file.txt\n",
                "@@ -1,1 +1,2 @@\n",
                " console.log('Hello!');\n",
                "+edited();\n"
            )
        );
    }

    #[test]
    fn test_hunks_are_grouped_with_context() {
        let old: String = (1..=20).map(|n| format!("{}\n", n)).collect();
        let new: String = (1..=20)
            .map(|n| match n {
                2 => "two\n".to_string(),
                19 => "nineteen\n".to_string(),
                n => format!("{}\n", n),
            })
            .collect();
        let hunks = diff_hunks(&old, &new);
        assert_eq!(hunks.len(), 2);
        assert_eq!((hunks[0].old_start, hunks[0].old_len), (1, 5));
        assert_eq!((hunks[1].old_start, hunks[1].old_len), (16, 5));
    }

    #[test]
    fn test_round_trip_edits() {
        let old = "a\nb\nc\nd\ne\n";
        let new = "a\nB\nc\ne\nf\n";
        assert_eq!(round_trip(old, new), new);
    }

    #[test]
    fn test_round_trip_missing_final_newline() {
        assert_eq!(round_trip("a\nb", "a\nb\n"), "a\nb\n");
        assert_eq!(round_trip("a\nb\n", "a\nb"), "a\nb");
        assert_eq!(round_trip("", "only"), "only");
        assert_eq!(round_trip("x\n", ""), "");
    }

    #[test]
    fn test_no_newline_marker_serialized() {
        let text = file_diff("a\n", "a\nb").to_string();
        assert!(text.contains("+b\n\\ No newline at end of file\n"));
    }

    #[test]
    fn test_apply_with_offset() {
        let old = "a\nb\nc\n";
        let diff = file_diff(old, "a\nB\nc\n");
        let shifted = "header 1\nheader 2\na\nb\nc\n";
        assert_eq!(
            diff.apply(shifted).unwrap().unwrap(),
            "header 1\nheader 2\na\nB\nc\n"
        );
    }

    #[test]
    fn test_apply_mismatch_fails() {
        let diff = file_diff("a\nb\nc\n", "a\nB\nc\n");
        let err = diff.apply("x\ny\nz\n").unwrap_err();
        assert!(err.contains("hunk 1 does not match"));
    }

    #[test]
    fn test_parse_rejects_foreign_patch() {
        let text = "--- a/index.ts\n+++ b/index.ts\n@@ -1 +1 @@\n-a\n+b\n";
        let err = Patch::parse(text, "foreign.patch").unwrap_err();
        assert!(matches!(err, Error::PatchFormat { .. }));
    }

    #[test]
    fn test_parse_rejects_empty_text() {
        assert!(matches!(
            Patch::parse("", "empty.patch"),
            Err(Error::PatchFormat { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_path_traversal() {
        let text = "--- npm-pkg-1.0.0/../../etc/passwd\t1.0.0\n+++ x\n@@ -0,0 +1,1 @@\n+x\n";
        assert!(matches!(
            Patch::parse(text, "evil.patch"),
            Err(Error::PatchFormat { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_short_hunk() {
        let text = "--- npm-pkg-1.0.0/a.txt\t1.0.0\n+++ a.txt\n@@ -1,2 +1,2 @@\n a\n";
        assert!(matches!(
            Patch::parse(text, "short.patch"),
            Err(Error::PatchFormat { .. })
        ));
    }

    #[test]
    fn test_version_recovered_from_key_without_trailer() {
        let text = "--- npm-@scope-pkg-1.2.3-beta.1/a.txt\n+++ a.txt\n@@ -0,0 +1 @@\n+a\n";
        let patch = Patch::parse(text, "p").unwrap();
        assert_eq!(patch.version(), Some("1.2.3-beta.1"));
        assert_eq!(patch.get("a.txt").unwrap().base_key, "npm-@scope-pkg-1.2.3-beta.1");
    }

    #[test]
    fn test_version_from_key() {
        assert_eq!(version_from_key("npm-pkg-1.0.0"), Some("1.0.0".to_string()));
        assert_eq!(
            version_from_key("npm-@scope-my-pkg-2.0.0-rc.1"),
            Some("2.0.0-rc.1".to_string())
        );
        assert_eq!(version_from_key("npm-pkg"), None);
    }

    #[test]
    fn test_create_patch_directories() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("base");
        let modified = temp.path().join("modified");
        fs::create_dir_all(base.join("src")).unwrap();
        fs::create_dir_all(modified.join("src")).unwrap();
        fs::write(base.join("same.txt"), "same\n").unwrap();
        fs::write(modified.join("same.txt"), "same\n").unwrap();
        fs::write(base.join("src/edit.ts"), "a\n").unwrap();
        fs::write(modified.join("src/edit.ts"), "a\nb\n").unwrap();
        fs::write(base.join("gone.txt"), "bye\n").unwrap();
        fs::write(modified.join("new.txt"), "hi\n").unwrap();
        fs::write(base.join(".prefab-metadata.json"), "{}").unwrap();

        let patch = create_patch(&base, &modified, &key()).unwrap();

        let paths: Vec<&str> = patch.files().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["gone.txt", "new.txt", "src/edit.ts"]);
        assert!(patch.get("gone.txt").unwrap().deleted);
        assert_eq!(patch.version(), Some("1.0.0"));
        assert!(patch.to_string().contains("+++ /dev/null"));
    }

    #[test]
    fn test_create_patch_single_file() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.txt");
        let b = temp.path().join("b.txt");
        fs::write(&a, "one\n").unwrap();
        fs::write(&b, "two\n").unwrap();

        let patch = create_patch(&a, &b, &key()).unwrap();
        assert_eq!(patch.len(), 1);
        assert!(patch.get("b.txt").is_some());
    }

    #[test]
    fn test_apply_to_dir_writes_and_deletes() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("base");
        let modified = temp.path().join("modified");
        fs::create_dir_all(&base).unwrap();
        fs::create_dir_all(modified.join("nested")).unwrap();
        fs::write(base.join("keep.txt"), "1\n2\n").unwrap();
        fs::write(modified.join("keep.txt"), "1\n2\n3\n").unwrap();
        fs::write(base.join("gone.txt"), "x\n").unwrap();
        fs::write(modified.join("nested/new.txt"), "new\n").unwrap();

        let patch = create_patch(&base, &modified, &key()).unwrap();
        let text = patch.to_string();
        let parsed = Patch::parse(&text, "p").unwrap();
        parsed.apply_to_dir(&base, Path::new("p")).unwrap();

        assert_eq!(fs::read_to_string(base.join("keep.txt")).unwrap(), "1\n2\n3\n");
        assert_eq!(fs::read_to_string(base.join("nested/new.txt")).unwrap(), "new\n");
        assert!(!base.join("gone.txt").exists());
    }

    #[test]
    fn test_apply_to_dir_writes_nothing_on_failure() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        fs::write(dir.join("a.txt"), "a\n").unwrap();
        fs::write(dir.join("b.txt"), "unexpected\n").unwrap();

        let mut patch = Patch::default();
        let mut a = file_diff("a\n", "A\n");
        a.path = "a.txt".to_string();
        let mut b = file_diff("b\n", "B\n");
        b.path = "b.txt".to_string();
        patch.insert(a);
        patch.insert(b);

        let err = patch
            .apply_to_dir(dir, Path::new("mod/mod.patch"))
            .unwrap_err();
        assert!(matches!(err, Error::PatchApply { ref path, .. } if path == "mod/mod.patch"));
        assert_eq!(fs::read_to_string(dir.join("a.txt")).unwrap(), "a\n");
    }

    #[test]
    fn test_version_from_patch_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("core.patch");
        let mut patch = Patch::default();
        patch.insert(file_diff("a\n", "b\n"));
        fs::write(&path, patch.to_string()).unwrap();

        assert_eq!(version_from_patch_file(&path).unwrap(), "1.0.0");
    }

    #[test]
    fn test_create_patch_keeps_new_empty_file() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("base");
        let modified = temp.path().join("modified");
        fs::create_dir_all(&base).unwrap();
        fs::create_dir_all(modified.join("assets")).unwrap();
        fs::write(base.join("index.ts"), "a\n").unwrap();
        fs::write(modified.join("index.ts"), "a\n").unwrap();
        fs::write(modified.join("assets/.gitkeep"), "").unwrap();

        let patch = create_patch(&base, &modified, &key()).unwrap();
        assert_eq!(patch.len(), 1);
        let text = patch.to_string();
        assert_eq!(
            text,
            "--- npm-@scope-pkg-1.0.0/assets/.gitkeep\t1.0.0\n+++ assets/.gitkeep\n"
        );

        Patch::parse(&text, "p")
            .unwrap()
            .apply_to_dir(&base, Path::new("p"))
            .unwrap();
        assert_eq!(fs::read_to_string(base.join("assets/.gitkeep")).unwrap(), "");
    }

    #[test]
    fn test_create_patch_deletes_empty_file() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("base");
        let modified = temp.path().join("modified");
        fs::create_dir_all(&base).unwrap();
        fs::create_dir_all(&modified).unwrap();
        fs::write(base.join("empty.txt"), "").unwrap();

        let patch = create_patch(&base, &modified, &key()).unwrap();
        assert!(patch.get("empty.txt").unwrap().deleted);

        Patch::parse(&patch.to_string(), "p")
            .unwrap()
            .apply_to_dir(&base, Path::new("p"))
            .unwrap();
        assert!(!base.join("empty.txt").exists());
    }

    #[test]
    fn test_create_patch_rejects_changed_binary_file() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("base");
        let modified = temp.path().join("modified");
        fs::create_dir_all(&base).unwrap();
        fs::create_dir_all(&modified).unwrap();
        fs::write(modified.join("logo.png"), [0x89, 0x50, 0xff, 0xfe, 0x00]).unwrap();

        let err = create_patch(&base, &modified, &key()).unwrap_err();
        assert!(matches!(err, Error::UnencodableFile { ref path } if path == "logo.png"));
    }

    #[test]
    fn test_create_patch_ignores_unchanged_binary_file() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("base");
        let modified = temp.path().join("modified");
        for dir in [&base, &modified] {
            fs::create_dir_all(dir).unwrap();
            fs::write(dir.join("logo.png"), [0x89, 0x50, 0xff, 0xfe, 0x00]).unwrap();
        }
        fs::write(modified.join("index.ts"), "new\n").unwrap();

        let patch = create_patch(&base, &modified, &key()).unwrap();
        let paths: Vec<&str> = patch.files().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["index.ts"]);
    }

    fn text_strategy() -> impl Strategy<Value = String> {
        (prop::collection::vec("[abc]{0,2}", 0..24), any::<bool>()).prop_map(|(lines, trailing)| {
            let mut text = lines.join("\n");
            if trailing && !text.is_empty() {
                text.push('\n');
            }
            text
        })
    }

    proptest! {
        #[test]
        fn prop_patch_round_trip(old in text_strategy(), new in text_strategy()) {
            prop_assume!(old != new);
            prop_assert_eq!(round_trip(&old, &new), new);
        }

        #[test]
        fn prop_diff_of_identical_text_is_empty(text in text_strategy()) {
            prop_assert!(diff_hunks(&text, &text).is_empty());
        }
    }
}
