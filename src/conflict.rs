//! Conflict-aware reading of merged files
//!
//! A three-way merge that cannot reconcile both sides leaves conflict
//! markers in the file:
//!
//! ```text
//! <<<<<<< mine
//! local line
//! ||||||| base
//! original line
//! =======
//! upstream line
//! >>>>>>> theirs
//! ```
//!
//! [`split_conflicts`] turns such text back into the two complete variants
//! so that a file like a package manifest can still be parsed from either
//! side. The `|||||||` base section is optional and is dropped.

use std::fs;
use std::path::Path;

use crate::error::Result;

/// Start of the local side of a conflict region.
pub const CONFLICT_MINE: &str = "<<<<<<<";
/// Start of the optional base section of a conflict region.
pub const CONFLICT_BASE: &str = "|||||||";
/// Separator between the local and upstream sides.
pub const CONFLICT_YOURS: &str = "=======";
/// End of a conflict region.
pub const CONFLICT_END: &str = ">>>>>>>";

/// One file's text, split by conflict regions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictSplit {
    /// The text contains no conflict region.
    Unified(String),
    /// The text contains at least one conflict region.
    ///
    /// `mine` and `yours` are complete, independent texts: everything
    /// outside conflict regions appears in both.
    Split { mine: String, yours: String },
}

impl ConflictSplit {
    /// Returns true if at least one conflict region was found.
    pub fn has_conflicts(&self) -> bool {
        matches!(self, ConflictSplit::Split { .. })
    }

    /// The upstream view: the unified text, or the `yours` side.
    pub fn yours(&self) -> &str {
        match self {
            ConflictSplit::Unified(text) => text,
            ConflictSplit::Split { yours, .. } => yours,
        }
    }

    /// The local view: the unified text, or the `mine` side.
    pub fn mine(&self) -> &str {
        match self {
            ConflictSplit::Unified(text) => text,
            ConflictSplit::Split { mine, .. } => mine,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Region {
    None,
    Mine,
    Base,
    Yours,
}

/// Splits `text` into its unified form or its `mine`/`yours` variants.
///
/// Line terminators are preserved, so a file without conflicts round-trips
/// byte for byte. A marker only counts when it appears in the expected
/// order; an unterminated region is kept as conflict content.
pub fn split_conflicts(text: &str) -> ConflictSplit {
    let mut unified = String::new();
    let mut mine = String::new();
    let mut yours = String::new();
    let mut seen_conflict = false;
    let mut region = Region::None;

    for line in text.split_inclusive('\n') {
        match region {
            Region::None if line.starts_with(CONFLICT_MINE) => {
                if !seen_conflict {
                    mine.push_str(&unified);
                    yours.push_str(&unified);
                    seen_conflict = true;
                }
                region = Region::Mine;
            }
            Region::Mine if line.starts_with(CONFLICT_BASE) => region = Region::Base,
            Region::Mine | Region::Base if line.starts_with(CONFLICT_YOURS) => {
                region = Region::Yours
            }
            Region::Yours if line.starts_with(CONFLICT_END) => region = Region::None,
            Region::None if seen_conflict => {
                mine.push_str(line);
                yours.push_str(line);
            }
            Region::None => unified.push_str(line),
            Region::Mine => mine.push_str(line),
            Region::Base => {}
            Region::Yours => yours.push_str(line),
        }
    }

    if seen_conflict {
        ConflictSplit::Split { mine, yours }
    } else {
        ConflictSplit::Unified(unified)
    }
}

/// Reads a file that may contain unresolved conflict markers.
pub fn read_maybe_conflicted(path: &Path) -> Result<ConflictSplit> {
    let text = fs::read_to_string(path)?;
    Ok(split_conflicts(&text))
}
