use serde::{Deserialize, Serialize};

use super::object::ObjectId;

/// The set of paths that differ between two commits, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CommitDiff {
    /// Per-path records; only genuinely changed paths are present.
    #[serde(default)]
    pub files: Vec<PathDiff>,
}

impl CommitDiff {
    /// Build a diff from records already filtered to real changes.
    #[must_use]
    pub fn from_records(files: Vec<PathDiff>) -> Self {
        Self { files }
    }

    /// Look up the record for a path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&PathDiff> {
        self.files.iter().find(|file| file.path == path)
    }

    /// Whether the diff reports a change for `path`.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Iterate over changed paths.
    pub fn paths(&self) -> impl Iterator<Item = &str> + '_ {
        self.files.iter().map(|file| file.path.as_str())
    }

    /// Iterate over the per-path records.
    pub fn iter(&self) -> std::slice::Iter<'_, PathDiff> {
        self.files.iter()
    }

    /// Number of changed paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// True when the two commits have identical file content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl IntoIterator for CommitDiff {
    type Item = PathDiff;
    type IntoIter = std::vec::IntoIter<PathDiff>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

impl<'a> IntoIterator for &'a CommitDiff {
    type Item = &'a PathDiff;
    type IntoIter = std::slice::Iter<'a, PathDiff>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

/// Change record for a single path between two commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathDiff {
    /// Slash-separated path relative to the repository root.
    pub path: String,
    /// Content on the old side, absent when the path did not exist there.
    #[serde(default)]
    pub old_content: Option<String>,
    /// Content on the new side, absent when the path no longer exists.
    #[serde(default)]
    pub new_content: Option<String>,
    /// Set when there was no old-side content.
    #[serde(default)]
    pub added: bool,
    /// Set when there is no new-side content.
    #[serde(default)]
    pub deleted: bool,
    /// Line hunks between the two sides.
    #[serde(default)]
    pub hunks: Vec<LineHunk>,
}

impl PathDiff {
    /// Number of added lines across all hunks.
    #[must_use]
    pub fn insertions(&self) -> usize {
        self.hunks.iter().map(LineHunk::insertions).sum()
    }

    /// Number of removed lines across all hunks.
    #[must_use]
    pub fn deletions(&self) -> usize {
        self.hunks.iter().map(LineHunk::deletions).sum()
    }
}

/// A contiguous block of a line-level diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineHunk {
    /// 1-based first line on the old side (0 when the old side is empty).
    pub old_start: u32,
    /// Number of old-side lines covered.
    pub old_lines: u32,
    /// 1-based first line on the new side (0 when the new side is empty).
    pub new_start: u32,
    /// Number of new-side lines covered.
    pub new_lines: u32,
    /// Tagged lines in display order.
    #[serde(default)]
    pub lines: Vec<HunkLine>,
}

impl LineHunk {
    /// Lines tagged as additions.
    #[must_use]
    pub fn insertions(&self) -> usize {
        self.count(LineKind::Addition)
    }

    /// Lines tagged as deletions.
    #[must_use]
    pub fn deletions(&self) -> usize {
        self.count(LineKind::Deletion)
    }

    fn count(&self, kind: LineKind) -> usize {
        self.lines.iter().filter(|line| line.kind == kind).count()
    }
}

/// A single tagged line within a hunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HunkLine {
    /// Role of the line.
    pub kind: LineKind,
    /// Line text without its trailing newline.
    pub text: String,
    /// 1-based old-side line number, for context and deletions.
    #[serde(default)]
    pub old_line: Option<u32>,
    /// 1-based new-side line number, for context and additions.
    #[serde(default)]
    pub new_line: Option<u32>,
}

impl HunkLine {
    /// Unified-diff marker for the line (`' '`, `'+'`, or `'-'`).
    #[must_use]
    pub const fn marker(&self) -> char {
        match self.kind {
            LineKind::Context => ' ',
            LineKind::Addition => '+',
            LineKind::Deletion => '-',
        }
    }
}

/// Type of a line contained in a hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    /// Unchanged context line.
    Context,
    /// A newly added line.
    Addition,
    /// A removed line.
    Deletion,
}

/// Summary counts for a commit, serialized as `{ file, plus, minus }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChangeStats {
    /// Number of changed paths.
    #[serde(rename = "file")]
    pub files_changed: usize,
    /// Number of added lines.
    #[serde(rename = "plus")]
    pub insertions: usize,
    /// Number of removed lines.
    #[serde(rename = "minus")]
    pub deletions: usize,
}

impl ChangeStats {
    /// Stats with every count at zero.
    pub const ZERO: Self = Self {
        files_changed: 0,
        insertions: 0,
        deletions: 0,
    };

    /// Convenience constructor for explicit values.
    #[must_use]
    pub const fn new(files_changed: usize, insertions: usize, deletions: usize) -> Self {
        Self {
            files_changed,
            insertions,
            deletions,
        }
    }

    /// Combine two stats structs.
    #[must_use]
    pub const fn add(self, other: Self) -> Self {
        Self {
            files_changed: self.files_changed + other.files_changed,
            insertions: self.insertions + other.insertions,
            deletions: self.deletions + other.deletions,
        }
    }
}

/// Result of committing: the new commit id and what it changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitOutcome {
    /// Identifier of the commit that was written.
    pub commit_id: ObjectId,
    /// Change counts relative to the previous HEAD.
    pub stats: ChangeStats,
}
