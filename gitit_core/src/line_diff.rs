//! Line-level diffs between two text buffers, backed by libgit2's xdiff.

use git2::{DiffOptions, Patch};
use gitit_api::{HunkLine, LineHunk, LineKind};

use crate::Result;

/// Unchanged lines kept around each hunk unless configured otherwise.
pub const DEFAULT_CONTEXT_LINES: u32 = 3;

/// Diff `old` against `new` with [`DEFAULT_CONTEXT_LINES`] of context.
///
/// An empty string stands in for a side that does not exist. Identical
/// inputs produce no hunks.
///
/// # Errors
///
/// Returns an error if libgit2 fails to build the patch.
pub fn diff_lines(old: &str, new: &str) -> Result<Vec<LineHunk>> {
    diff_lines_with_context(old, new, DEFAULT_CONTEXT_LINES)
}

/// Diff `old` against `new` keeping `context` unchanged lines around hunks.
///
/// Content is always diffed as text, even if it looks binary. The
/// "no newline at end of file" markers are not reported as lines.
///
/// # Errors
///
/// Returns an error if libgit2 fails to build the patch.
pub fn diff_lines_with_context(old: &str, new: &str, context: u32) -> Result<Vec<LineHunk>> {
    if old == new {
        return Ok(Vec::new());
    }

    let mut opts = DiffOptions::new();
    opts.force_text(true).context_lines(context);
    let patch = Patch::from_buffers(old.as_bytes(), None, new.as_bytes(), None, Some(&mut opts))?;

    let mut hunks = Vec::with_capacity(patch.num_hunks());
    for hunk_idx in 0..patch.num_hunks() {
        let (hunk, line_count) = patch.hunk(hunk_idx)?;
        let mut lines = Vec::with_capacity(line_count);
        for line_idx in 0..line_count {
            let line = patch.line_in_hunk(hunk_idx, line_idx)?;
            let Some(kind) = line_kind(line.origin()) else {
                continue;
            };
            lines.push(HunkLine {
                kind,
                text: line_text(line.content()),
                old_line: line.old_lineno(),
                new_line: line.new_lineno(),
            });
        }

        hunks.push(LineHunk {
            old_start: hunk.old_start(),
            old_lines: hunk.old_lines(),
            new_start: hunk.new_start(),
            new_lines: hunk.new_lines(),
            lines,
        });
    }

    Ok(hunks)
}

const fn line_kind(origin: char) -> Option<LineKind> {
    match origin {
        ' ' => Some(LineKind::Context),
        '+' => Some(LineKind::Addition),
        '-' => Some(LineKind::Deletion),
        _ => None,
    }
}

fn line_text(content: &[u8]) -> String {
    let text = String::from_utf8_lossy(content);
    let text = text.strip_suffix('\n').unwrap_or(&*text);
    text.strip_suffix('\r').unwrap_or(text).to_owned()
}
