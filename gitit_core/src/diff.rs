//! Diff generation between two commits, path by path.

use std::collections::HashMap;

use gitit_api::{CommitDiff, ObjectId, PathDiff};
use gitit_store::ObjectStore;

use crate::config::CoreConfig;
use crate::line_diff::{diff_lines_with_context, DEFAULT_CONTEXT_LINES};
use crate::walker::{walk, CancelToken, WalkOptions};
use crate::Result;

/// Default nesting limit for tree walks started by the engine. Matches the
/// default of git's `core.maxTreeDepth`.
pub const DEFAULT_MAX_TREE_DEPTH: usize = 4096;

/// Entry point for diff generation between two commits.
#[derive(Debug, Clone)]
pub struct DiffEngine {
    context_lines: u32,
    max_tree_depth: Option<usize>,
    cancel: Option<CancelToken>,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self {
            context_lines: DEFAULT_CONTEXT_LINES,
            max_tree_depth: Some(DEFAULT_MAX_TREE_DEPTH),
            cancel: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Old,
    New,
}

#[derive(Debug)]
struct Pending {
    path: String,
    old_blob: Option<ObjectId>,
    old: Option<String>,
    new: Option<String>,
    unchanged: bool,
}

impl DiffEngine {
    /// Construct a new diff engine instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine honoring the context width and depth limit from `config`.
    #[must_use]
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            context_lines: config.context_lines,
            max_tree_depth: Some(config.max_tree_depth),
            cancel: None,
        }
    }

    /// Abort diffs when `token` is cancelled.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Override the number of context lines around each hunk.
    #[must_use]
    pub const fn with_context_lines(mut self, context_lines: u32) -> Self {
        self.context_lines = context_lines;
        self
    }

    /// Walk limits applied to both sides of a diff.
    #[must_use]
    pub fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            max_depth: self.max_tree_depth,
            cancel: self.cancel.clone(),
        }
    }

    /// Compute the per-path changes from `old` to `new`.
    ///
    /// Only added, deleted, or content-modified paths are returned, in the
    /// order they were first seen (old tree first). A blob that cannot be
    /// read is treated as absent on that side.
    ///
    /// # Errors
    ///
    /// Fails if either commit or any tree under it cannot be read, if a walk
    /// limit is hit, or if a line diff cannot be built.
    #[tracing::instrument(skip_all, fields(old = %old.short(), new = %new.short()))]
    pub fn diff<S>(&self, store: &S, old: &ObjectId, new: &ObjectId) -> Result<CommitDiff>
    where
        S: ObjectStore + ?Sized,
    {
        let mut pending = Vec::new();
        let mut index = HashMap::new();
        self.collect(store, old, Side::Old, &mut pending, &mut index)?;
        self.collect(store, new, Side::New, &mut pending, &mut index)?;
        self.finish(pending)
    }

    /// Report every blob in `new` as added, for a commit with no parent.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`DiffEngine::diff`].
    #[tracing::instrument(skip_all, fields(new = %new.short()))]
    pub fn diff_from_empty<S>(&self, store: &S, new: &ObjectId) -> Result<CommitDiff>
    where
        S: ObjectStore + ?Sized,
    {
        let mut pending = Vec::new();
        let mut index = HashMap::new();
        self.collect(store, new, Side::New, &mut pending, &mut index)?;
        self.finish(pending)
    }

    /// Resolve two references (branch names, `HEAD`) and diff them.
    ///
    /// # Errors
    ///
    /// Fails if either reference is missing or the diff itself fails.
    pub fn diff_refs<S>(&self, store: &S, old_ref: &str, new_ref: &str) -> Result<CommitDiff>
    where
        S: ObjectStore + ?Sized,
    {
        let old = store.resolve_ref(old_ref)?;
        let new = store.resolve_ref(new_ref)?;
        self.diff(store, &old, &new)
    }

    fn collect<S>(
        &self,
        store: &S,
        commit: &ObjectId,
        side: Side,
        pending: &mut Vec<Pending>,
        index: &mut HashMap<String, usize>,
    ) -> Result<()>
    where
        S: ObjectStore + ?Sized,
    {
        for item in walk(store, commit, self.walk_options()) {
            let (path, blob) = item?;

            if let Side::New = side {
                // Same id means same bytes, so there is nothing to read.
                if let Some(&slot) = index.get(&path) {
                    let record: &mut Pending = &mut pending[slot];
                    if record.old_blob.as_ref() == Some(&blob) {
                        record.unchanged = true;
                        continue;
                    }
                }
            }

            let content = match store.read_blob(&blob) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(err) => {
                    tracing::warn!(%path, blob = %blob.short(), error = %err, "skipping unreadable blob");
                    continue;
                }
            };

            let slot = *index.entry(path.clone()).or_insert_with(|| {
                pending.push(Pending {
                    path,
                    old_blob: None,
                    old: None,
                    new: None,
                    unchanged: false,
                });
                pending.len() - 1
            });
            let record = &mut pending[slot];
            match side {
                Side::Old => {
                    record.old_blob = Some(blob);
                    record.old = Some(content);
                }
                Side::New => record.new = Some(content),
            }
        }
        Ok(())
    }

    fn finish(&self, pending: Vec<Pending>) -> Result<CommitDiff> {
        let mut files = Vec::with_capacity(pending.len());
        for record in pending {
            if record.unchanged {
                continue;
            }

            let hunks = diff_lines_with_context(
                record.old.as_deref().unwrap_or_default(),
                record.new.as_deref().unwrap_or_default(),
                self.context_lines,
            )?;
            let added = record.old.is_none();
            let deleted = record.new.is_none();
            if !added && !deleted && hunks.is_empty() {
                continue;
            }

            files.push(PathDiff {
                path: record.path,
                old_content: record.old,
                new_content: record.new,
                added,
                deleted,
                hunks,
            });
        }

        tracing::debug!(files = files.len(), "diff complete");
        Ok(CommitDiff::from_records(files))
    }
}
