//! Commit-comparison engine for gitit's per-learner repositories.
//!
//! The crate is layered around three responsibilities:
//! - repository access on top of libgit2, exposed through the
//!   [`gitit_store::ObjectStore`] seam
//! - tree walking, line diffing, and change statistics between commits
//! - serialized per-repository sessions for the request layer

#![warn(
    clippy::all,
    clippy::cargo,
    clippy::nursery,
    clippy::pedantic,
    missing_docs
)]
#![cfg_attr(
    not(test),
    deny(
        clippy::dbg_macro,
        clippy::expect_used,
        clippy::panic,
        clippy::print_stderr,
        clippy::print_stdout,
        clippy::todo,
        clippy::unwrap_used
    )
)]

use std::sync::PoisonError;

/// Commit orchestration: write a commit and report what it changed.
pub mod commit;
/// Layered configuration (TOML file plus environment overrides).
pub mod config;
/// Commit-to-commit diffing.
pub mod diff;
/// Line-level diffs between two text buffers.
pub mod line_diff;
/// Tracing subscriber setup.
pub mod logging;
/// Git repository access built on libgit2.
pub mod repository;
/// Serialized per-repository sessions and the learner workspace.
pub mod session;
/// Reduction of per-path diffs into summary counts.
pub mod stats;
/// Depth-first enumeration of blobs reachable from a commit.
pub mod walker;

pub use commit::{commit_and_stat, commit_and_stat_with, initial_commit_and_stat};
pub use config::{ConfigError, CoreConfig};
pub use diff::DiffEngine;
pub use gitit_api::{
    Author, ChangeStats, CommitDiff, CommitInfo, CommitOutcome, FileState, HunkLine, LineHunk,
    LineKind, ObjectId, ObjectKind, PathDiff, TreeEntry,
};
pub use gitit_store::{MemoryStore, ObjectStore, StoreError, CONTROL_DIR, HEAD};
pub use line_diff::diff_lines;
pub use repository::GitRepository;
pub use session::{RepoSession, Workspace};
pub use stats::aggregate;
pub use walker::{walk, CancelToken, TreeWalk, WalkOptions};

/// Common result type for the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the core library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying git operation failed.
    #[error("git error: {source}")]
    Git {
        /// Original libgit2 error bubbled up by the core library.
        #[from]
        source: git2::Error,
    },
    /// Object store read or write failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Provided path does not correspond to a git repository.
    #[error("path does not reference a git repository: {path}")]
    NotARepository {
        /// Path that failed to resolve to a repository.
        path: String,
    },
    /// Bare repositories are currently unsupported.
    #[error("repository at {path} is bare and unsupported")]
    BareRepository {
        /// Path of the repository lacking a working tree.
        path: String,
    },
    /// Filesystem interaction failed.
    #[error("failed to access {path}: {source}")]
    Io {
        /// Filesystem path involved in the failed operation.
        path: String,
        /// Source I/O error returned by the standard library.
        #[source]
        source: std::io::Error,
    },
    /// `HEAD` does not resolve because nothing has been committed yet.
    #[error("repository has no commits yet")]
    NoCommitsYet,
    /// The commit was written but its change statistics could not be computed.
    #[error("commit {commit_id} was written but its stats are unavailable: {source}")]
    StatsUnavailable {
        /// Commit that is now durably part of the repository.
        commit_id: ObjectId,
        /// Failure raised while diffing or aggregating.
        #[source]
        source: Box<Error>,
    },
    /// A tree nests deeper than the configured limit.
    #[error("tree at '{path}' exceeds the maximum depth of {limit}")]
    TreeTooDeep {
        /// Directory path at which the limit was hit.
        path: String,
        /// Configured maximum depth.
        limit: usize,
    },
    /// The operation was cancelled through its [`CancelToken`].
    #[error("operation cancelled")]
    Cancelled,
    /// A working-tree path was rejected.
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// Path supplied by the caller.
        path: String,
        /// Why the path was rejected.
        reason: &'static str,
    },
    /// Path is neither on disk nor tracked.
    #[error("no such file in repository: {path}")]
    MissingFile {
        /// Path supplied by the caller.
        path: String,
    },
    /// Repository names map to a single directory under the repos root.
    #[error("invalid repository name: {name:?}")]
    InvalidRepositoryName {
        /// Name supplied by the caller.
        name: String,
    },
    /// A session lock was poisoned by a panicking holder.
    #[error("repository lock poisoned")]
    Poisoned,
}

impl Error {
    /// The commit id when the commit itself succeeded but stats did not.
    #[must_use]
    pub const fn committed_id(&self) -> Option<&ObjectId> {
        match self {
            Self::StatsUnavailable { commit_id, .. } => Some(commit_id),
            _ => None,
        }
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_: PoisonError<T>) -> Self {
        Self::Poisoned
    }
}
