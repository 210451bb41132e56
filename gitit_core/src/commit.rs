//! Commit orchestration: seal the staged content and report what changed.

use gitit_api::{Author, CommitOutcome, ObjectId};
use gitit_store::{ObjectStore, StoreError, HEAD};

use crate::diff::DiffEngine;
use crate::stats::aggregate;
use crate::{Error, Result};

/// Commit the staged content on top of `HEAD` and return the new commit id
/// with its change counts against the previous `HEAD`.
///
/// # Errors
///
/// Returns [`Error::NoCommitsYet`] without writing anything when `HEAD` does
/// not resolve. Once the commit is written, diff or aggregation failures are
/// reported as [`Error::StatsUnavailable`] and the commit is kept.
pub fn commit_and_stat<S>(store: &S, message: &str, author: &Author) -> Result<CommitOutcome>
where
    S: ObjectStore + ?Sized,
{
    commit_and_stat_with(&DiffEngine::default(), store, message, author)
}

/// [`commit_and_stat`] using an explicitly configured engine.
///
/// # Errors
///
/// Same as [`commit_and_stat`].
#[tracing::instrument(skip_all, fields(message = %message))]
pub fn commit_and_stat_with<S>(
    engine: &DiffEngine,
    store: &S,
    message: &str,
    author: &Author,
) -> Result<CommitOutcome>
where
    S: ObjectStore + ?Sized,
{
    let old_head = match store.resolve_ref(HEAD) {
        Ok(id) => id,
        Err(StoreError::RefNotFound { .. }) => return Err(Error::NoCommitsYet),
        Err(err) => return Err(err.into()),
    };

    let new_head = store.create_commit(message, author)?;
    tracing::info!(parent = %old_head.short(), commit = %new_head.short(), "commit created");

    let stats = engine
        .diff(store, &old_head, &new_head)
        .map(|diff| aggregate(&diff))
        .map_err(|err| stats_unavailable(&new_head, err))?;

    tracing::info!(
        commit = %new_head.short(),
        files = stats.files_changed,
        insertions = stats.insertions,
        deletions = stats.deletions,
        "commit stats computed"
    );
    Ok(CommitOutcome {
        commit_id: new_head,
        stats,
    })
}

/// Write the first commit of a repository and report its whole tree as
/// added.
///
/// # Errors
///
/// Store failures while committing are returned as-is; failures while
/// diffing the new tree are reported as [`Error::StatsUnavailable`].
#[tracing::instrument(skip_all, fields(message = %message))]
pub fn initial_commit_and_stat<S>(
    engine: &DiffEngine,
    store: &S,
    message: &str,
    author: &Author,
) -> Result<CommitOutcome>
where
    S: ObjectStore + ?Sized,
{
    let new_head = store.create_commit(message, author)?;
    tracing::info!(commit = %new_head.short(), "initial commit created");

    let stats = engine
        .diff_from_empty(store, &new_head)
        .map(|diff| aggregate(&diff))
        .map_err(|err| stats_unavailable(&new_head, err))?;

    Ok(CommitOutcome {
        commit_id: new_head,
        stats,
    })
}

fn stats_unavailable(commit_id: &ObjectId, source: Error) -> Error {
    tracing::warn!(commit = %commit_id.short(), error = %source, "commit written without stats");
    Error::StatsUnavailable {
        commit_id: commit_id.clone(),
        source: Box::new(source),
    }
}
