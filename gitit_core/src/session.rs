//! Per-repository sessions and the workspace that hands them out.
//!
//! Every mutating operation on a repository goes through its session's
//! lock. The workspace caches one session per repository name, so callers
//! that open the same name share that lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use gitit_api::{Author, CommitDiff, CommitInfo, CommitOutcome, FileState, ObjectId};
use gitit_store::{ObjectStore, StoreError, HEAD};

use crate::commit::{commit_and_stat_with, initial_commit_and_stat};
use crate::config::CoreConfig;
use crate::diff::DiffEngine;
use crate::repository::GitRepository;
use crate::{Error, Result};

/// Serialized access to one learner repository.
#[derive(Debug)]
pub struct RepoSession {
    name: String,
    repository: Mutex<GitRepository>,
    engine: DiffEngine,
}

impl RepoSession {
    /// Wrap an opened repository.
    #[must_use]
    pub fn new(name: impl Into<String>, repository: GitRepository, engine: DiffEngine) -> Self {
        Self {
            name: name.into(),
            repository: Mutex::new(repository),
            engine,
        }
    }

    /// Repository name this session was opened under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute working-tree root.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Poisoned`] if a previous holder of the lock panicked.
    pub fn root(&self) -> Result<PathBuf> {
        self.with_repository(|repo| Ok(repo.root().to_path_buf()))
    }

    /// Stage a single path, including its deletion.
    ///
    /// # Errors
    ///
    /// See [`GitRepository::stage_path`].
    #[tracing::instrument(skip(self), fields(repo = %self.name))]
    pub fn stage_file(&self, path: &str) -> Result<()> {
        self.with_repository(|repo| repo.stage_path(path))
    }

    /// Stage every change in the working tree.
    ///
    /// # Errors
    ///
    /// See [`GitRepository::stage_all`].
    #[tracing::instrument(skip(self), fields(repo = %self.name))]
    pub fn stage_all(&self) -> Result<()> {
        self.with_repository(GitRepository::stage_all)
    }

    /// Commit the index and report the change counts.
    ///
    /// The first commit of a repository has no previous `HEAD` to compare
    /// against, so its whole tree is counted as added.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StatsUnavailable`] when the commit was written but
    /// could not be diffed; other errors mean nothing was committed.
    #[tracing::instrument(skip(self, author), fields(repo = %self.name))]
    pub fn commit(&self, message: &str, author: &Author) -> Result<CommitOutcome> {
        self.with_repository(|repo| self.commit_locked(repo, message, author))
    }

    /// Stage everything and commit it under a single lock acquisition.
    ///
    /// # Errors
    ///
    /// Same as [`RepoSession::stage_all`] followed by [`RepoSession::commit`].
    #[tracing::instrument(skip(self, author), fields(repo = %self.name))]
    pub fn stage_all_and_commit(&self, message: &str, author: &Author) -> Result<CommitOutcome> {
        self.with_repository(|repo| {
            repo.stage_all()?;
            self.commit_locked(repo, message, author)
        })
    }

    fn commit_locked(
        &self,
        repo: &GitRepository,
        message: &str,
        author: &Author,
    ) -> Result<CommitOutcome> {
        match commit_and_stat_with(&self.engine, repo, message, author) {
            Err(Error::NoCommitsYet) => {
                tracing::debug!("no previous commit, diffing against the empty tree");
                initial_commit_and_stat(&self.engine, repo, message, author)
            }
            other => other,
        }
    }

    /// Working-tree state of one path.
    ///
    /// # Errors
    ///
    /// See [`GitRepository::file_status`].
    pub fn status(&self, path: &str) -> Result<FileState> {
        self.with_repository(|repo| repo.file_status(path))
    }

    /// Commit history from `HEAD`, newest first.
    ///
    /// # Errors
    ///
    /// See [`GitRepository::log`].
    pub fn log(&self, limit: Option<usize>) -> Result<Vec<CommitInfo>> {
        self.with_repository(|repo| repo.log(limit))
    }

    /// Changes between two references (`HEAD`, branch names, full refs).
    ///
    /// # Errors
    ///
    /// See [`DiffEngine::diff_refs`].
    #[tracing::instrument(skip(self), fields(repo = %self.name))]
    pub fn diff(&self, old_ref: &str, new_ref: &str) -> Result<CommitDiff> {
        self.with_repository(|repo| self.engine.diff_refs(repo, old_ref, new_ref))
    }

    /// Current `HEAD` commit, or `None` before the first commit.
    ///
    /// # Errors
    ///
    /// Propagates store failures other than an unborn `HEAD`.
    pub fn head(&self) -> Result<Option<ObjectId>> {
        self.with_repository(|repo| match repo.resolve_ref(HEAD) {
            Ok(id) => Ok(Some(id)),
            Err(StoreError::RefNotFound { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        })
    }

    /// Name of the checked-out branch.
    ///
    /// # Errors
    ///
    /// See [`GitRepository::head_branch`].
    pub fn head_branch(&self) -> Result<Option<String>> {
        self.with_repository(GitRepository::head_branch)
    }

    /// Read a working-tree file.
    ///
    /// # Errors
    ///
    /// See [`GitRepository::read_file`].
    pub fn read_file(&self, path: &str) -> Result<String> {
        self.with_repository(|repo| repo.read_file(path))
    }

    /// Write a working-tree file without staging it.
    ///
    /// # Errors
    ///
    /// See [`GitRepository::write_file`].
    pub fn write_file(&self, path: &str, contents: &str) -> Result<()> {
        self.with_repository(|repo| repo.write_file(path, contents))
    }

    /// Create a local branch at `HEAD`.
    ///
    /// # Errors
    ///
    /// See [`GitRepository::create_branch`].
    #[tracing::instrument(skip(self), fields(repo = %self.name))]
    pub fn create_branch(&self, name: &str) -> Result<ObjectId> {
        self.with_repository(|repo| repo.create_branch(name))
    }

    /// Check out a local branch.
    ///
    /// # Errors
    ///
    /// See [`GitRepository::checkout_branch`].
    #[tracing::instrument(skip(self), fields(repo = %self.name))]
    pub fn checkout_branch(&self, name: &str) -> Result<()> {
        self.with_repository(|repo| repo.checkout_branch(name))
    }

    fn with_repository<F, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&GitRepository) -> Result<T>,
    {
        let repository = self.repository.lock()?;
        op(&repository)
    }
}

/// Directory of learner repositories, one per name under `repos_root`.
#[derive(Debug)]
pub struct Workspace {
    config: CoreConfig,
    sessions: Mutex<HashMap<String, Arc<RepoSession>>>,
}

impl Workspace {
    /// Workspace rooted at `config.repos_root`.
    #[must_use]
    pub fn new(config: CoreConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Workspace configured from files and environment.
    ///
    /// # Errors
    ///
    /// See [`CoreConfig::load_with_layers`].
    pub fn load() -> Result<Self> {
        Ok(Self::new(CoreConfig::load_with_layers()?))
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Directory that holds the repository called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRepositoryName`] unless `name` is a single
    /// plain path component.
    pub fn repo_dir(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.config.repos_root.join(name))
    }

    /// Create the repository `name` on the default branch, or reuse it if
    /// it already exists.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid names or if initialization fails.
    #[tracing::instrument(skip(self))]
    pub fn init_repo(&self, name: &str) -> Result<Arc<RepoSession>> {
        let dir = self.repo_dir(name)?;
        self.session(name, || GitRepository::init(&dir, &self.config.default_branch))
    }

    /// Session for the existing repository `name`.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid names or if no repository exists there.
    #[tracing::instrument(skip(self))]
    pub fn open(&self, name: &str) -> Result<Arc<RepoSession>> {
        let dir = self.repo_dir(name)?;
        self.session(name, || open_existing(&dir))
    }

    fn session<F>(&self, name: &str, open: F) -> Result<Arc<RepoSession>>
    where
        F: FnOnce() -> Result<GitRepository>,
    {
        if let Some(session) = self.sessions.lock()?.get(name) {
            return Ok(Arc::clone(session));
        }

        // Opened without the map lock so other names are not blocked on disk
        // I/O. A racing opener of the same name loses to whoever inserts first.
        let opened = Arc::new(RepoSession::new(
            name,
            open()?,
            DiffEngine::from_config(&self.config),
        ));
        let mut sessions = self.sessions.lock()?;
        let session = sessions.entry(name.to_owned()).or_insert(opened);
        Ok(Arc::clone(session))
    }
}

fn open_existing(dir: &Path) -> Result<GitRepository> {
    if !dir.join(gitit_store::CONTROL_DIR).exists() {
        return Err(Error::NotARepository {
            path: dir.display().to_string(),
        });
    }
    GitRepository::open(dir)
}

fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains(['/', '\\', '\0'])
        || Path::new(name).is_absolute();
    if invalid {
        return Err(Error::InvalidRepositoryName {
            name: name.to_owned(),
        });
    }
    Ok(())
}
