//! Repository access built on top of libgit2.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{
    BranchType, ErrorClass, ErrorCode, IndexAddOption, Oid, Repository, RepositoryInitOptions,
    Sort, Status,
};
use gitit_api::{Author, CommitInfo, FileState, ObjectId, ObjectKind, TreeEntry};
use gitit_store::{ObjectStore, StoreError, StoreResult, CONTROL_DIR, HEAD};

use crate::{Error, Result};

/// Handle to a non-bare git repository on disk.
pub struct GitRepository {
    inner: Repository,
    root: PathBuf,
}

impl GitRepository {
    /// Open a repository from the given filesystem path.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be canonicalized, does not resolve
    /// to a git repository, or if libgit2 reports an unsupported repository
    /// layout (such as a bare repository).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let original = path.as_ref();
        let canonical = std::fs::canonicalize(original).map_err(|source| Error::Io {
            path: display_path(original),
            source,
        })?;

        let repo = match Repository::discover(&canonical) {
            Ok(repo) => repo,
            Err(err)
                if err.class() == ErrorClass::Repository && err.code() == ErrorCode::NotFound =>
            {
                return Err(Error::NotARepository {
                    path: display_path(&canonical),
                })
            }
            Err(err) => return Err(Error::from(err)),
        };

        Self::from_repository(repo, &canonical)
    }

    /// Create (or reinitialize) a repository at `path` whose unborn `HEAD`
    /// points at `branch`. Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or libgit2 fails
    /// to initialize the repository.
    pub fn init(path: impl AsRef<Path>, branch: &str) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(|source| Error::Io {
            path: display_path(path),
            source,
        })?;

        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(branch).mkpath(true);
        let repo = Repository::init_opts(path, &opts)?;
        tracing::info!(path = %display_path(path), branch, "initialized repository");

        Self::from_repository(repo, path)
    }

    fn from_repository(repo: Repository, path: &Path) -> Result<Self> {
        let root = repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::BareRepository {
                path: display_path(path),
            })?;

        Ok(Self { inner: repo, root })
    }

    /// Returns the absolute path to the repository root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Borrow the underlying libgit2 repository.
    #[must_use]
    pub const fn git_repo(&self) -> &Repository {
        &self.inner
    }

    /// Short name of the checked-out branch, or `None` when `HEAD` is
    /// detached. An unborn branch is still reported by name.
    ///
    /// # Errors
    ///
    /// Propagates failures reading `HEAD`.
    pub fn head_branch(&self) -> Result<Option<String>> {
        let head = match self.inner.head() {
            Ok(head) => head,
            Err(err) if err.code() == ErrorCode::UnbornBranch => {
                let head = self.inner.find_reference(HEAD)?;
                return Ok(head
                    .symbolic_target()
                    .and_then(|target| target.strip_prefix("refs/heads/"))
                    .map(str::to_owned));
            }
            Err(err) => return Err(Error::from(err)),
        };

        if head.is_branch() {
            Ok(head.shorthand().map(str::to_owned))
        } else {
            Ok(None)
        }
    }

    /// Stage one path: its current content if it exists on disk, or its
    /// removal if it is tracked but gone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] for paths escaping the working tree and
    /// [`Error::MissingFile`] when the path is neither on disk nor tracked.
    #[tracing::instrument(skip(self))]
    pub fn stage_path(&self, path: &str) -> Result<()> {
        let (relative, absolute) = sanitize_path(&self.root, path)?;
        let mut index = self.inner.index()?;

        if absolute.is_dir() {
            return Err(Error::InvalidPath {
                path: path.to_owned(),
                reason: "path is a directory",
            });
        } else if absolute.exists() {
            index.add_path(&relative)?;
        } else if index.get_path(&relative, 0).is_some() {
            index.remove_path(&relative)?;
        } else {
            return Err(Error::MissingFile {
                path: path.to_owned(),
            });
        }

        index.write()?;
        Ok(())
    }

    /// Stage every change in the working tree, deletions included.
    ///
    /// # Errors
    ///
    /// Propagates libgit2 index failures.
    #[tracing::instrument(skip(self))]
    pub fn stage_all(&self) -> Result<()> {
        let mut index = self.inner.index()?;
        index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"], None)?;
        index.write()?;
        tracing::debug!(entries = index.len(), "staged working tree");
        Ok(())
    }

    /// Working-tree state of one path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] for paths escaping the working tree and
    /// propagates other libgit2 status failures.
    pub fn file_status(&self, path: &str) -> Result<FileState> {
        let (relative, _) = sanitize_path(&self.root, path)?;
        match self.inner.status_file(&relative) {
            Ok(status) => Ok(file_state(status)),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(FileState::Absent),
            Err(err) => Err(Error::from(err)),
        }
    }

    /// History reachable from `HEAD`, newest first.
    ///
    /// A repository without commits has an empty history.
    ///
    /// # Errors
    ///
    /// Propagates revision walk and commit lookup failures.
    pub fn log(&self, limit: Option<usize>) -> Result<Vec<CommitInfo>> {
        if self.head_commit()?.is_none() {
            return Ok(Vec::new());
        }

        let mut revwalk = self.inner.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        revwalk.push_head()?;

        revwalk
            .take(limit.unwrap_or(usize::MAX))
            .map(|oid| -> Result<CommitInfo> {
                let commit = self.inner.find_commit(oid?)?;
                Ok(commit_info(&commit))
            })
            .collect()
    }

    /// Read a working-tree file as text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingFile`] if the file does not exist and
    /// [`Error::InvalidPath`] for paths escaping the working tree.
    pub fn read_file(&self, path: &str) -> Result<String> {
        let (_, absolute) = sanitize_path(&self.root, path)?;
        std::fs::read_to_string(&absolute).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                Error::MissingFile {
                    path: path.to_owned(),
                }
            } else {
                Error::Io {
                    path: path.to_owned(),
                    source,
                }
            }
        })
    }

    /// Write a working-tree file, creating parent directories as needed.
    /// The change is not staged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] for paths escaping the working tree and
    /// [`Error::Io`] if the write fails.
    pub fn write_file(&self, path: &str, contents: &str) -> Result<()> {
        let (_, absolute) = sanitize_path(&self.root, path)?;
        if let Some(parent) = absolute.parent() {
            std::fs::create_dir_all(parent).map_err(|source| Error::Io {
                path: path.to_owned(),
                source,
            })?;
        }
        std::fs::write(&absolute, contents).map_err(|source| Error::Io {
            path: path.to_owned(),
            source,
        })
    }

    /// Create a local branch at the current `HEAD` commit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCommitsYet`] when there is nothing to branch from,
    /// or a git error if the branch already exists.
    pub fn create_branch(&self, name: &str) -> Result<ObjectId> {
        let head = self.head_commit()?.ok_or(Error::NoCommitsYet)?;
        self.inner.branch(name, &head, false)?;
        tracing::info!(branch = name, commit = %head.id(), "created branch");
        Ok(ObjectId::new(head.id().to_string()))
    }

    /// Switch the working tree and `HEAD` to a local branch.
    ///
    /// Uncommitted changes that would be overwritten abort the checkout.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RefNotFound`] for unknown branches and a git
    /// error when the checkout conflicts with local changes.
    pub fn checkout_branch(&self, name: &str) -> Result<()> {
        let branch = match self.inner.find_branch(name, BranchType::Local) {
            Ok(branch) => branch,
            Err(err) if err.code() == ErrorCode::NotFound => {
                return Err(StoreError::RefNotFound {
                    name: name.to_owned(),
                }
                .into())
            }
            Err(err) => return Err(Error::from(err)),
        };

        let reference = branch.into_reference();
        let refname = reference
            .name()
            .map(str::to_owned)
            .ok_or_else(|| Error::InvalidPath {
                path: name.to_owned(),
                reason: "branch name is not valid UTF-8",
            })?;
        let tree = reference.peel_to_tree()?;

        let mut checkout = CheckoutBuilder::new();
        checkout.safe();
        self.inner.checkout_tree(tree.as_object(), Some(&mut checkout))?;
        self.inner.set_head(&refname)?;
        tracing::info!(branch = name, "checked out branch");
        Ok(())
    }

    fn head_commit(&self) -> Result<Option<git2::Commit<'_>>> {
        Ok(self.head_commit_raw()?)
    }

    fn head_commit_raw(&self) -> std::result::Result<Option<git2::Commit<'_>>, git2::Error> {
        match self.inner.head() {
            Ok(head) => head.peel_to_commit().map(Some),
            Err(err) if is_missing(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

impl ObjectStore for GitRepository {
    fn resolve_ref(&self, name: &str) -> StoreResult<ObjectId> {
        // Anything rev-parse understands: branch names, full refs, hashes.
        let object = if name == HEAD {
            self.inner
                .head()
                .and_then(|head| head.peel(git2::ObjectType::Commit))
        } else {
            self.inner.revparse_single(name)
        };

        let object = object.map_err(|err| {
            if is_missing(&err) {
                StoreError::RefNotFound {
                    name: name.to_owned(),
                }
            } else {
                StoreError::backend(err)
            }
        })?;
        let commit = object.peel_to_commit().map_err(StoreError::backend)?;
        Ok(ObjectId::new(commit.id().to_string()))
    }

    fn read_commit(&self, id: &ObjectId) -> StoreResult<CommitInfo> {
        let commit = self
            .inner
            .find_commit(parse_oid(id)?)
            .map_err(|err| lookup_error(err, id, ObjectKind::Commit))?;
        Ok(commit_info(&commit))
    }

    fn read_tree(&self, id: &ObjectId) -> StoreResult<Vec<TreeEntry>> {
        let tree = self
            .inner
            .find_tree(parse_oid(id)?)
            .map_err(|err| lookup_error(err, id, ObjectKind::Tree))?;

        Ok(tree
            .iter()
            .filter_map(|entry| {
                let kind = match entry.kind()? {
                    git2::ObjectType::Blob => ObjectKind::Blob,
                    git2::ObjectType::Tree => ObjectKind::Tree,
                    git2::ObjectType::Commit => ObjectKind::Commit,
                    _ => return None,
                };
                let name = String::from_utf8_lossy(entry.name_bytes()).into_owned();
                Some(TreeEntry::new(name, kind, ObjectId::new(entry.id().to_string())))
            })
            .collect())
    }

    fn read_blob(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        let blob = self
            .inner
            .find_blob(parse_oid(id)?)
            .map_err(|err| lookup_error(err, id, ObjectKind::Blob))?;
        Ok(blob.content().to_vec())
    }

    fn create_commit(&self, message: &str, author: &Author) -> StoreResult<ObjectId> {
        let mut index = self.inner.index().map_err(StoreError::backend)?;
        index.read(false).map_err(StoreError::backend)?;
        let tree_id = index.write_tree().map_err(StoreError::backend)?;
        let tree = self.inner.find_tree(tree_id).map_err(StoreError::backend)?;
        let signature =
            git2::Signature::now(&author.name, &author.email).map_err(StoreError::backend)?;

        let parents: Vec<git2::Commit<'_>> = self
            .head_commit_raw()
            .map_err(StoreError::backend)?
            .into_iter()
            .collect();
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();

        let oid = self
            .inner
            .commit(
                Some(HEAD),
                &signature,
                &signature,
                message,
                &tree,
                &parent_refs,
            )
            .map_err(StoreError::backend)?;
        Ok(ObjectId::new(oid.to_string()))
    }
}

fn parse_oid(id: &ObjectId) -> StoreResult<Oid> {
    Oid::from_str(id.as_str()).map_err(|_| StoreError::InvalidObjectId {
        id: id.as_str().to_owned(),
    })
}

fn lookup_error(err: git2::Error, id: &ObjectId, kind: ObjectKind) -> StoreError {
    if err.code() == ErrorCode::NotFound {
        StoreError::not_found(id, kind)
    } else {
        StoreError::backend(err)
    }
}

fn is_missing(err: &git2::Error) -> bool {
    matches!(err.code(), ErrorCode::NotFound | ErrorCode::UnbornBranch)
}

fn commit_info(commit: &git2::Commit<'_>) -> CommitInfo {
    let author = commit.author();
    CommitInfo {
        id: ObjectId::new(commit.id().to_string()),
        tree: ObjectId::new(commit.tree_id().to_string()),
        parents: commit
            .parent_ids()
            .map(|parent| ObjectId::new(parent.to_string()))
            .collect(),
        message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
        author: Author::new(
            String::from_utf8_lossy(author.name_bytes()),
            String::from_utf8_lossy(author.email_bytes()),
        ),
        timestamp: commit.time().seconds(),
    }
}

fn file_state(status: Status) -> FileState {
    if status.is_empty() {
        FileState::Unmodified
    } else if status.contains(Status::IGNORED) {
        FileState::Ignored
    } else if status.contains(Status::INDEX_NEW) {
        FileState::Added
    } else if status.intersects(Status::INDEX_DELETED | Status::WT_DELETED) {
        FileState::Deleted
    } else if status.contains(Status::WT_NEW) {
        FileState::Untracked
    } else {
        FileState::Modified
    }
}

/// Resolve a caller-supplied relative path to `(relative, absolute)`.
fn sanitize_path(root: &Path, relative: &str) -> Result<(PathBuf, PathBuf)> {
    let invalid = |reason| Error::InvalidPath {
        path: relative.to_owned(),
        reason,
    };

    let candidate = Path::new(relative);
    if relative.trim().is_empty() {
        return Err(invalid("path is empty"));
    }
    if candidate.is_absolute() {
        return Err(invalid("path must be relative to the repository root"));
    }
    if candidate
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return Err(invalid("path escapes the repository"));
    }
    if candidate
        .components()
        .find(|component| !matches!(component, Component::CurDir))
        .is_some_and(|first| first.as_os_str() == CONTROL_DIR)
    {
        return Err(invalid("path is inside the repository control directory"));
    }

    let normalized: PathBuf = candidate
        .components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect();
    Ok((normalized.clone(), root.join(normalized)))
}

fn display_path(path: &Path) -> String {
    path.to_path_buf()
        .into_os_string()
        .to_string_lossy()
        .into_owned()
}

impl fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitRepository")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}
