//! Object store interface consumed by the gitit commit-comparison engine.
//!
//! The engine only ever reads sealed objects and asks the store to seal the
//! currently staged content as a new commit. Everything else (staging,
//! branches, transport) belongs to the concrete store.

mod error;
mod memory;

pub use error::{StoreError, StoreResult};
pub use gitit_api::{Author, CommitInfo, ObjectId, ObjectKind, TreeEntry};
pub use memory::MemoryStore;

/// Name of the repository control directory that tree walks must skip.
pub const CONTROL_DIR: &str = ".git";

/// Symbolic reference naming the checked-out commit.
pub const HEAD: &str = "HEAD";

/// Content-addressed store of immutable blobs, trees, and commits.
pub trait ObjectStore {
    /// Resolve a (possibly symbolic) reference to the commit it points at.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RefNotFound`] when the reference does not exist,
    /// including an unborn `HEAD` in a repository without commits.
    fn resolve_ref(&self, name: &str) -> StoreResult<ObjectId>;

    /// Read commit metadata.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ObjectNotFound`] if `id` is not a commit.
    fn read_commit(&self, id: &ObjectId) -> StoreResult<CommitInfo>;

    /// List the entries of a tree in stored order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ObjectNotFound`] if `id` is not a tree.
    fn read_tree(&self, id: &ObjectId) -> StoreResult<Vec<TreeEntry>>;

    /// Read raw blob content.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ObjectNotFound`] if `id` is not a blob.
    fn read_blob(&self, id: &ObjectId) -> StoreResult<Vec<u8>>;

    /// Seal the currently staged content as a commit on top of `HEAD`.
    ///
    /// # Errors
    ///
    /// Surfaces backend failures verbatim.
    fn create_commit(&self, message: &str, author: &Author) -> StoreResult<ObjectId>;

    /// Directory name reserved for the store's own bookkeeping.
    fn control_dir(&self) -> &str {
        CONTROL_DIR
    }
}
