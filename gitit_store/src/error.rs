use std::sync::PoisonError;

use gitit_api::{ObjectId, ObjectKind};

/// Errors surfaced by object store implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No object of the expected kind exists under the id.
    #[error("{kind} {id} not found in object store")]
    ObjectNotFound {
        /// Requested identifier.
        id: ObjectId,
        /// Kind the caller expected.
        kind: ObjectKind,
    },
    /// Reference does not exist (or `HEAD` is unborn).
    #[error("reference '{name}' not found")]
    RefNotFound {
        /// Reference that failed to resolve.
        name: String,
    },
    /// Identifier is not a well-formed hash.
    #[error("malformed object id: {id}")]
    InvalidObjectId {
        /// Offending identifier.
        id: String,
    },
    /// A staged path would be both a file and a directory in one tree.
    #[error("staged path '{path}' conflicts with '{existing}'")]
    StageConflict {
        /// Path being staged.
        path: String,
        /// Already-staged path it collides with.
        existing: String,
    },
    /// A lock guarding the store was poisoned by a panicking writer.
    #[error("object store lock poisoned")]
    Poisoned,
    /// Any other failure reported by the backing store, passed through as-is.
    #[error("object store failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wrap a backend-specific error.
    #[must_use]
    pub fn backend(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(source))
    }

    /// Shorthand for a missing object.
    #[must_use]
    pub fn not_found(id: &ObjectId, kind: ObjectKind) -> Self {
        Self::ObjectNotFound {
            id: id.clone(),
            kind,
        }
    }

    /// Whether the error means the object simply is not there.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound { .. })
    }
}

impl<T> From<PoisonError<T>> for StoreError {
    fn from(_: PoisonError<T>) -> Self {
        Self::Poisoned
    }
}

/// Convenience result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
