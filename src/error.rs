//! Engine-level error taxonomy.

use thiserror::Error;

use crate::persist::PersistError;
use crate::types::{DocFamily, DocId, Version};

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the commit, snapshot, and query paths.
///
/// `VersionConflict` is the only variant callers are expected to recover
/// from: refetch the current state and resubmit. The engine never retries
/// on its own.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The operation's declared version is not the next version for the document.
    #[error("version conflict on {doc_id}: expected {expected}, got {actual}")]
    VersionConflict {
        /// Document the commit targeted.
        doc_id: DocId,
        /// Version the store would have accepted.
        expected: Version,
        /// Version the operation declared.
        actual: Version,
    },
    /// The document id matches no known family prefix.
    #[error("unknown document family for id `{0}`")]
    UnknownFamily(DocId),
    /// A bulk read mixed ids from two different families.
    #[error("mixed document families in batch: {0:?} and {1:?}")]
    MixedFamily(DocFamily, DocFamily),
    /// The requested aggregate key has no computation.
    #[error("aggregate `{0}` is not implemented")]
    UnimplementedAggregate(String),
    /// A create targeted an id that already exists.
    #[error("document already exists: {0}")]
    AlreadyExists(DocId),
    /// An edit or delete targeted a missing (or already deleted) document.
    #[error("document not found: {0}")]
    MissingDocument(DocId),
    /// An operation payload does not belong to the document's family.
    #[error("operation targets a {expected:?} document but {doc_id} is a {actual:?}")]
    FamilyMismatch {
        /// Document the operation targeted.
        doc_id: DocId,
        /// Family the payload applies to.
        expected: DocFamily,
        /// Family the id classifies as.
        actual: DocFamily,
    },
    /// Aggregate documents are derived and accept no commits.
    #[error("aggregate documents are derived and cannot be written: {0}")]
    AggregateReadOnly(DocId),
    /// Storage-layer failure; the enclosing transaction is rolled back.
    #[error(transparent)]
    Persist(#[from] PersistError),
}
