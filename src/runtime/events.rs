//! Runtime event stream payloads.

use crate::types::{DocFamily, DocId, Version};

/// Events emitted by the collection runtime after each successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// An operation was committed and is durable.
    Committed {
        /// Document the operation targeted.
        doc_id: DocId,
        /// Family of the targeted document.
        family: DocFamily,
        /// Version the operation committed at.
        version: Version,
        /// Whether standing queries should re-resolve their id sets.
        affects_queries: bool,
    },
}
