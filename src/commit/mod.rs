//! Commit coordinator: the transactional write path.

pub mod apply;

use rusqlite::Transaction;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::op::{Effect, Operation};
use crate::persist::PersistError;
use crate::persist::sqlite::{self, CollectionStore};
use crate::types::{DocFamily, Version, family_of};

/// Commits one operation in its own write transaction.
///
/// Returns the committed version. On any failure — version conflict, applier
/// error, storage error — nothing is persisted.
pub fn commit(
    store: &mut CollectionStore,
    collection_id: &str,
    doc_id: &str,
    op: &Operation,
) -> EngineResult<Version> {
    let tx = store.begin()?;
    let version = commit_in_tx(&tx, collection_id, doc_id, op)?;
    tx.commit().map_err(PersistError::from)?;
    Ok(version)
}

/// Commits one operation inside a caller-owned transaction.
///
/// The caller decides whether the transaction ultimately commits; this
/// function only validates, appends to the log, and applies the effect.
pub fn commit_in_tx(
    tx: &Transaction<'_>,
    collection_id: &str,
    doc_id: &str,
    op: &Operation,
) -> EngineResult<Version> {
    let family = family_of(doc_id)?;
    if family == DocFamily::Aggregate {
        return Err(EngineError::AggregateReadOnly(doc_id.to_string()));
    }

    let max = sqlite::max_logged_version(tx, collection_id, doc_id)?;
    let expected = max + 1;
    if op.version != expected {
        debug!(
            collection_id,
            doc_id,
            expected,
            actual = op.version,
            "rejecting commit on version conflict"
        );
        return Err(EngineError::VersionConflict {
            doc_id: doc_id.to_string(),
            expected,
            actual: op.version,
        });
    }

    sqlite::append_op(tx, collection_id, doc_id, op)?;

    match &op.effect {
        Effect::Create { init } => {
            apply::create(tx, family, collection_id, doc_id, op.version, init)?;
        }
        Effect::Edit { descriptors } => {
            apply::edit(tx, family, collection_id, doc_id, op.version, descriptors)?;
        }
        Effect::Delete => {
            apply::delete(tx, family, collection_id, doc_id, op.version)?;
        }
    }

    debug!(collection_id, doc_id, version = op.version, "committed operation");
    Ok(op.version)
}
