//! Live-query resolution and commit-time invalidation.

use rusqlite::Connection;

use crate::error::EngineResult;
use crate::op::{Effect, Operation};
use crate::persist::sqlite;
use crate::types::{AggregateKey, DocFamily, DocId, aggregate_id};

/// Standing query over one document family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocQuery {
    /// All live fields of the collection.
    Fields,
    /// All live views of the collection.
    Views,
    /// All live records of the collection.
    Records,
    /// A single aggregate over one view.
    Aggregate {
        /// Aggregate computation.
        key: AggregateKey,
        /// Target view; when absent, the collection's first view is used.
        view_id: Option<DocId>,
    },
}

impl DocQuery {
    /// Family the query resolves against.
    pub fn family(&self) -> DocFamily {
        match self {
            Self::Fields => DocFamily::Field,
            Self::Views => DocFamily::View,
            Self::Records => DocFamily::Record,
            Self::Aggregate { .. } => DocFamily::Aggregate,
        }
    }
}

/// Resolves the current set of document ids matching `query`.
///
/// Aggregate queries synthesize the single id `<key>_<view id>`; with no
/// explicit view and no views in the collection the result set is empty.
pub fn resolve_ids(
    conn: &Connection,
    collection_id: &str,
    query: &DocQuery,
) -> EngineResult<Vec<DocId>> {
    match query {
        DocQuery::Fields => Ok(sqlite::list_field_ids(conn, collection_id)?),
        DocQuery::Views => Ok(sqlite::list_view_ids(conn, collection_id)?),
        DocQuery::Records => Ok(sqlite::list_record_ids(conn, collection_id)?),
        DocQuery::Aggregate { key, view_id } => {
            let view_id = match view_id {
                Some(view_id) => Some(view_id.clone()),
                None => sqlite::list_view_ids(conn, collection_id)?.into_iter().next(),
            };
            Ok(view_id
                .map(|view_id| vec![aggregate_id(*key, &view_id)])
                .unwrap_or_default())
        }
    }
}

/// Conservative predicate: can `op` change any query's result set?
///
/// Creates and deletes always can. An edit cannot only when it carries no
/// descriptors at all. False positives cost a re-resolution; false negatives
/// would desynchronize clients, so none are allowed.
pub fn affects_query(op: &Operation) -> bool {
    match &op.effect {
        Effect::Create { .. } | Effect::Delete => true,
        Effect::Edit { descriptors } => !descriptors.is_empty(),
    }
}
