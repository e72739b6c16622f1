//! Shared identifiers, version numbers, and document-family classification.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Document identifier, family-prefixed (`tbl…`, `fld…`, `viw…`, `rec…`,
/// or `<AggregateKey>_viw…`).
pub type DocId = String;
/// Collection identifier scoping one table's documents and op log.
pub type CollectionId = String;
/// Identifier of the client session that authored an operation.
pub type SourceId = String;
/// Per-source operation sequence number.
pub type OpSeq = u64;
/// Monotonic document version; 0 means "never created".
pub type Version = u64;

/// Identifier prefix for table documents.
pub const TABLE_PREFIX: &str = "tbl";
/// Identifier prefix for field documents.
pub const FIELD_PREFIX: &str = "fld";
/// Identifier prefix for view documents.
pub const VIEW_PREFIX: &str = "viw";
/// Identifier prefix for record documents.
pub const RECORD_PREFIX: &str = "rec";

/// Closed set of document families handled by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocFamily {
    /// Schema container document.
    Table,
    /// Column definition plus per-view metadata.
    Field,
    /// Filter/sort/group/options configuration.
    View,
    /// Row of cell values.
    Record,
    /// Derived scalar keyed by `<AggregateKey>_<view id>`; computed, never stored.
    Aggregate,
}

/// Classifies a document id by its fixed-width family prefix.
///
/// Aggregate ids do not carry a three-character prefix; they are recognized
/// by their `<key>_<view id>` shape instead. Every other shape is an
/// [`EngineError::UnknownFamily`].
pub fn family_of(doc_id: &str) -> EngineResult<DocFamily> {
    if doc_id.starts_with(TABLE_PREFIX) {
        return Ok(DocFamily::Table);
    }
    if doc_id.starts_with(FIELD_PREFIX) {
        return Ok(DocFamily::Field);
    }
    if doc_id.starts_with(VIEW_PREFIX) {
        return Ok(DocFamily::View);
    }
    if doc_id.starts_with(RECORD_PREFIX) {
        return Ok(DocFamily::Record);
    }
    if let Some((key, view_id)) = doc_id.split_once('_') {
        if !key.is_empty() && view_id.starts_with(VIEW_PREFIX) {
            return Ok(DocFamily::Aggregate);
        }
    }
    Err(EngineError::UnknownFamily(doc_id.to_string()))
}

/// Known aggregate computations.
///
/// Only [`AggregateKey::RowCount`] is computed today; requesting any other
/// key surfaces [`EngineError::UnimplementedAggregate`] at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateKey {
    /// Count of live records in the collection.
    RowCount,
    /// Arithmetic mean over a field. Not implemented.
    Average,
    /// Sum over a field. Not implemented.
    Sum,
    /// Minimum over a field. Not implemented.
    Min,
    /// Maximum over a field. Not implemented.
    Max,
}

impl AggregateKey {
    /// Stable identifier fragment used in aggregate document ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RowCount => "RowCount",
            Self::Average => "Average",
            Self::Sum => "Sum",
            Self::Min => "Min",
            Self::Max => "Max",
        }
    }

    /// Parses an id fragment back into a key.
    pub fn parse(key: &str) -> EngineResult<Self> {
        match key {
            "RowCount" => Ok(Self::RowCount),
            "Average" => Ok(Self::Average),
            "Sum" => Ok(Self::Sum),
            "Min" => Ok(Self::Min),
            "Max" => Ok(Self::Max),
            other => Err(EngineError::UnimplementedAggregate(other.to_string())),
        }
    }
}

/// Splits an aggregate document id into its key and owning view id.
pub fn parse_aggregate_id(doc_id: &str) -> EngineResult<(AggregateKey, DocId)> {
    let Some((key, view_id)) = doc_id.split_once('_') else {
        return Err(EngineError::UnknownFamily(doc_id.to_string()));
    };
    if !view_id.starts_with(VIEW_PREFIX) {
        return Err(EngineError::UnknownFamily(doc_id.to_string()));
    }
    Ok((AggregateKey::parse(key)?, view_id.to_string()))
}

/// Builds the synthetic document id for an aggregate over one view.
pub fn aggregate_id(key: AggregateKey, view_id: &str) -> DocId {
    format!("{}_{}", key.as_str(), view_id)
}
