//! Mutation appliers: one per (family × descriptor-kind) pair.
//!
//! Each applier runs inside the coordinator's transaction and applies one
//! kind's batch as a single read-modify-write. Descriptors within a batch
//! keep the relative order the client produced.

use rusqlite::Transaction;
use tracing::trace;

use crate::doc::DocInit;
use crate::error::{EngineError, EngineResult};
use crate::op::{DescriptorKind, KIND_APPLY_ORDER, MutationDescriptor, group_by_kind};
use crate::persist::sqlite;
use crate::types::{DocFamily, Version};

/// Inserts the family row for a create operation.
pub(crate) fn create(
    tx: &Transaction<'_>,
    family: DocFamily,
    collection_id: &str,
    doc_id: &str,
    version: Version,
    init: &DocInit,
) -> EngineResult<()> {
    if init.family() != family {
        return Err(EngineError::FamilyMismatch {
            doc_id: doc_id.to_string(),
            expected: init.family(),
            actual: family,
        });
    }
    if sqlite::row_exists(tx, family, collection_id, doc_id)? {
        return Err(EngineError::AlreadyExists(doc_id.to_string()));
    }

    match init {
        DocInit::Table(init) => sqlite::insert_table_row(tx, collection_id, doc_id, version, init)?,
        DocInit::Field(init) => sqlite::insert_field_row(tx, collection_id, doc_id, version, init)?,
        DocInit::View(init) => sqlite::insert_view_row(tx, collection_id, doc_id, version, init)?,
        DocInit::Record(init) => {
            sqlite::insert_record_row(tx, collection_id, doc_id, version, init)?;
        }
    }
    trace!(doc_id, ?family, "created document");
    Ok(())
}

/// Applies an edit operation's descriptors, grouped by kind.
///
/// Kinds apply in [`KIND_APPLY_ORDER`]; an empty descriptor list is a no-op
/// beyond the logged entry.
pub(crate) fn edit(
    tx: &Transaction<'_>,
    family: DocFamily,
    collection_id: &str,
    doc_id: &str,
    version: Version,
    descriptors: &[MutationDescriptor],
) -> EngineResult<()> {
    if descriptors.is_empty() {
        let affected = sqlite::bump_doc_version(tx, family, collection_id, doc_id, version)?;
        if affected == 0 {
            return Err(EngineError::MissingDocument(doc_id.to_string()));
        }
        return Ok(());
    }

    let grouped = group_by_kind(descriptors);
    for kind in KIND_APPLY_ORDER {
        let Some(batch) = grouped.get(&kind) else {
            continue;
        };
        let expected = kind.family();
        if expected != family {
            return Err(EngineError::FamilyMismatch {
                doc_id: doc_id.to_string(),
                expected,
                actual: family,
            });
        }
        trace!(doc_id, ?kind, batch = batch.len(), "applying descriptor batch");
        match kind {
            DescriptorKind::FieldName => {
                apply_field_name(tx, collection_id, doc_id, version, batch)?;
            }
            DescriptorKind::ColumnMeta => {
                apply_column_meta(tx, collection_id, doc_id, version, batch)?;
            }
            DescriptorKind::ColumnMetaMerge => {
                apply_column_meta_merge(tx, collection_id, doc_id, version, batch)?;
            }
            DescriptorKind::RecordOrder => {
                apply_record_order(tx, collection_id, doc_id, version, batch)?;
            }
            DescriptorKind::RecordCell => {
                apply_record_cells(tx, collection_id, doc_id, version, batch)?;
            }
        }
    }
    Ok(())
}

/// Tombstones the document; row data is retained for audit.
pub(crate) fn delete(
    tx: &Transaction<'_>,
    family: DocFamily,
    collection_id: &str,
    doc_id: &str,
    version: Version,
) -> EngineResult<()> {
    let affected = sqlite::mark_deleted(tx, family, collection_id, doc_id, version)?;
    if affected == 0 {
        return Err(EngineError::MissingDocument(doc_id.to_string()));
    }
    trace!(doc_id, "tombstoned document");
    Ok(())
}

fn apply_field_name(
    tx: &Transaction<'_>,
    collection_id: &str,
    doc_id: &str,
    version: Version,
    batch: &[&MutationDescriptor],
) -> EngineResult<()> {
    let mut affected = 0;
    for descriptor in batch {
        let MutationDescriptor::SetFieldName { name } = descriptor else {
            continue;
        };
        affected = sqlite::update_field_name(tx, collection_id, doc_id, name, version)?;
    }
    if affected == 0 {
        return Err(EngineError::MissingDocument(doc_id.to_string()));
    }
    Ok(())
}

fn apply_column_meta(
    tx: &Transaction<'_>,
    collection_id: &str,
    doc_id: &str,
    version: Version,
    batch: &[&MutationDescriptor],
) -> EngineResult<()> {
    let Some(mut meta) = sqlite::read_column_meta(tx, collection_id, doc_id)? else {
        return Err(EngineError::MissingDocument(doc_id.to_string()));
    };
    // Later descriptors on the same leaf win.
    for descriptor in batch {
        let MutationDescriptor::SetColumnMeta { view_id, key, value } = descriptor else {
            continue;
        };
        meta.entry(view_id.clone())
            .or_default()
            .insert(key.clone(), value.clone());
    }
    sqlite::write_column_meta(tx, collection_id, doc_id, &meta, version)?;
    Ok(())
}

fn apply_column_meta_merge(
    tx: &Transaction<'_>,
    collection_id: &str,
    doc_id: &str,
    version: Version,
    batch: &[&MutationDescriptor],
) -> EngineResult<()> {
    let Some(mut meta) = sqlite::read_column_meta(tx, collection_id, doc_id)? else {
        return Err(EngineError::MissingDocument(doc_id.to_string()));
    };
    for descriptor in batch {
        let MutationDescriptor::AddColumnMeta { view_id, entries } = descriptor else {
            continue;
        };
        meta.entry(view_id.clone())
            .or_default()
            .extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    sqlite::write_column_meta(tx, collection_id, doc_id, &meta, version)?;
    Ok(())
}

fn apply_record_order(
    tx: &Transaction<'_>,
    collection_id: &str,
    doc_id: &str,
    version: Version,
    batch: &[&MutationDescriptor],
) -> EngineResult<()> {
    let Some(mut state) = sqlite::read_record_state(tx, collection_id, doc_id)? else {
        return Err(EngineError::MissingDocument(doc_id.to_string()));
    };
    for descriptor in batch {
        let MutationDescriptor::SetRecordOrder { view_id, order } = descriptor else {
            continue;
        };
        state.orders.insert(view_id.clone(), *order);
    }
    sqlite::write_record_orders(tx, collection_id, doc_id, &state.orders, version)?;
    Ok(())
}

fn apply_record_cells(
    tx: &Transaction<'_>,
    collection_id: &str,
    doc_id: &str,
    version: Version,
    batch: &[&MutationDescriptor],
) -> EngineResult<()> {
    let Some(mut state) = sqlite::read_record_state(tx, collection_id, doc_id)? else {
        return Err(EngineError::MissingDocument(doc_id.to_string()));
    };
    for descriptor in batch {
        let MutationDescriptor::SetRecordCell { field_id, value } = descriptor else {
            continue;
        };
        state.cells.insert(field_id.clone(), value.clone());
    }
    sqlite::write_record_cells(tx, collection_id, doc_id, &state.cells, version)?;
    Ok(())
}
