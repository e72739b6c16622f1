//! In-memory replay of a document's operation history.
//!
//! The op log is the source of truth; folding a contiguous operation range
//! into a [`Snapshot`] reconstructs the state the log produces, independent
//! of the stored document tables. Used for point-in-time reads and as a
//! cross-check against stored state.

use crate::doc::{DocData, Snapshot};
use crate::error::{EngineError, EngineResult};
use crate::op::{Effect, KIND_APPLY_ORDER, MutationDescriptor, Operation, group_by_kind};
use crate::types::{DocFamily, family_of};

/// Folds `ops` (a contiguous range starting at the document's first logged
/// version) into the snapshot the range produces.
///
/// Replay enforces the same invariants as the commit path: gapless versions,
/// no edits before create or after delete, payloads matching the id's
/// family.
pub fn replay_snapshot(doc_id: &str, ops: &[Operation]) -> EngineResult<Snapshot> {
    let family = family_of(doc_id)?;
    if family == DocFamily::Aggregate {
        return Err(EngineError::AggregateReadOnly(doc_id.to_string()));
    }

    let mut snapshot = Snapshot::absent(doc_id.to_string());
    let mut tombstoned = false;

    for op in ops {
        let expected = snapshot.version + 1;
        if op.version != expected {
            return Err(EngineError::VersionConflict {
                doc_id: doc_id.to_string(),
                expected,
                actual: op.version,
            });
        }

        match &op.effect {
            Effect::Create { init } => {
                if snapshot.data.is_some() || tombstoned {
                    return Err(EngineError::AlreadyExists(doc_id.to_string()));
                }
                if init.family() != family {
                    return Err(EngineError::FamilyMismatch {
                        doc_id: doc_id.to_string(),
                        expected: init.family(),
                        actual: family,
                    });
                }
                snapshot.data = Some(init.to_data(doc_id));
            }
            Effect::Edit { descriptors } => {
                let Some(data) = snapshot.data.as_mut() else {
                    return Err(EngineError::MissingDocument(doc_id.to_string()));
                };
                let grouped = group_by_kind(descriptors);
                for kind in KIND_APPLY_ORDER {
                    let Some(batch) = grouped.get(&kind) else {
                        continue;
                    };
                    for descriptor in batch {
                        apply_descriptor(doc_id, data, descriptor)?;
                    }
                }
            }
            Effect::Delete => {
                if snapshot.data.is_none() {
                    return Err(EngineError::MissingDocument(doc_id.to_string()));
                }
                snapshot.data = None;
                tombstoned = true;
            }
        }
        snapshot.version = op.version;
    }

    Ok(snapshot)
}

fn apply_descriptor(
    doc_id: &str,
    data: &mut DocData,
    descriptor: &MutationDescriptor,
) -> EngineResult<()> {
    match (data, descriptor) {
        (DocData::Field(field), MutationDescriptor::SetFieldName { name }) => {
            field.name = name.clone();
        }
        (DocData::Field(field), MutationDescriptor::SetColumnMeta { view_id, key, value }) => {
            field
                .column_meta
                .entry(view_id.clone())
                .or_default()
                .insert(key.clone(), value.clone());
        }
        (DocData::Field(field), MutationDescriptor::AddColumnMeta { view_id, entries }) => {
            field
                .column_meta
                .entry(view_id.clone())
                .or_default()
                .extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        (DocData::Record(record), MutationDescriptor::SetRecordOrder { view_id, order }) => {
            record.orders.insert(view_id.clone(), *order);
        }
        (DocData::Record(record), MutationDescriptor::SetRecordCell { field_id, value }) => {
            record.cells.insert(field_id.clone(), value.clone());
        }
        (data, descriptor) => {
            return Err(EngineError::FamilyMismatch {
                doc_id: doc_id.to_string(),
                expected: descriptor.kind().family(),
                actual: data.family(),
            });
        }
    }
    Ok(())
}
