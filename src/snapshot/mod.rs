//! Snapshot reconstructors: one per document family.
//!
//! Reconstruction shapes stored rows into the externally visible
//! [`Snapshot`] form. Results always align positionally with the requested
//! ids; a missing document is a valid zero-version snapshot, not an error.

use hashbrown::HashMap;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::doc::{
    AggregateDoc, ColumnMeta, DocData, FieldDoc, FieldKind, FilterSpec, GroupRule, RecordDoc,
    Snapshot, SortSpec, TableDoc, ViewDoc, ViewOptions,
};
use crate::error::{EngineError, EngineResult};
use crate::persist::PersistError;
use crate::persist::sqlite;
use crate::types::{AggregateKey, DocFamily, DocId, family_of, parse_aggregate_id};

/// Bulk-reads current snapshots for `ids`, preserving request order.
///
/// All ids must belong to one family. `projection` restricts record cells to
/// the named fields; `None` is the internal no-projection sentinel and
/// bypasses projection entirely. Non-record families ignore it.
pub fn get_snapshots(
    conn: &Connection,
    collection_id: &str,
    ids: &[DocId],
    projection: Option<&[DocId]>,
) -> EngineResult<Vec<Snapshot>> {
    let Some(first) = ids.first() else {
        return Ok(Vec::new());
    };
    let family = family_of(first)?;
    for id in &ids[1..] {
        let other = family_of(id)?;
        if other != family {
            return Err(EngineError::MixedFamily(family, other));
        }
    }

    match family {
        DocFamily::Table => table_snapshots(conn, collection_id, ids),
        DocFamily::Field => field_snapshots(conn, collection_id, ids),
        DocFamily::View => view_snapshots(conn, collection_id, ids),
        DocFamily::Record => record_snapshots(conn, collection_id, ids, projection),
        DocFamily::Aggregate => aggregate_snapshots(conn, collection_id, ids),
    }
}

fn table_snapshots(
    conn: &Connection,
    collection_id: &str,
    ids: &[DocId],
) -> EngineResult<Vec<Snapshot>> {
    let rows = sqlite::fetch_table_rows(conn, collection_id, ids)?;
    let by_id: HashMap<DocId, _> = rows.into_iter().map(|r| (r.id.clone(), r)).collect();

    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        let Some(row) = by_id.get(id) else {
            out.push(Snapshot::absent(id.clone()));
            continue;
        };
        let data = (!row.deleted).then(|| {
            DocData::Table(TableDoc {
                id: row.id.clone(),
                name: row.name.clone(),
                description: row.description.clone(),
            })
        });
        out.push(Snapshot {
            id: id.clone(),
            version: row.version,
            data,
        });
    }
    Ok(out)
}

fn field_snapshots(
    conn: &Connection,
    collection_id: &str,
    ids: &[DocId],
) -> EngineResult<Vec<Snapshot>> {
    let rows = sqlite::fetch_field_rows(conn, collection_id, ids)?;
    let by_id: HashMap<DocId, _> = rows.into_iter().map(|r| (r.id.clone(), r)).collect();

    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        let Some(row) = by_id.get(id) else {
            out.push(Snapshot::absent(id.clone()));
            continue;
        };
        let data = if row.deleted {
            None
        } else {
            let options: Option<Value> = parse_json_opt(row.options.as_deref())?;
            let kind =
                FieldKind::from_stored(&row.field_kind, options.as_ref()).ok_or_else(|| {
                    PersistError::Message(format!(
                        "unknown field kind `{}` for {}",
                        row.field_kind, row.id
                    ))
                })?;
            let column_meta: ColumnMeta =
                parse_json_opt(row.column_meta.as_deref())?.unwrap_or_default();
            Some(DocData::Field(FieldDoc {
                id: row.id.clone(),
                name: row.name.clone(),
                kind,
                column_meta,
            }))
        };
        out.push(Snapshot {
            id: id.clone(),
            version: row.version,
            data,
        });
    }
    Ok(out)
}

fn view_snapshots(
    conn: &Connection,
    collection_id: &str,
    ids: &[DocId],
) -> EngineResult<Vec<Snapshot>> {
    let rows = sqlite::fetch_view_rows(conn, collection_id, ids)?;
    let by_id: HashMap<DocId, _> = rows.into_iter().map(|r| (r.id.clone(), r)).collect();

    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        let Some(row) = by_id.get(id) else {
            out.push(Snapshot::absent(id.clone()));
            continue;
        };
        let data = if row.deleted {
            None
        } else {
            let filter: Option<FilterSpec> = parse_json_opt(row.filter.as_deref())?;
            let sort: Option<SortSpec> = parse_json_opt(row.sort_spec.as_deref())?;
            let group: Option<Vec<GroupRule>> = parse_json_opt(row.group_spec.as_deref())?;
            let options: Option<ViewOptions> = parse_json_opt(row.options.as_deref())?;
            Some(DocData::View(ViewDoc {
                id: row.id.clone(),
                name: row.name.clone(),
                filter,
                sort,
                group,
                options,
            }))
        };
        out.push(Snapshot {
            id: id.clone(),
            version: row.version,
            data,
        });
    }
    Ok(out)
}

fn record_snapshots(
    conn: &Connection,
    collection_id: &str,
    ids: &[DocId],
    projection: Option<&[DocId]>,
) -> EngineResult<Vec<Snapshot>> {
    let rows = sqlite::fetch_record_rows(conn, collection_id, ids)?;
    let by_id: HashMap<DocId, _> = rows.into_iter().map(|r| (r.id.clone(), r)).collect();

    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        let Some(row) = by_id.get(id) else {
            out.push(Snapshot::absent(id.clone()));
            continue;
        };
        let data = if row.deleted {
            None
        } else {
            let mut record = RecordDoc {
                id: row.id.clone(),
                cells: serde_json::from_str(&row.cells).map_err(PersistError::from)?,
                orders: serde_json::from_str(&row.orders).map_err(PersistError::from)?,
            };
            if let Some(fields) = projection {
                record.cells.retain(|field_id, _| fields.contains(field_id));
            }
            Some(DocData::Record(record))
        };
        out.push(Snapshot {
            id: id.clone(),
            version: row.version,
            data,
        });
    }
    Ok(out)
}

fn aggregate_snapshots(
    conn: &Connection,
    collection_id: &str,
    ids: &[DocId],
) -> EngineResult<Vec<Snapshot>> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        let (key, view_id) = parse_aggregate_id(id)?;
        let value = match key {
            AggregateKey::RowCount => sqlite::live_record_count(conn, collection_id)?,
            other => {
                return Err(EngineError::UnimplementedAggregate(other.as_str().to_string()));
            }
        };
        out.push(Snapshot {
            id: id.clone(),
            // Aggregates are computed on demand and carry no stored version.
            version: 1,
            data: Some(DocData::Aggregate(AggregateDoc {
                key,
                view_id,
                value,
            })),
        });
    }
    Ok(out)
}

fn parse_json_opt<T: DeserializeOwned>(raw: Option<&str>) -> Result<Option<T>, PersistError> {
    match raw {
        None => Ok(None),
        Some(text) if text.trim().is_empty() || text == "null" => Ok(None),
        Some(text) => Ok(Some(serde_json::from_str(text)?)),
    }
}
