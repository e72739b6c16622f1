//! SQLite-backed collection storage: append-only op log plus one table per
//! storable document family.
//!
//! Everything here operates on a caller-supplied connection or transaction;
//! nothing commits on its own. The commit coordinator owns transaction
//! boundaries.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{
    Connection, OptionalExtension, Transaction, TransactionBehavior, params, params_from_iter,
};
use serde_json::Value;

use crate::doc::{ColumnMeta, FieldInit, RecordInit, TableInit, ViewInit};
use crate::op::{OP_FORMAT_VERSION, Operation, StoredOpEnvelope};
use crate::types::{DocFamily, DocId, Version};

use super::{PersistError, PersistResult};

/// Handle to one collection's SQLite database.
///
/// Multiple stores may be opened on the same file; WAL mode plus immediate
/// write transactions serialize concurrent committers.
pub struct CollectionStore {
    conn: Connection,
}

impl CollectionStore {
    /// Opens or creates a store at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory store.
    pub fn open_in_memory() -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> PersistResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }

    /// Starts a write transaction.
    ///
    /// `BEGIN IMMEDIATE` so racing committers on the same file queue behind
    /// the write lock and observe each other's committed versions.
    pub fn begin(&mut self) -> PersistResult<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }

    /// Read-only access for snapshot and query paths.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Appends one serialized operation to the log at its declared version.
///
/// The `(collection_id, doc_id, version)` primary key is the final backstop
/// for the one-writer-per-version invariant.
pub fn append_op(
    conn: &Connection,
    collection_id: &str,
    doc_id: &str,
    op: &Operation,
) -> PersistResult<()> {
    let payload = serde_json::to_vec(&StoredOpEnvelope::new(op.clone()))?;
    conn.execute(
        "INSERT INTO ops(collection_id, doc_id, version, created_ms, payload)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            collection_id,
            doc_id,
            op.version as i64,
            now_ms() as i64,
            payload
        ],
    )?;
    Ok(())
}

/// Highest logged version for a document, 0 when none exists.
pub fn max_logged_version(
    conn: &Connection,
    collection_id: &str,
    doc_id: &str,
) -> PersistResult<Version> {
    let version: Option<i64> = conn.query_row(
        "SELECT MAX(version) FROM ops WHERE collection_id = ?1 AND doc_id = ?2",
        params![collection_id, doc_id],
        |row| row.get(0),
    )?;
    Ok(version.unwrap_or(0) as Version)
}

/// Loads operations with `from <= version < to_exclusive`, ascending.
pub fn load_ops_range(
    conn: &Connection,
    collection_id: &str,
    doc_id: &str,
    from: Version,
    to_exclusive: Version,
) -> PersistResult<Vec<Operation>> {
    let mut stmt = conn.prepare(
        "SELECT payload FROM ops
         WHERE collection_id = ?1 AND doc_id = ?2 AND version >= ?3 AND version < ?4
         ORDER BY version ASC",
    )?;
    let from = from.min(i64::MAX as Version) as i64;
    let to = to_exclusive.min(i64::MAX as Version) as i64;
    let rows = stmt.query_map(params![collection_id, doc_id, from, to], |row| {
        row.get::<_, Vec<u8>>(0)
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(decode_op_payload(&row?)?);
    }
    Ok(out)
}

fn decode_op_payload(payload: &[u8]) -> PersistResult<Operation> {
    let envelope: StoredOpEnvelope = serde_json::from_slice(payload)?;
    if envelope.format_version != OP_FORMAT_VERSION {
        return Err(PersistError::Message(format!(
            "unsupported op format version: {}",
            envelope.format_version
        )));
    }
    Ok(envelope.op)
}

fn family_table(family: DocFamily) -> PersistResult<&'static str> {
    match family {
        DocFamily::Table => Ok("doc_tables"),
        DocFamily::Field => Ok("doc_fields"),
        DocFamily::View => Ok("doc_views"),
        DocFamily::Record => Ok("doc_records"),
        DocFamily::Aggregate => Err(PersistError::Message(
            "aggregate documents have no backing table".to_string(),
        )),
    }
}

/// True when a row for `id` exists, live or tombstoned.
pub fn row_exists(
    conn: &Connection,
    family: DocFamily,
    collection_id: &str,
    id: &str,
) -> PersistResult<bool> {
    let table = family_table(family)?;
    let sql = format!("SELECT 1 FROM {table} WHERE collection_id = ?1 AND id = ?2");
    Ok(conn
        .query_row(&sql, params![collection_id, id], |_| Ok(()))
        .optional()?
        .is_some())
}

/// Bumps a live row's version without touching its payload. Returns rows
/// affected.
///
/// Keeps the row-version-equals-max-logged-version invariant for edits that
/// carry no descriptors.
pub fn bump_doc_version(
    conn: &Connection,
    family: DocFamily,
    collection_id: &str,
    id: &str,
    version: Version,
) -> PersistResult<usize> {
    let table = family_table(family)?;
    let sql = format!(
        "UPDATE {table} SET version = ?3
         WHERE collection_id = ?1 AND id = ?2 AND deleted = 0"
    );
    Ok(conn.execute(&sql, params![collection_id, id, version as i64])?)
}

/// Tombstones a live row and bumps its version. Returns rows affected.
pub fn mark_deleted(
    conn: &Connection,
    family: DocFamily,
    collection_id: &str,
    id: &str,
    version: Version,
) -> PersistResult<usize> {
    let table = family_table(family)?;
    let sql = format!(
        "UPDATE {table} SET deleted = 1, version = ?3
         WHERE collection_id = ?1 AND id = ?2 AND deleted = 0"
    );
    Ok(conn.execute(&sql, params![collection_id, id, version as i64])?)
}

/// Inserts a table row from its create payload.
pub fn insert_table_row(
    conn: &Connection,
    collection_id: &str,
    id: &str,
    version: Version,
    init: &TableInit,
) -> PersistResult<()> {
    conn.execute(
        "INSERT INTO doc_tables(collection_id, id, version, name, description, deleted, created_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        params![
            collection_id,
            id,
            version as i64,
            init.name,
            init.description,
            now_ms() as i64
        ],
    )?;
    Ok(())
}

/// Inserts a field row from its create payload.
pub fn insert_field_row(
    conn: &Connection,
    collection_id: &str,
    id: &str,
    version: Version,
    init: &FieldInit,
) -> PersistResult<()> {
    let options = init.kind.options_value().map(|v| v.to_string());
    let column_meta = if init.column_meta.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&init.column_meta)?)
    };
    conn.execute(
        "INSERT INTO doc_fields(collection_id, id, version, name, field_kind, options, column_meta, deleted, created_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
        params![
            collection_id,
            id,
            version as i64,
            init.name,
            init.kind.stored_kind(),
            options,
            column_meta,
            now_ms() as i64
        ],
    )?;
    Ok(())
}

/// Inserts a view row from its create payload.
pub fn insert_view_row(
    conn: &Connection,
    collection_id: &str,
    id: &str,
    version: Version,
    init: &ViewInit,
) -> PersistResult<()> {
    let filter = init.filter.as_ref().map(serde_json::to_string).transpose()?;
    let sort_spec = init.sort.as_ref().map(serde_json::to_string).transpose()?;
    let group_spec = init.group.as_ref().map(serde_json::to_string).transpose()?;
    let options = init.options.as_ref().map(serde_json::to_string).transpose()?;
    conn.execute(
        "INSERT INTO doc_views(collection_id, id, version, name, filter, sort_spec, group_spec, options, deleted, created_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)",
        params![
            collection_id,
            id,
            version as i64,
            init.name,
            filter,
            sort_spec,
            group_spec,
            options,
            now_ms() as i64
        ],
    )?;
    Ok(())
}

/// Inserts a record row from its create payload.
pub fn insert_record_row(
    conn: &Connection,
    collection_id: &str,
    id: &str,
    version: Version,
    init: &RecordInit,
) -> PersistResult<()> {
    conn.execute(
        "INSERT INTO doc_records(collection_id, id, version, cells, orders, deleted, created_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        params![
            collection_id,
            id,
            version as i64,
            serde_json::to_string(&init.cells)?,
            serde_json::to_string(&init.orders)?,
            now_ms() as i64
        ],
    )?;
    Ok(())
}

/// Stored table row as fetched for reconstruction.
#[derive(Debug, Clone)]
pub struct TableRow {
    /// Document id.
    pub id: DocId,
    /// Current version.
    pub version: Version,
    /// Table display name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Tombstone flag.
    pub deleted: bool,
}

/// Stored field row as fetched for reconstruction.
#[derive(Debug, Clone)]
pub struct FieldRow {
    /// Document id.
    pub id: DocId,
    /// Current version.
    pub version: Version,
    /// Field display name.
    pub name: String,
    /// Kind discriminator string.
    pub field_kind: String,
    /// Kind-specific options JSON.
    pub options: Option<String>,
    /// Per-view metadata JSON.
    pub column_meta: Option<String>,
    /// Tombstone flag.
    pub deleted: bool,
}

/// Stored view row as fetched for reconstruction.
#[derive(Debug, Clone)]
pub struct ViewRow {
    /// Document id.
    pub id: DocId,
    /// Current version.
    pub version: Version,
    /// View display name.
    pub name: String,
    /// Filter configuration JSON.
    pub filter: Option<String>,
    /// Sort configuration JSON.
    pub sort_spec: Option<String>,
    /// Grouping configuration JSON.
    pub group_spec: Option<String>,
    /// Display options JSON.
    pub options: Option<String>,
    /// Tombstone flag.
    pub deleted: bool,
}

/// Stored record row as fetched for reconstruction.
#[derive(Debug, Clone)]
pub struct RecordRow {
    /// Document id.
    pub id: DocId,
    /// Current version.
    pub version: Version,
    /// Cell values JSON, keyed by field id.
    pub cells: String,
    /// Position keys JSON, keyed by view id.
    pub orders: String,
    /// Tombstone flag.
    pub deleted: bool,
}

/// Bulk-fetches table rows for `ids`, in storage order.
pub fn fetch_table_rows(
    conn: &Connection,
    collection_id: &str,
    ids: &[DocId],
) -> PersistResult<Vec<TableRow>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, version, name, description, deleted FROM doc_tables
         WHERE collection_id = ? AND id IN ({})",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params_from_iter(std::iter::once(collection_id).chain(ids.iter().map(String::as_str))),
        |row| {
            Ok(TableRow {
                id: row.get(0)?,
                version: row.get::<_, i64>(1)? as Version,
                name: row.get(2)?,
                description: row.get(3)?,
                deleted: row.get::<_, i64>(4)? != 0,
            })
        },
    )?;
    collect_rows(rows)
}

/// Bulk-fetches field rows for `ids`, in storage order.
pub fn fetch_field_rows(
    conn: &Connection,
    collection_id: &str,
    ids: &[DocId],
) -> PersistResult<Vec<FieldRow>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, version, name, field_kind, options, column_meta, deleted FROM doc_fields
         WHERE collection_id = ? AND id IN ({})",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params_from_iter(std::iter::once(collection_id).chain(ids.iter().map(String::as_str))),
        |row| {
            Ok(FieldRow {
                id: row.get(0)?,
                version: row.get::<_, i64>(1)? as Version,
                name: row.get(2)?,
                field_kind: row.get(3)?,
                options: row.get(4)?,
                column_meta: row.get(5)?,
                deleted: row.get::<_, i64>(6)? != 0,
            })
        },
    )?;
    collect_rows(rows)
}

/// Bulk-fetches view rows for `ids`, in storage order.
pub fn fetch_view_rows(
    conn: &Connection,
    collection_id: &str,
    ids: &[DocId],
) -> PersistResult<Vec<ViewRow>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, version, name, filter, sort_spec, group_spec, options, deleted FROM doc_views
         WHERE collection_id = ? AND id IN ({})",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params_from_iter(std::iter::once(collection_id).chain(ids.iter().map(String::as_str))),
        |row| {
            Ok(ViewRow {
                id: row.get(0)?,
                version: row.get::<_, i64>(1)? as Version,
                name: row.get(2)?,
                filter: row.get(3)?,
                sort_spec: row.get(4)?,
                group_spec: row.get(5)?,
                options: row.get(6)?,
                deleted: row.get::<_, i64>(7)? != 0,
            })
        },
    )?;
    collect_rows(rows)
}

/// Bulk-fetches record rows for `ids`, in storage order.
pub fn fetch_record_rows(
    conn: &Connection,
    collection_id: &str,
    ids: &[DocId],
) -> PersistResult<Vec<RecordRow>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, version, cells, orders, deleted FROM doc_records
         WHERE collection_id = ? AND id IN ({})",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params_from_iter(std::iter::once(collection_id).chain(ids.iter().map(String::as_str))),
        |row| {
            Ok(RecordRow {
                id: row.get(0)?,
                version: row.get::<_, i64>(1)? as Version,
                cells: row.get(2)?,
                orders: row.get(3)?,
                deleted: row.get::<_, i64>(4)? != 0,
            })
        },
    )?;
    collect_rows(rows)
}

/// Live record state used by the record appliers.
#[derive(Debug, Clone)]
pub struct RecordState {
    /// Decoded cell values.
    pub cells: BTreeMap<DocId, Value>,
    /// Decoded position keys.
    pub orders: BTreeMap<DocId, f64>,
}

/// Reads a live record's decoded cells and orders; `None` when missing or
/// tombstoned.
pub fn read_record_state(
    conn: &Connection,
    collection_id: &str,
    id: &str,
) -> PersistResult<Option<RecordState>> {
    let raw: Option<(String, String)> = conn
        .query_row(
            "SELECT cells, orders FROM doc_records
             WHERE collection_id = ?1 AND id = ?2 AND deleted = 0",
            params![collection_id, id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((cells, orders)) = raw else {
        return Ok(None);
    };
    Ok(Some(RecordState {
        cells: serde_json::from_str(&cells)?,
        orders: serde_json::from_str(&orders)?,
    }))
}

/// Writes a record's cells back and bumps its version. Returns rows affected.
pub fn write_record_cells(
    conn: &Connection,
    collection_id: &str,
    id: &str,
    cells: &BTreeMap<DocId, Value>,
    version: Version,
) -> PersistResult<usize> {
    Ok(conn.execute(
        "UPDATE doc_records SET cells = ?3, version = ?4
         WHERE collection_id = ?1 AND id = ?2 AND deleted = 0",
        params![
            collection_id,
            id,
            serde_json::to_string(cells)?,
            version as i64
        ],
    )?)
}

/// Writes a record's position keys back and bumps its version.
pub fn write_record_orders(
    conn: &Connection,
    collection_id: &str,
    id: &str,
    orders: &BTreeMap<DocId, f64>,
    version: Version,
) -> PersistResult<usize> {
    Ok(conn.execute(
        "UPDATE doc_records SET orders = ?3, version = ?4
         WHERE collection_id = ?1 AND id = ?2 AND deleted = 0",
        params![
            collection_id,
            id,
            serde_json::to_string(orders)?,
            version as i64
        ],
    )?)
}

/// Reads a live field's decoded per-view metadata; `None` when the field is
/// missing or tombstoned. An absent stored value decodes to an empty map.
pub fn read_column_meta(
    conn: &Connection,
    collection_id: &str,
    field_id: &str,
) -> PersistResult<Option<ColumnMeta>> {
    let raw: Option<Option<String>> = conn
        .query_row(
            "SELECT column_meta FROM doc_fields
             WHERE collection_id = ?1 AND id = ?2 AND deleted = 0",
            params![collection_id, field_id],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        None => Ok(None),
        Some(None) => Ok(Some(ColumnMeta::default())),
        Some(Some(text)) if text.trim().is_empty() => Ok(Some(ColumnMeta::default())),
        Some(Some(text)) => Ok(Some(serde_json::from_str(&text)?)),
    }
}

/// Writes a field's per-view metadata back and bumps its version.
pub fn write_column_meta(
    conn: &Connection,
    collection_id: &str,
    field_id: &str,
    meta: &ColumnMeta,
    version: Version,
) -> PersistResult<usize> {
    Ok(conn.execute(
        "UPDATE doc_fields SET column_meta = ?3, version = ?4
         WHERE collection_id = ?1 AND id = ?2 AND deleted = 0",
        params![
            collection_id,
            field_id,
            serde_json::to_string(meta)?,
            version as i64
        ],
    )?)
}

/// Renames a live field and bumps its version. Returns rows affected.
pub fn update_field_name(
    conn: &Connection,
    collection_id: &str,
    field_id: &str,
    name: &str,
    version: Version,
) -> PersistResult<usize> {
    Ok(conn.execute(
        "UPDATE doc_fields SET name = ?3, version = ?4
         WHERE collection_id = ?1 AND id = ?2 AND deleted = 0",
        params![collection_id, field_id, name, version as i64],
    )?)
}

/// Ids of live field documents, in creation order.
pub fn list_field_ids(conn: &Connection, collection_id: &str) -> PersistResult<Vec<DocId>> {
    list_ids(conn, "doc_fields", collection_id)
}

/// Ids of live view documents, in creation order.
pub fn list_view_ids(conn: &Connection, collection_id: &str) -> PersistResult<Vec<DocId>> {
    list_ids(conn, "doc_views", collection_id)
}

/// Ids of live record documents, in creation order.
pub fn list_record_ids(conn: &Connection, collection_id: &str) -> PersistResult<Vec<DocId>> {
    list_ids(conn, "doc_records", collection_id)
}

fn list_ids(conn: &Connection, table: &str, collection_id: &str) -> PersistResult<Vec<DocId>> {
    let sql = format!(
        "SELECT id FROM {table} WHERE collection_id = ?1 AND deleted = 0
         ORDER BY created_ms ASC, id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![collection_id], |row| row.get::<_, String>(0))?;
    collect_rows(rows)
}

/// Count of live records in the collection.
pub fn live_record_count(conn: &Connection, collection_id: &str) -> PersistResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM doc_records WHERE collection_id = ?1 AND deleted = 0",
        params![collection_id],
        |row| row.get(0),
    )?)
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn collect_rows<T>(
    rows: impl Iterator<Item = Result<T, rusqlite::Error>>,
) -> PersistResult<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
