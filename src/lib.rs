//! Transactional backing store for realtime collaborative grid documents,
//! with an append-only SQLite op log and optimistic version checking.
//!
//! Clients propose versioned operations against table, field, view, and
//! record documents; the commit path accepts only the causally next version,
//! persists the raw operation and the resulting state atomically, and the
//! read path reconstructs snapshots and resolves live-query id sets.
//!
//! # Examples
//!
//! Direct store usage with [`commit::commit`] and
//! [`snapshot::get_snapshots`]:
//! ```
//! use gridstore::{
//!     commit::commit,
//!     doc::{DocInit, RecordInit},
//!     op::Operation,
//!     persist::sqlite::CollectionStore,
//!     snapshot::get_snapshots,
//! };
//!
//! let mut store = CollectionStore::open_in_memory().expect("open");
//! let op = Operation::create("client-a", 1, DocInit::Record(RecordInit::default()));
//! let version = commit(&mut store, "tblTasks", "rec1", &op).expect("commit");
//! assert_eq!(version, 1);
//!
//! let snaps = get_snapshots(store.connection(), "tblTasks", &["rec1".to_string()], None)
//!     .expect("read");
//! assert_eq!(snaps[0].version, 1);
//! ```
//!
//! Runtime usage with a per-collection handle:
//! ```
//! use gridstore::{
//!     doc::{DocInit, TableInit},
//!     op::Operation,
//!     persist::sqlite::CollectionStore,
//!     runtime::handle::{RuntimeConfig, spawn_collection},
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = CollectionStore::open_in_memory().expect("open");
//! let handle = spawn_collection(store, "tblTasks", RuntimeConfig::default());
//! let op = Operation::create(
//!     "client-a",
//!     1,
//!     DocInit::Table(TableInit {
//!         name: "Tasks".to_string(),
//!         description: None,
//!     }),
//! );
//! let version = handle.commit("tblTasks", op).await.expect("commit");
//! assert_eq!(version, 1);
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Commit coordinator and mutation appliers.
pub mod commit;
/// Document snapshot model and per-family payloads.
pub mod doc;
/// Engine error taxonomy.
pub mod error;
/// Operation model and persistence wrapper types.
pub mod op;
/// Persistence layer: op log and family-row storage.
pub mod persist;
/// Live-query resolution and invalidation.
pub mod query;
/// In-memory replay of logged operations.
pub mod replay;
/// Per-collection async runtime handle and events.
pub mod runtime;
/// Snapshot reconstructors.
pub mod snapshot;
/// Shared identifiers and family classification.
pub mod types;
