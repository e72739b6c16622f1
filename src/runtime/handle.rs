//! Cloneable async handle over one collection's store.
//!
//! Commands are serialized through a single worker task; blocking SQLite
//! work runs under `spawn_blocking` against a shared store. Successful
//! commits are published on a broadcast stream so a sync transport can drive
//! live-query re-resolution.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tracing::warn;

use crate::commit;
use crate::doc::Snapshot;
use crate::error::EngineError;
use crate::op::Operation;
use crate::persist::sqlite::{self, CollectionStore};
use crate::query::{self, DocQuery};
use crate::snapshot;
use crate::types::{CollectionId, DocId, Version, family_of};

use super::events::StoreEvent;

/// Errors surfaced through the runtime handle.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Engine-level failure, including version conflicts.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// The worker task is gone.
    #[error("runtime channel closed")]
    ChannelClosed,
    /// A blocking storage task failed to join.
    #[error("blocking task failed: {0}")]
    Task(String),
}

/// Runtime tuning knobs.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Bound of the command queue; senders wait when it is full.
    pub command_queue_bound: usize,
    /// Capacity of the broadcast event buffer.
    pub event_buffer: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_queue_bound: 256,
            event_buffer: 1024,
        }
    }
}

/// Cloneable handle to a spawned collection runtime.
pub struct CollectionHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<StoreEvent>,
}

impl Clone for CollectionHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
        }
    }
}

enum Command {
    Commit {
        doc_id: DocId,
        op: Operation,
        resp: oneshot::Sender<Result<Version, RuntimeError>>,
    },
    GetSnapshots {
        ids: Vec<DocId>,
        projection: Option<Vec<DocId>>,
        resp: oneshot::Sender<Result<Vec<Snapshot>, RuntimeError>>,
    },
    ResolveIds {
        query: DocQuery,
        resp: oneshot::Sender<Result<Vec<DocId>, RuntimeError>>,
    },
    GetOperations {
        doc_id: DocId,
        from: Version,
        to_exclusive: Version,
        resp: oneshot::Sender<Result<Vec<Operation>, RuntimeError>>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

/// Spawns the worker task for one collection and returns its handle.
pub fn spawn_collection(
    store: CollectionStore,
    collection_id: impl Into<CollectionId>,
    config: RuntimeConfig,
) -> CollectionHandle {
    let collection_id = collection_id.into();
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound);
    let (events_tx, _) = broadcast::channel::<StoreEvent>(config.event_buffer);

    let store = Arc::new(Mutex::new(store));
    let events_tx_loop = events_tx.clone();

    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            let done = handle_command(cmd, &store, &collection_id, &events_tx_loop).await;
            if done {
                break;
            }
        }
    });

    CollectionHandle { cmd_tx, events_tx }
}

impl CollectionHandle {
    /// Subscribes to the commit event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events_tx.subscribe()
    }

    /// Commits one operation; returns the committed version.
    pub async fn commit(&self, doc_id: impl Into<DocId>, op: Operation) -> Result<Version, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Commit {
                doc_id: doc_id.into(),
                op,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Bulk-reads current snapshots, preserving id order.
    pub async fn get_snapshots(
        &self,
        ids: Vec<DocId>,
        projection: Option<Vec<DocId>>,
    ) -> Result<Vec<Snapshot>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::GetSnapshots {
                ids,
                projection,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Resolves the current id set for a standing query.
    pub async fn resolve_ids(&self, query: DocQuery) -> Result<Vec<DocId>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ResolveIds { query, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Loads a document's logged operations with `from <= version < to_exclusive`.
    pub async fn get_operations(
        &self,
        doc_id: impl Into<DocId>,
        from: Version,
        to_exclusive: Version,
    ) -> Result<Vec<Operation>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::GetOperations {
                doc_id: doc_id.into(),
                from,
                to_exclusive,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Stops the worker task after draining queued commands.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }
}

async fn handle_command(
    cmd: Command,
    store: &Arc<Mutex<CollectionStore>>,
    collection_id: &CollectionId,
    events_tx: &broadcast::Sender<StoreEvent>,
) -> bool {
    match cmd {
        Command::Commit { doc_id, op, resp } => {
            let affects_queries = query::affects_query(&op);
            let res = {
                let doc_id = doc_id.clone();
                run_blocking(store, collection_id, move |store, collection_id| {
                    commit::commit(store, collection_id, &doc_id, &op)
                })
                .await
            };
            if let Ok(version) = &res {
                if let Ok(family) = family_of(&doc_id) {
                    let _ = events_tx.send(StoreEvent::Committed {
                        doc_id: doc_id.clone(),
                        family,
                        version: *version,
                        affects_queries,
                    });
                }
            }
            if resp.send(res).is_err() {
                warn!(%doc_id, "commit response receiver dropped");
            }
        }
        Command::GetSnapshots {
            ids,
            projection,
            resp,
        } => {
            let res = run_blocking(store, collection_id, move |store, collection_id| {
                snapshot::get_snapshots(
                    store.connection(),
                    collection_id,
                    &ids,
                    projection.as_deref(),
                )
            })
            .await;
            let _ = resp.send(res);
        }
        Command::ResolveIds { query, resp } => {
            let res = run_blocking(store, collection_id, move |store, collection_id| {
                query::resolve_ids(store.connection(), collection_id, &query)
            })
            .await;
            let _ = resp.send(res);
        }
        Command::GetOperations {
            doc_id,
            from,
            to_exclusive,
            resp,
        } => {
            let res = run_blocking(store, collection_id, move |store, collection_id| {
                sqlite::load_ops_range(store.connection(), collection_id, &doc_id, from, to_exclusive)
                    .map_err(EngineError::from)
            })
            .await;
            let _ = resp.send(res);
        }
        Command::Shutdown { resp } => {
            let _ = resp.send(());
            return true;
        }
    }

    false
}

async fn run_blocking<T, F>(
    store: &Arc<Mutex<CollectionStore>>,
    collection_id: &CollectionId,
    f: F,
) -> Result<T, RuntimeError>
where
    T: Send + 'static,
    F: FnOnce(&mut CollectionStore, &str) -> Result<T, EngineError> + Send + 'static,
{
    let store = Arc::clone(store);
    let collection_id = collection_id.clone();
    tokio::task::spawn_blocking(move || {
        let mut store = store.blocking_lock();
        f(&mut store, &collection_id).map_err(RuntimeError::from)
    })
    .await
    .map_err(|e| RuntimeError::Task(e.to_string()))?
}
