use std::sync::{Arc, Barrier};
use std::thread;

use serde_json::json;
use tempfile::TempDir;

use gridstore::{
    commit::commit,
    doc::{DocInit, RecordInit},
    error::EngineError,
    op::{MutationDescriptor, Operation},
    persist::sqlite::{CollectionStore, load_ops_range},
    snapshot::get_snapshots,
};

const COLLECTION: &str = "tblContacts";

#[test]
fn racing_commits_at_one_version_produce_exactly_one_winner() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("race.db");

    let mut setup = CollectionStore::open(&db_path).expect("open");
    commit(
        &mut setup,
        COLLECTION,
        "rec1",
        &Operation::create("setup", 1, DocInit::Record(RecordInit::default())),
    )
    .expect("create");
    drop(setup);

    let barrier = Arc::new(Barrier::new(2));
    let mut joins = Vec::new();
    for writer in ["client-a", "client-b"] {
        let barrier = Arc::clone(&barrier);
        let db_path = db_path.clone();
        joins.push(thread::spawn(move || {
            let mut store = CollectionStore::open(&db_path).expect("open writer");
            let op = Operation::edit(
                writer,
                1,
                2,
                vec![MutationDescriptor::SetRecordCell {
                    field_id: "fldName".to_string(),
                    value: json!(writer),
                }],
            );
            barrier.wait();
            commit(&mut store, COLLECTION, "rec1", &op)
        }));
    }

    let outcomes: Vec<_> = joins
        .into_iter()
        .map(|j| j.join().expect("writer thread"))
        .collect();

    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "exactly one racer may commit version 2");
    let loss = outcomes
        .iter()
        .find_map(|r| r.as_ref().err())
        .expect("one racer must lose");
    assert!(matches!(
        loss,
        EngineError::VersionConflict {
            expected: 3,
            actual: 2,
            ..
        }
    ));

    let reader = CollectionStore::open(&db_path).expect("reopen");
    let ops = load_ops_range(reader.connection(), COLLECTION, "rec1", 2, 3).expect("ops");
    assert_eq!(ops.len(), 1, "version 2 must be logged exactly once");

    let snap = get_snapshots(reader.connection(), COLLECTION, &["rec1".to_string()], None)
        .expect("read")
        .remove(0);
    assert_eq!(snap.version, 2);
}
