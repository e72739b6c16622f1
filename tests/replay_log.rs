use std::collections::BTreeMap;

use serde_json::json;
use tempfile::TempDir;

use gridstore::{
    commit::commit,
    doc::{DocInit, FieldInit, FieldKind, RecordInit},
    error::EngineError,
    op::{MutationDescriptor, Operation},
    persist::sqlite::{CollectionStore, load_ops_range},
    replay::replay_snapshot,
    snapshot::get_snapshots,
};

const COLLECTION: &str = "tblContacts";

#[test]
fn replayed_log_matches_stored_state_across_reopen() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("ops.db");

    let mut store = CollectionStore::open(&db_path).expect("open");

    commit(
        &mut store,
        COLLECTION,
        "fld1",
        &Operation::create(
            "client-a",
            1,
            DocInit::Field(FieldInit {
                name: "Name".to_string(),
                kind: FieldKind::Number { precision: 1 },
                column_meta: Default::default(),
            }),
        ),
    )
    .expect("create field");
    commit(
        &mut store,
        COLLECTION,
        "fld1",
        &Operation::edit(
            "client-a",
            2,
            2,
            vec![
                MutationDescriptor::SetFieldName {
                    name: "Score".to_string(),
                },
                MutationDescriptor::SetColumnMeta {
                    view_id: "viw1".to_string(),
                    key: "width".to_string(),
                    value: json!(140),
                },
            ],
        ),
    )
    .expect("edit field");

    let mut cells = BTreeMap::new();
    cells.insert("fld1".to_string(), json!(9.5));
    commit(
        &mut store,
        COLLECTION,
        "rec1",
        &Operation::create(
            "client-b",
            1,
            DocInit::Record(RecordInit {
                cells,
                orders: BTreeMap::new(),
            }),
        ),
    )
    .expect("create record");
    commit(
        &mut store,
        COLLECTION,
        "rec1",
        &Operation::edit(
            "client-b",
            2,
            2,
            vec![
                MutationDescriptor::SetRecordOrder {
                    view_id: "viw1".to_string(),
                    order: 0.5,
                },
                MutationDescriptor::SetRecordCell {
                    field_id: "fld1".to_string(),
                    value: json!(10),
                },
            ],
        ),
    )
    .expect("edit record");

    commit(
        &mut store,
        COLLECTION,
        "rec2",
        &Operation::create("client-b", 3, DocInit::Record(RecordInit::default())),
    )
    .expect("create second record");
    commit(
        &mut store,
        COLLECTION,
        "rec2",
        &Operation::delete("client-b", 4, 2),
    )
    .expect("delete second record");

    drop(store);
    let store = CollectionStore::open(&db_path).expect("reopen");

    for doc_id in ["fld1", "rec1", "rec2"] {
        let ops =
            load_ops_range(store.connection(), COLLECTION, doc_id, 1, u64::MAX).expect("ops");
        let replayed = replay_snapshot(doc_id, &ops).expect("replay");
        let stored = get_snapshots(store.connection(), COLLECTION, &[doc_id.to_string()], None)
            .expect("stored")
            .remove(0);
        assert_eq!(replayed, stored, "replay diverged for {doc_id}");
    }
}

#[test]
fn replay_covers_point_in_time_reads() {
    let mut store = CollectionStore::open_in_memory().expect("open");

    commit(
        &mut store,
        COLLECTION,
        "rec1",
        &Operation::create("client-a", 1, DocInit::Record(RecordInit::default())),
    )
    .expect("create");
    for version in 2..=5u64 {
        commit(
            &mut store,
            COLLECTION,
            "rec1",
            &Operation::edit(
                "client-a",
                version,
                version,
                vec![MutationDescriptor::SetRecordCell {
                    field_id: "fldN".to_string(),
                    value: json!(version),
                }],
            ),
        )
        .expect("edit");
    }

    // History up to (but excluding) version 4 reconstructs the state as of
    // version 3.
    let ops = load_ops_range(store.connection(), COLLECTION, "rec1", 1, 4).expect("ops");
    let snap = replay_snapshot("rec1", &ops).expect("replay");
    assert_eq!(snap.version, 3);
    match snap.data.expect("record data") {
        gridstore::doc::DocData::Record(record) => {
            assert_eq!(record.cells["fldN"], json!(3));
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[test]
fn replay_rejects_version_gaps() {
    let ops = vec![
        Operation::create("c", 1, DocInit::Record(RecordInit::default())),
        Operation::edit(
            "c",
            2,
            3,
            vec![MutationDescriptor::SetRecordCell {
                field_id: "fldA".to_string(),
                value: json!(1),
            }],
        ),
    ];
    let err = replay_snapshot("rec1", &ops).expect_err("gap");
    assert!(matches!(
        err,
        EngineError::VersionConflict {
            expected: 2,
            actual: 3,
            ..
        }
    ));
}
