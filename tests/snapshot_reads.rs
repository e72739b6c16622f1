use std::collections::BTreeMap;

use serde_json::json;

use gridstore::{
    commit::commit,
    doc::{
        Conjunction, DocData, DocInit, FieldInit, FieldKind, FilterCondition, FilterSpec,
        RecordInit, SortRule, SortSpec, ViewInit,
    },
    error::EngineError,
    op::{MutationDescriptor, Operation},
    persist::sqlite::CollectionStore,
    snapshot::get_snapshots,
};

const COLLECTION: &str = "tblContacts";

fn field_init(name: &str, kind: FieldKind) -> DocInit {
    DocInit::Field(FieldInit {
        name: name.to_string(),
        kind,
        column_meta: Default::default(),
    })
}

fn view_init(name: &str) -> ViewInit {
    ViewInit {
        name: name.to_string(),
        filter: None,
        sort: None,
        group: None,
        options: None,
    }
}

fn create(store: &mut CollectionStore, doc_id: &str, init: DocInit) {
    commit(
        store,
        COLLECTION,
        doc_id,
        &Operation::create("client-a", 1, init),
    )
    .expect("create");
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn column_meta_roundtrip_preserves_unrelated_leaves() {
    let mut store = CollectionStore::open_in_memory().expect("open");
    create(&mut store, "fld1", field_init("Name", FieldKind::SingleLineText));

    let mut v1_entries = BTreeMap::new();
    v1_entries.insert("width".to_string(), json!(100));
    v1_entries.insert("hidden".to_string(), json!(false));
    commit(
        &mut store,
        COLLECTION,
        "fld1",
        &Operation::edit(
            "client-a",
            2,
            2,
            vec![
                MutationDescriptor::AddColumnMeta {
                    view_id: "viw1".to_string(),
                    entries: v1_entries,
                },
                MutationDescriptor::SetColumnMeta {
                    view_id: "viw2".to_string(),
                    key: "width".to_string(),
                    value: json!(80),
                },
            ],
        ),
    )
    .expect("seed meta");

    commit(
        &mut store,
        COLLECTION,
        "fld1",
        &Operation::edit(
            "client-b",
            1,
            3,
            vec![MutationDescriptor::SetColumnMeta {
                view_id: "viw1".to_string(),
                key: "width".to_string(),
                value: json!(120),
            }],
        ),
    )
    .expect("patch one leaf");

    let snap = get_snapshots(store.connection(), COLLECTION, &ids(&["fld1"]), None)
        .expect("read")
        .remove(0);
    let DocData::Field(field) = snap.data.expect("field data") else {
        panic!("expected a field payload");
    };
    assert_eq!(field.column_meta["viw1"]["width"], json!(120));
    assert_eq!(field.column_meta["viw1"]["hidden"], json!(false));
    assert_eq!(field.column_meta["viw2"]["width"], json!(80));
}

#[test]
fn bulk_read_preserves_request_order_with_placeholders() {
    let mut store = CollectionStore::open_in_memory().expect("open");
    for id in ["rec1", "rec2", "rec3"] {
        create(&mut store, id, DocInit::Record(RecordInit::default()));
    }

    let requested = ids(&["rec3", "rec1", "rec9", "rec2"]);
    let snaps =
        get_snapshots(store.connection(), COLLECTION, &requested, None).expect("bulk read");

    let returned: Vec<&str> = snaps.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(returned, vec!["rec3", "rec1", "rec9", "rec2"]);
    assert!(snaps[2].is_absent());
    assert_eq!(snaps[2].version, 0);
    assert!(snaps[0].data.is_some());
}

#[test]
fn mixed_family_batch_is_a_caller_error() {
    let mut store = CollectionStore::open_in_memory().expect("open");
    create(&mut store, "rec1", DocInit::Record(RecordInit::default()));
    create(&mut store, "fld1", field_init("Name", FieldKind::SingleLineText));

    let err = get_snapshots(
        store.connection(),
        COLLECTION,
        &ids(&["rec1", "fld1"]),
        None,
    )
    .expect_err("mixed batch");
    assert!(matches!(err, EngineError::MixedFamily(_, _)));
}

#[test]
fn record_projection_limits_cells_and_sentinel_bypasses() {
    let mut store = CollectionStore::open_in_memory().expect("open");
    let mut cells = BTreeMap::new();
    cells.insert("fldA".to_string(), json!("alpha"));
    cells.insert("fldB".to_string(), json!(7));
    create(
        &mut store,
        "rec1",
        DocInit::Record(RecordInit {
            cells,
            orders: BTreeMap::new(),
        }),
    );

    let projection = ids(&["fldA"]);
    let snap = get_snapshots(
        store.connection(),
        COLLECTION,
        &ids(&["rec1"]),
        Some(&projection),
    )
    .expect("projected read")
    .remove(0);
    let DocData::Record(record) = snap.data.expect("record data") else {
        panic!("expected a record payload");
    };
    assert_eq!(record.cells.len(), 1);
    assert_eq!(record.cells["fldA"], json!("alpha"));

    // The commit path reads with the no-projection sentinel and must see
    // every cell.
    let snap = get_snapshots(store.connection(), COLLECTION, &ids(&["rec1"]), None)
        .expect("full read")
        .remove(0);
    let DocData::Record(record) = snap.data.expect("record data") else {
        panic!("expected a record payload");
    };
    assert_eq!(record.cells.len(), 2);
}

#[test]
fn view_config_blobs_decode_and_absent_means_unset() {
    let mut store = CollectionStore::open_in_memory().expect("open");
    create(&mut store, "viw1", DocInit::View(view_init("Bare")));

    let configured = ViewInit {
        name: "Configured".to_string(),
        filter: Some(FilterSpec {
            conjunction: Conjunction::And,
            conditions: vec![FilterCondition {
                field_id: "fldA".to_string(),
                operator: "is".to_string(),
                value: json!("alpha"),
            }],
        }),
        sort: Some(SortSpec {
            rules: vec![SortRule {
                field_id: "fldB".to_string(),
                descending: true,
            }],
        }),
        group: None,
        options: None,
    };
    create(&mut store, "viw2", DocInit::View(configured.clone()));

    let snaps = get_snapshots(store.connection(), COLLECTION, &ids(&["viw1", "viw2"]), None)
        .expect("read views");

    let DocData::View(bare) = snaps[0].data.clone().expect("view data") else {
        panic!("expected a view payload");
    };
    assert!(bare.filter.is_none());
    assert!(bare.sort.is_none());
    assert!(bare.group.is_none());
    assert!(bare.options.is_none());

    let DocData::View(view) = snaps[1].data.clone().expect("view data") else {
        panic!("expected a view payload");
    };
    assert_eq!(view.filter, configured.filter);
    assert_eq!(view.sort, configured.sort);
}

#[test]
fn field_kind_is_rederived_from_stored_attributes() {
    let mut store = CollectionStore::open_in_memory().expect("open");
    create(
        &mut store,
        "fld1",
        field_init("Score", FieldKind::Number { precision: 2 }),
    );
    create(
        &mut store,
        "fld2",
        field_init(
            "Status",
            FieldKind::SingleSelect {
                choices: vec!["todo".to_string(), "done".to_string()],
            },
        ),
    );

    let snaps = get_snapshots(store.connection(), COLLECTION, &ids(&["fld1", "fld2"]), None)
        .expect("read fields");

    let DocData::Field(score) = snaps[0].data.clone().expect("field data") else {
        panic!("expected a field payload");
    };
    assert_eq!(score.kind, FieldKind::Number { precision: 2 });

    let DocData::Field(status) = snaps[1].data.clone().expect("field data") else {
        panic!("expected a field payload");
    };
    assert_eq!(
        status.kind,
        FieldKind::SingleSelect {
            choices: vec!["todo".to_string(), "done".to_string()],
        }
    );
}

#[test]
fn deleted_document_keeps_version_but_loses_data() {
    let mut store = CollectionStore::open_in_memory().expect("open");
    create(&mut store, "rec1", DocInit::Record(RecordInit::default()));
    commit(
        &mut store,
        COLLECTION,
        "rec1",
        &Operation::delete("client-a", 2, 2),
    )
    .expect("delete");

    let snap = get_snapshots(store.connection(), COLLECTION, &ids(&["rec1"]), None)
        .expect("read")
        .remove(0);
    assert_eq!(snap.version, 2);
    assert!(snap.data.is_none());
    assert!(!snap.is_absent());
}
