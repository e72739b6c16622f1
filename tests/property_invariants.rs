use std::collections::HashMap;

use proptest::prelude::*;
use serde_json::json;

use gridstore::{
    commit::commit,
    doc::{DocInit, RecordInit},
    error::EngineError,
    op::{MutationDescriptor, Operation},
    persist::sqlite::{CollectionStore, load_ops_range},
    replay::replay_snapshot,
    snapshot::get_snapshots,
};

const COLLECTION: &str = "tblProp";

#[derive(Debug, Clone)]
enum Action {
    CreateRecord { slot: u8 },
    EditCell { slot: u8, field: u8, value: u16 },
    EditOrder { slot: u8, view: u8, order: u16 },
    StaleEdit { slot: u8 },
    Delete { slot: u8 },
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0u8..6).prop_map(|slot| Action::CreateRecord { slot }),
        (0u8..6, 0u8..3, any::<u16>())
            .prop_map(|(slot, field, value)| Action::EditCell { slot, field, value }),
        (0u8..6, 0u8..2, any::<u16>())
            .prop_map(|(slot, view, order)| Action::EditOrder { slot, view, order }),
        (0u8..6).prop_map(|slot| Action::StaleEdit { slot }),
        (0u8..6).prop_map(|slot| Action::Delete { slot }),
    ]
}

fn rec_id(slot: u8) -> String {
    format!("rec{slot}")
}

proptest! {
    #[test]
    fn random_commit_sequences_keep_log_gapless_and_replayable(
        actions in prop::collection::vec(action_strategy(), 1..80)
    ) {
        let mut store = CollectionStore::open_in_memory().expect("open");
        // Shadow model: (current version, alive) per document.
        let mut shadow: HashMap<String, (u64, bool)> = HashMap::new();
        let mut seq = 0u64;

        for action in actions {
            seq += 1;
            match action {
                Action::CreateRecord { slot } => {
                    let id = rec_id(slot);
                    let (version, _) = shadow.get(&id).copied().unwrap_or((0, false));
                    let mut op =
                        Operation::create("prop", seq, DocInit::Record(RecordInit::default()));
                    op.version = version + 1;
                    let res = commit(&mut store, COLLECTION, &id, &op);
                    if version == 0 {
                        prop_assert!(res.is_ok(), "fresh create failed: {res:?}");
                        shadow.insert(id, (1, true));
                    } else {
                        prop_assert!(matches!(res, Err(EngineError::AlreadyExists(_))));
                    }
                }
                Action::EditCell { slot, field, value } => {
                    let id = rec_id(slot);
                    let (version, alive) = shadow.get(&id).copied().unwrap_or((0, false));
                    let op = Operation::edit(
                        "prop",
                        seq,
                        version + 1,
                        vec![MutationDescriptor::SetRecordCell {
                            field_id: format!("fld{field}"),
                            value: json!(value),
                        }],
                    );
                    let res = commit(&mut store, COLLECTION, &id, &op);
                    if alive {
                        prop_assert!(res.is_ok(), "edit failed: {res:?}");
                        shadow.insert(id, (version + 1, true));
                    } else {
                        prop_assert!(matches!(res, Err(EngineError::MissingDocument(_))));
                    }
                }
                Action::EditOrder { slot, view, order } => {
                    let id = rec_id(slot);
                    let (version, alive) = shadow.get(&id).copied().unwrap_or((0, false));
                    let op = Operation::edit(
                        "prop",
                        seq,
                        version + 1,
                        vec![MutationDescriptor::SetRecordOrder {
                            view_id: format!("viw{view}"),
                            order: f64::from(order),
                        }],
                    );
                    let res = commit(&mut store, COLLECTION, &id, &op);
                    if alive {
                        prop_assert!(res.is_ok(), "order edit failed: {res:?}");
                        shadow.insert(id, (version + 1, true));
                    } else {
                        prop_assert!(matches!(res, Err(EngineError::MissingDocument(_))));
                    }
                }
                Action::StaleEdit { slot } => {
                    let id = rec_id(slot);
                    let (version, _) = shadow.get(&id).copied().unwrap_or((0, false));
                    // Declares the document's current version instead of the
                    // next one; must conflict and change nothing.
                    let op = Operation::edit(
                        "prop",
                        seq,
                        version,
                        vec![MutationDescriptor::SetRecordCell {
                            field_id: "fld0".to_string(),
                            value: json!("stale"),
                        }],
                    );
                    let res = commit(&mut store, COLLECTION, &id, &op);
                    let is_conflict = matches!(res, Err(EngineError::VersionConflict { .. }));
                    prop_assert!(is_conflict);
                }
                Action::Delete { slot } => {
                    let id = rec_id(slot);
                    let (version, alive) = shadow.get(&id).copied().unwrap_or((0, false));
                    let op = Operation::delete("prop", seq, version + 1);
                    let res = commit(&mut store, COLLECTION, &id, &op);
                    if alive {
                        prop_assert!(res.is_ok(), "delete failed: {res:?}");
                        shadow.insert(id, (version + 1, false));
                    } else {
                        prop_assert!(matches!(res, Err(EngineError::MissingDocument(_))));
                    }
                }
            }
        }

        for (id, (version, _)) in shadow {
            if version == 0 {
                continue;
            }
            let ops = load_ops_range(store.connection(), COLLECTION, &id, 1, u64::MAX)
                .expect("ops");
            let logged: Vec<u64> = ops.iter().map(|op| op.version).collect();
            let expected: Vec<u64> = (1..=version).collect();
            prop_assert_eq!(&logged, &expected, "log gap for {}", &id);

            let replayed = replay_snapshot(&id, &ops).expect("replay");
            let stored = get_snapshots(store.connection(), COLLECTION, &[id.clone()], None)
                .expect("stored")
                .remove(0);
            prop_assert_eq!(replayed, stored, "replay diverged for {}", &id);
        }
    }
}
