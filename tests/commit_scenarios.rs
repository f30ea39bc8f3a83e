use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use docbatch::core::types::DOC_ID_COLUMN;
use docbatch::lock::long_term::LockScope;
use docbatch::storage::memory::MemoryStore;
use docbatch::storage::store::RowStore;
use docbatch::{ChangeSet, Config, Database, Error, ErrorKind, Row, RowId, Schema, TableDef};

const ORDERS: i32 = 10;
const CLIENTS: i32 = 20;

fn schema() -> Schema {
    Schema::new()
        .add_table(TableDef::document("Clients", CLIENTS))
        .add_table(
            TableDef::document("Orders", ORDERS)
                .reference("Client", "Clients", true)
                .vt_reference("Subject", &["Clients", "Orders"], true),
        )
        .add_table(TableDef::sub_document("Lines", 11, "Orders").reference("Replaces", "Lines", true))
        .add_table(TableDef::document("Docs", 30))
        .add_table(TableDef::document("Notes", 40).vt_reference("About", &["Clients"], false))
}

fn open_with(rows: Vec<(&str, Row)>) -> (Database, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::with_rows(rows).unwrap());
    let db = Database::open(schema(), store.clone(), Config::default()).unwrap();
    (db, store)
}

fn open() -> (Database, Arc<MemoryStore>) {
    open_with(Vec::new())
}

#[test]
fn scenario_a_sub_document_points_at_its_new_owner() {
    let (db, store) = open();
    let mut cs = ChangeSet::new();
    cs.insert("Orders", Row::new(RowId(-5))).unwrap();
    cs.insert_sub_doc("Lines", RowId(-5), Row::new(RowId(-1))).unwrap();

    let report = db.commit(&mut cs, None).unwrap();

    let order = &store.rows("Orders")[0];
    let line = &store.rows("Lines")[0];
    assert!(order.id.is_real() && line.id.is_real());
    assert_eq!(line.get_row_id(DOC_ID_COLUMN), Some(order.id));
    assert_eq!(report.id_maps.real_id("Orders", RowId(-5)), Some(order.id));
    assert_eq!(report.id_maps.real_id("Lines", RowId(-1)), Some(line.id));
    assert!(report.id_maps.is_added("Orders", order.id));
}

#[test]
fn scenario_b_variable_reference_resolves_to_the_new_row() {
    let (db, store) = open();
    let mut cs = ChangeSet::new();
    cs.insert(
        "Orders",
        Row::new(RowId(-5)).with("SubjectTable", CLIENTS).with("SubjectId", RowId(-6)),
    )
    .unwrap();
    cs.insert("Clients", Row::new(RowId(-6))).unwrap();

    let report = db.commit(&mut cs, None).unwrap();
    assert_eq!(report.patches_applied, 2);

    let client = &store.rows("Clients")[0];
    let order = &store.rows("Orders")[0];
    assert_eq!(order.get("SubjectTable").as_int(), Some(i64::from(CLIENTS)));
    assert_eq!(order.get_row_id("SubjectId"), Some(client.id));

    // The caller's change-set carries the resolved pair as well.
    let resolved = cs.table("Orders").unwrap().find(order.id).unwrap();
    assert_eq!(resolved.row.get_row_id("SubjectId"), Some(client.id));
}

#[test]
fn scenario_b_required_variable_reference_keeps_the_real_id() {
    let (db, store) = open();
    let mut cs = ChangeSet::new();
    cs.insert("Notes", Row::new(RowId(-2)).with("AboutTable", CLIENTS).with("AboutId", RowId(-1)))
        .unwrap();
    cs.insert("Clients", Row::new(RowId(-1))).unwrap();

    let report = db.commit(&mut cs, None).unwrap();
    assert_eq!(report.patches_applied, 1);

    let client = &store.rows("Clients")[0];
    let stored = &store.rows("Notes")[0];
    assert_eq!(stored.get("AboutTable").as_int(), Some(i64::from(CLIENTS)));
    assert_eq!(stored.get_row_id("AboutId"), Some(client.id));
    // Not nullable: the batch row already carried the real id when it was written.
    let resolved = cs.table("Notes").unwrap().find(stored.id).unwrap();
    assert_eq!(resolved.row.get_row_id("AboutId"), Some(client.id));
}

#[test]
fn scenario_c_half_populated_variable_reference_writes_nothing() {
    let (db, store) = open();
    let mut cs = ChangeSet::new();
    cs.insert("Clients", Row::new(RowId(0))).unwrap();
    cs.insert("Orders", Row::new(RowId(0)).with("SubjectTable", CLIENTS)).unwrap();

    let err = db.commit(&mut cs, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Reference);
    assert!(matches!(err, Error::ReferentialAmbiguity { ref column, .. } if column == "SubjectId"));
    assert!(store.rows("Clients").is_empty());
    assert!(store.rows("Orders").is_empty());
    assert_eq!(cs.table("Clients").unwrap().rows().next().unwrap().row.id, RowId(-1));
}

#[test]
fn scenario_d_concurrent_sessions_never_share_an_id() {
    let (db, _) = open();
    let db = Arc::new(db);

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let db = db.clone();
            thread::spawn(move || (0..100).map(|_| db.next_id("Docs").unwrap().0).collect::<Vec<_>>())
        })
        .collect();

    let ids: Vec<i64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
    let unique: HashSet<i64> = ids.iter().copied().collect();
    assert_eq!(unique.len(), 200);
    assert_eq!(unique, (1..=200).collect::<HashSet<i64>>());
}

#[test]
fn scenario_e_overlapping_lock_waits_for_release() {
    let (db, _) = open();
    let l1 = db.register_lock(LockScope::document("Orders", RowId(10)), "s1").unwrap();

    let err = db.register_lock(LockScope::document("Orders", RowId(10)), "s2").unwrap_err();
    match err {
        Error::LockConflict(conflict) => assert_eq!(conflict.existing.token, l1),
        other => panic!("expected a lock conflict, got {other}"),
    }

    assert!(db.release_lock(l1));
    let l2 = db.register_lock(LockScope::document("Orders", RowId(10)), "s2").unwrap();
    assert_ne!(l1, l2);
}

#[test]
fn committed_rows_only_change_nothing() {
    let (db, _) = open_with(vec![("Orders", Row::new(RowId(3)))]);
    let mut cs = ChangeSet::new();
    cs.update("Orders", Row::new(RowId(3)).with("Client", RowId(8))).unwrap();

    let report = db.commit(&mut cs, None).unwrap();
    assert!(report.id_maps.is_empty());
    assert_eq!(cs.table("Orders").unwrap().find(RowId(3)).unwrap().row.get_row_id("Client"), Some(RowId(8)));
}

#[test]
fn new_ids_exceed_the_stored_maximum() {
    let (db, store) = open_with(vec![("Clients", Row::new(RowId(40))), ("Clients", Row::new(RowId(7)))]);
    let mut cs = ChangeSet::new();
    for _ in 0..5 {
        cs.insert("Clients", Row::new(RowId(0))).unwrap();
    }
    let report = db.commit(&mut cs, None).unwrap();

    let pairs = report.id_maps.get("Clients").unwrap();
    let ids: HashSet<RowId> = pairs.iter().map(|(_, new)| new).collect();
    assert_eq!(ids.len(), 5);
    assert!(ids.iter().all(|id| id.0 > 40));
    assert_eq!(store.rows("Clients").len(), 7);
}

#[test]
fn forward_and_self_references_round_trip() {
    let (db, store) = open();
    let mut cs = ChangeSet::new();
    // Replaces points into its own table, so it is patched after the insert.
    cs.insert("Clients", Row::new(RowId(-1))).unwrap();
    cs.insert("Orders", Row::new(RowId(-2)).with("Client", RowId(-1))).unwrap();
    cs.insert_sub_doc("Lines", RowId(-2), Row::new(RowId(-3))).unwrap();
    cs.insert_sub_doc("Lines", RowId(-2), Row::new(RowId(-4)).with("Replaces", RowId(-3))).unwrap();

    let report = db.commit(&mut cs, None).unwrap();

    let line_id = |placeholder| report.id_maps.real_id("Lines", RowId(placeholder)).unwrap();
    let replacing = store.load_row("Lines", line_id(-4)).unwrap();
    assert_eq!(replacing.unwrap().get_row_id("Replaces"), Some(line_id(-3)));

    let order = store.load_row("Orders", report.id_maps.real_id("Orders", RowId(-2)).unwrap()).unwrap().unwrap();
    assert_eq!(order.get_row_id("Client"), report.id_maps.real_id("Clients", RowId(-1)));
}

#[test]
fn failed_allocation_leaves_everything_as_it_was() {
    let (db, store) = open();
    store.fail_max_id("Lines", true);

    let mut cs = ChangeSet::new();
    cs.insert("Orders", Row::new(RowId(0))).unwrap();
    cs.insert_sub_doc("Lines", RowId(-1), Row::new(RowId(0))).unwrap();

    let err = db.commit(&mut cs, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Allocation);
    assert!(store.rows("Orders").is_empty());
    assert_eq!(cs.table("Orders").unwrap().rows().next().unwrap().row.id, RowId(-1));

    store.fail_max_id("Lines", false);
    db.commit(&mut cs, None).unwrap();
    assert_eq!(store.rows("Lines").len(), 1);
}

#[test]
fn unknown_table_is_rejected_before_any_work() {
    let (db, _) = open();
    let mut cs = ChangeSet::new();
    cs.insert("Invoices", Row::new(RowId(0))).unwrap();
    assert!(matches!(db.commit(&mut cs, None), Err(Error::UnknownTable(t)) if t == "Invoices"));
}
