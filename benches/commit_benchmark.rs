use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use docbatch::lock::long_term::LockScope;
use docbatch::storage::memory::MemoryStore;
use docbatch::{ChangeSet, Config, Database, Row, RowId, Schema, TableDef};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

fn schema() -> Schema {
    Schema::new()
        .add_table(TableDef::document("Clients", 20))
        .add_table(
            TableDef::document("Orders", 10)
                .reference("Client", "Clients", false)
                .reference("Invoice", "Invoices", true)
                .vt_reference("Subject", &["Clients", "Orders"], true),
        )
        .add_table(TableDef::sub_document("Lines", 11, "Orders"))
        .add_table(TableDef::document("Invoices", 30).reference("Order", "Orders", true))
}

fn open() -> Database {
    let config = Config {
        row_cache_capacity: 0,
        ..Config::default()
    };
    Database::open(schema(), Arc::new(MemoryStore::new()), config).unwrap()
}

/// One order per document: a client, the order, its invoice and `lines` lines.
fn create_change_set(documents: usize, lines: usize) -> ChangeSet {
    let mut rng = rand::thread_rng();
    let mut cs = ChangeSet::new();
    for _ in 0..documents {
        let client = cs.next_placeholder().unwrap();
        let order = cs.next_placeholder().unwrap();
        let invoice = cs.next_placeholder().unwrap();
        cs.insert("Clients", Row::new(client).with("Name", format!("client {}", rng.gen_range(0..1000)).as_str()))
            .unwrap();
        cs.insert(
            "Orders",
            Row::new(order)
                .with("Client", client)
                .with("Invoice", invoice)
                .with("SubjectTable", 20)
                .with("SubjectId", client),
        )
        .unwrap();
        cs.insert("Invoices", Row::new(invoice).with("Order", order)).unwrap();
        for _ in 0..lines {
            cs.insert_sub_doc("Lines", order, Row::new(RowId(0)).with("Qty", rng.gen_range(1i64..50)))
                .unwrap();
        }
    }
    cs
}

fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit");

    for documents in [1usize, 10, 100, 500].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(documents), documents, |b, &documents| {
            let db = open();
            b.iter(|| {
                let mut cs = create_change_set(documents, 5);
                black_box(db.commit(&mut cs, Some("bench")).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_next_id(c: &mut Criterion) {
    let db = open();
    c.bench_function("next_id", |b| {
        b.iter(|| black_box(db.next_id("Orders").unwrap()));
    });
}

fn bench_lock_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit_with_long_locks");
    group.sample_size(20);
    group.measurement_time(Duration::from_secs(5));

    for held in [10i64, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(held), held, |b, &held| {
            let db = open();
            for i in 0..held {
                db.register_lock(LockScope::document("Orders", RowId(1_000_000 + i)), "other").unwrap();
            }
            b.iter(|| {
                let mut cs = create_change_set(10, 2);
                black_box(db.commit(&mut cs, Some("bench")).unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_commit, bench_next_id, bench_lock_check);
criterion_main!(benches);
