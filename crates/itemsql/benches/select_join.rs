//! Criterion benchmarks for joined SELECTs.
//!
//! Run with: `cargo bench --bench select_join`

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use itemsql::{ColumnDef, ItemData, ItemGroup, ItemTable, SqlColumnType, SqlProcessor, TableRegistry, ITEM_ID_ANONY};

const HOSTS: u64 = 1_000;
const ITEMS_PER_HOST: u64 = 10;

fn processor() -> SqlProcessor {
    let mut hosts = ItemTable::new();
    for id in 0..HOSTS {
        let row: ItemGroup = [
            ItemData::uint64(ITEM_ID_ANONY, id),
            ItemData::string(ITEM_ID_ANONY, format!("host-{id}")),
        ]
        .into_iter()
        .collect();
        hosts.add(row).unwrap();
    }
    let mut items = ItemTable::new();
    for id in 0..HOSTS * ITEMS_PER_HOST {
        let row: ItemGroup = [
            ItemData::uint64(ITEM_ID_ANONY, id),
            ItemData::uint64(ITEM_ID_ANONY, id % HOSTS),
            ItemData::string(ITEM_ID_ANONY, format!("item-{}", id % 7)),
        ]
        .into_iter()
        .collect();
        items.add(row).unwrap();
    }

    let mut registry = TableRegistry::new("bench");
    let hosts = Arc::new(hosts);
    let items = Arc::new(items);
    registry
        .register(
            1,
            "hosts",
            vec![
                ColumnDef::new(1, "hosts", "id", SqlColumnType::BigUint, 20),
                ColumnDef::new(2, "hosts", "name", SqlColumnType::Varchar, 255),
            ],
            move || Some(Arc::clone(&hosts)),
        )
        .unwrap();
    registry
        .register(
            2,
            "items",
            vec![
                ColumnDef::new(3, "items", "id", SqlColumnType::BigUint, 20),
                ColumnDef::new(4, "items", "host_id", SqlColumnType::BigUint, 20),
                ColumnDef::new(5, "items", "name", SqlColumnType::Varchar, 255),
            ],
            move || Some(Arc::clone(&items)),
        )
        .unwrap();
    SqlProcessor::new(Arc::new(registry))
}

fn bench_index_join(c: &mut Criterion) {
    let processor = processor();
    c.bench_function("index_join", |b| {
        b.iter(|| {
            processor
                .select(black_box("SELECT h.name, i.name FROM hosts h, items i WHERE i.host_id = h.id"))
                .unwrap();
        });
    });
}

fn bench_explicit_join(c: &mut Criterion) {
    let processor = processor();
    c.bench_function("explicit_join", |b| {
        b.iter(|| {
            processor
                .select(black_box("SELECT h.name, i.name FROM hosts h JOIN items i ON h.id = i.host_id"))
                .unwrap();
        });
    });
}

fn bench_group_by(c: &mut Criterion) {
    let processor = processor();
    c.bench_function("group_by_count", |b| {
        b.iter(|| {
            processor
                .select(black_box(
                    "SELECT i.name, count(*) FROM hosts h, items i WHERE i.host_id = h.id GROUP BY i.name",
                ))
                .unwrap();
        });
    });
}

fn bench_exists(c: &mut Criterion) {
    let processor = processor();
    c.bench_function("correlated_exists", |b| {
        b.iter(|| {
            processor
                .select(black_box(
                    "SELECT name FROM hosts h WHERE EXISTS (SELECT * FROM items i WHERE i.host_id = h.id AND i.id < 50)",
                ))
                .unwrap();
        });
    });
}

criterion_group!(benches, bench_index_join, bench_explicit_join, bench_group_by, bench_exists);
criterion_main!(benches);
