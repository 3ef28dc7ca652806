//! Registry shared by the executor tests.

use std::sync::Arc;

use itemsql_storage::{
    ColumnDef, ItemData, ItemDataPtr, ItemGroup, ItemTable, SqlColumnType, TableRegistry, ITEM_ID_ANONY,
};

pub(crate) fn int(value: i32) -> ItemDataPtr {
    ItemData::int(ITEM_ID_ANONY, value)
}

pub(crate) fn uint(value: u64) -> ItemDataPtr {
    ItemData::uint64(ITEM_ID_ANONY, value)
}

pub(crate) fn text(value: &str) -> ItemDataPtr {
    ItemData::string(ITEM_ID_ANONY, value)
}

fn register(
    registry: &mut TableRegistry,
    table_id: i32,
    name: &str,
    columns: &[(&str, SqlColumnType)],
    rows: Option<Vec<Vec<ItemDataPtr>>>,
) {
    let defs = columns
        .iter()
        .enumerate()
        .map(|(i, (column, ty))| ColumnDef::new(table_id as u64 * 100 + i as u64, name, *column, *ty, 0))
        .collect();
    let snapshot = rows.map(|rows| {
        let mut table = ItemTable::new();
        for row in rows {
            table.add(row.into_iter().collect::<ItemGroup>()).unwrap();
        }
        Arc::new(table)
    });
    registry
        .register(table_id, name, defs, move || snapshot.clone())
        .unwrap();
}

pub(crate) fn registry() -> TableRegistry {
    use SqlColumnType::{BigUint, Int, Varchar};

    let mut registry = TableRegistry::new("monitoring");
    register(
        &mut registry,
        1,
        "t1",
        &[("a", Int), ("b", Int)],
        Some(vec![vec![int(1), int(10)], vec![int(2), int(20)]]),
    );
    register(
        &mut registry,
        2,
        "t2",
        &[("a", Int), ("c", Int)],
        Some(vec![vec![int(1), int(100)], vec![int(3), int(300)]]),
    );
    register(
        &mut registry,
        3,
        "t",
        &[("id", Int), ("v", Varchar)],
        Some(vec![
            vec![int(1), text("x")],
            vec![int(2), text("y")],
            vec![int(3), text("x")],
        ]),
    );
    register(
        &mut registry,
        4,
        "g",
        &[("k", Varchar), ("n", Int)],
        Some(vec![
            vec![text("A"), int(1)],
            vec![text("A"), int(2)],
            vec![text("B"), int(3)],
        ]),
    );
    register(
        &mut registry,
        5,
        "hosts",
        &[("id", BigUint), ("name", Varchar)],
        Some(vec![
            vec![uint(1), text("web")],
            vec![uint(2), text("db")],
            vec![uint(3), text("cache")],
        ]),
    );
    register(
        &mut registry,
        6,
        "items",
        &[("id", BigUint), ("host_id", BigUint), ("name", Varchar)],
        Some(vec![
            vec![uint(10), uint(1), text("cpu")],
            vec![uint(11), uint(1), text("mem")],
            vec![uint(12), uint(2), text("cpu")],
            vec![uint(13), uint(9), text("disk")],
        ]),
    );
    register(&mut registry, 7, "empty", &[("id", Int)], Some(Vec::new()));
    register(&mut registry, 8, "missing", &[("id", Int)], None);
    registry
}
