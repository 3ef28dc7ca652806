//! Ordering and grouping of selected rows.

use std::cmp::Ordering;

use itemsql_storage::{ItemData, ItemDataPtr, ItemKey, StorageError};
use rustc_hash::FxHashMap;

use crate::error::Result;

pub(crate) type Row = Vec<ItemDataPtr>;

/// ORDER BY key: a flattened slot and its direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SortKey {
    pub slot: usize,
    pub descending: bool,
}

/// Stable sort of `rows`. NULL sorts before every value.
pub(crate) fn sort_rows(rows: &mut [Row], keys: &[SortKey]) -> Result<()> {
    if keys.is_empty() {
        return Ok(());
    }
    let mut failure: Option<StorageError> = None;
    rows.sort_by(|a, b| {
        for key in keys {
            let ordering = match compare_items(&a[key.slot], &b[key.slot]) {
                Ok(ordering) => ordering,
                Err(err) => {
                    failure.get_or_insert(err);
                    Ordering::Equal
                }
            };
            let ordering = if key.descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn compare_items(a: &ItemData, b: &ItemData) -> std::result::Result<Ordering, StorageError> {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ok(Ordering::Equal),
        (true, false) => Ok(Ordering::Less),
        (false, true) => Ok(Ordering::Greater),
        (false, false) => Ok(a.compare(b)?.unwrap_or(Ordering::Equal)),
    }
}

/// Partitions rows by the values at `slots`. Groups keep the order their
/// keys were first seen in; rows keep their order within a group. Without
/// slots every row belongs to one implicit group.
pub(crate) fn group_rows(rows: Vec<Row>, slots: &[usize]) -> Vec<Vec<Row>> {
    if slots.is_empty() {
        return if rows.is_empty() { Vec::new() } else { vec![rows] };
    }
    let mut positions: FxHashMap<Vec<ItemKey>, usize> = FxHashMap::default();
    let mut groups: Vec<Vec<Row>> = Vec::new();
    for row in rows {
        let key: Vec<ItemKey> = slots.iter().map(|&slot| row[slot].key()).collect();
        let position = *positions.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[position].push(row);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{int, text};
    use itemsql_storage::{ItemType, ITEM_ID_ANONY};

    fn letters(groups: &[Vec<Row>]) -> Vec<Vec<String>> {
        groups
            .iter()
            .map(|group| group.iter().map(|row| format!("{}{}", row[0], row[1])).collect())
            .collect()
    }

    #[test]
    fn groups_keep_first_seen_order() {
        let rows = vec![
            vec![text("B"), int(1)],
            vec![text("A"), int(2)],
            vec![text("B"), int(3)],
        ];
        let groups = group_rows(rows, &[0]);
        assert_eq!(letters(&groups), vec![vec!["B1", "B3"], vec!["A2"]]);
    }

    #[test]
    fn implicit_group_holds_every_row() {
        let rows = vec![vec![text("A"), int(1)], vec![text("B"), int(2)]];
        assert_eq!(group_rows(rows, &[]).len(), 1);
        assert!(group_rows(Vec::new(), &[]).is_empty());
    }

    #[test]
    fn numeric_kinds_share_a_group() {
        let rows = vec![
            vec![int(1), text("x")],
            vec![ItemData::uint64(ITEM_ID_ANONY, 1), text("y")],
        ];
        assert_eq!(group_rows(rows, &[0]).len(), 1);
    }

    #[test]
    fn sorts_stably_with_nulls_first() {
        let null = ItemData::null(ITEM_ID_ANONY, ItemType::Int);
        let mut rows = vec![
            vec![int(2), text("a")],
            vec![null.clone(), text("b")],
            vec![int(1), text("c")],
            vec![int(2), text("d")],
        ];
        sort_rows(&mut rows, &[SortKey { slot: 0, descending: false }]).unwrap();
        let order: Vec<String> = rows.iter().map(|row| row[1].to_string()).collect();
        assert_eq!(order, vec!["b", "c", "a", "d"]);

        sort_rows(&mut rows, &[SortKey { slot: 0, descending: true }]).unwrap();
        let order: Vec<String> = rows.iter().map(|row| row[1].to_string()).collect();
        assert_eq!(order, vec!["a", "d", "c", "b"]);
    }

    #[test]
    fn sorting_mixed_kinds_fails() {
        let mut rows = vec![vec![int(1)], vec![text("x")]];
        assert!(sort_rows(&mut rows, &[SortKey { slot: 0, descending: false }]).is_err());
    }
}
