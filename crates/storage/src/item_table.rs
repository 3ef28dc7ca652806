//! Ordered collections of item groups and the relational joins over them.
//!
//! Equality joins build an [`ItemIndex`] on the right table's join column
//! and probe it once per left row, so output order is: left rows in order,
//! each followed by its matches in right-table order. Joins that preserve
//! the right side append the unmatched right rows afterwards, in order.
//! [`ItemTable::cross_join`] is the only nested-loop product.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::{Result, StorageError};
use crate::item::{ItemData, ItemKey};
use crate::item_group::{ItemGroup, ItemGroupPtr};

#[derive(Debug, Clone, Default)]
pub struct ItemTable {
    groups: Vec<ItemGroupPtr>,
    num_columns: Option<usize>,
}

pub type ItemTablePtr = Arc<ItemTable>;

/// Hash index from a column's normalized value to row positions.
/// NULL values are never indexed.
#[derive(Debug, Clone, Default)]
pub struct ItemIndex {
    column: usize,
    buckets: FxHashMap<ItemKey, Vec<usize>>,
}

impl ItemIndex {
    pub fn column(&self) -> usize {
        self.column
    }

    /// Positions of the rows whose indexed column equals `value`.
    pub fn lookup(&self, value: &ItemData) -> &[usize] {
        if value.is_null() {
            return &[];
        }
        self.buckets
            .get(&value.key())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn distinct_keys(&self) -> usize {
        self.buckets.len()
    }
}

#[derive(Clone, Copy)]
struct Preserve {
    left: bool,
    right: bool,
}

impl ItemTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty table whose arity is known before any row arrives.
    pub fn with_columns(num_columns: usize) -> Self {
        Self {
            groups: Vec::new(),
            num_columns: Some(num_columns),
        }
    }

    pub fn add(&mut self, group: impl Into<ItemGroupPtr>) -> Result<()> {
        let group = group.into();
        match self.num_columns {
            Some(expected) if expected != group.len() => {
                return Err(StorageError::ArityMismatch {
                    expected,
                    found: group.len(),
                });
            }
            Some(_) => {}
            None => self.num_columns = Some(group.len()),
        }
        self.groups.push(group);
        Ok(())
    }

    /// Visits rows in order until `callback` returns `false`.
    /// Returns `false` when the visit stopped early.
    pub fn foreach<F>(&self, mut callback: F) -> bool
    where
        F: FnMut(&ItemGroupPtr) -> bool,
    {
        self.groups.iter().all(|group| callback(group))
    }

    pub fn num_rows(&self) -> usize {
        self.groups.len()
    }

    /// Arity of the rows; 0 while unknown.
    pub fn num_columns(&self) -> usize {
        self.num_columns.unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn rows(&self) -> &[ItemGroupPtr] {
        &self.groups
    }

    pub fn group_at(&self, index: usize) -> Option<&ItemGroupPtr> {
        self.groups.get(index)
    }

    pub fn build_index(&self, column: usize) -> Result<ItemIndex> {
        self.check_column(column)?;
        let mut buckets: FxHashMap<ItemKey, Vec<usize>> = FxHashMap::default();
        for (position, group) in self.groups.iter().enumerate() {
            let item = group.item_at(column).ok_or(StorageError::ColumnOutOfRange {
                index: column,
                len: group.len(),
            })?;
            if item.is_null() {
                continue;
            }
            buckets.entry(item.key()).or_default().push(position);
        }
        trace!(column, keys = buckets.len(), rows = self.groups.len(), "built item index");
        Ok(ItemIndex { column, buckets })
    }

    pub fn inner_join(&self, other: &ItemTable, left_column: usize, right_column: usize) -> Result<ItemTable> {
        self.equi_join(other, left_column, right_column, Preserve { left: false, right: false })
    }

    pub fn left_outer_join(&self, other: &ItemTable, left_column: usize, right_column: usize) -> Result<ItemTable> {
        self.equi_join(other, left_column, right_column, Preserve { left: true, right: false })
    }

    pub fn right_outer_join(&self, other: &ItemTable, left_column: usize, right_column: usize) -> Result<ItemTable> {
        self.equi_join(other, left_column, right_column, Preserve { left: false, right: true })
    }

    pub fn full_outer_join(&self, other: &ItemTable, left_column: usize, right_column: usize) -> Result<ItemTable> {
        self.equi_join(other, left_column, right_column, Preserve { left: true, right: true })
    }

    pub fn cross_join(&self, other: &ItemTable) -> ItemTable {
        let mut joined = Vec::with_capacity(self.num_rows() * other.num_rows());
        for left in &self.groups {
            for right in &other.groups {
                joined.push(Arc::new(left.concat(right)));
            }
        }
        self.joined_with(other, joined)
    }

    fn equi_join(
        &self,
        other: &ItemTable,
        left_column: usize,
        right_column: usize,
        preserve: Preserve,
    ) -> Result<ItemTable> {
        self.check_column(left_column)?;
        let index = other.build_index(right_column)?;
        let left_nulls = self.null_row();
        let right_nulls = other.null_row();

        let mut matched_right = vec![false; other.num_rows()];
        let mut joined = Vec::new();
        for left in &self.groups {
            let key = left.item_at(left_column).ok_or(StorageError::ColumnOutOfRange {
                index: left_column,
                len: left.len(),
            })?;
            let matches = index.lookup(key);
            for &position in matches {
                matched_right[position] = true;
                joined.push(Arc::new(left.concat(&other.groups[position])));
            }
            if matches.is_empty() && preserve.left {
                joined.push(Arc::new(left.concat(&right_nulls)));
            }
        }
        if preserve.right {
            for (position, right) in other.groups.iter().enumerate() {
                if !matched_right[position] {
                    joined.push(Arc::new(left_nulls.concat(right)));
                }
            }
        }
        trace!(
            left_rows = self.num_rows(),
            right_rows = other.num_rows(),
            joined_rows = joined.len(),
            "equality join"
        );
        Ok(self.joined_with(other, joined))
    }

    fn joined_with(&self, other: &ItemTable, groups: Vec<ItemGroupPtr>) -> ItemTable {
        let num_columns = match (self.num_columns, other.num_columns) {
            (Some(left), Some(right)) => Some(left + right),
            _ => groups.first().map(|group| group.len()),
        };
        ItemTable {
            groups,
            num_columns,
        }
    }

    fn null_row(&self) -> ItemGroup {
        match self.groups.first() {
            Some(first) => first.null_like(),
            None => ItemGroup::nulls(self.num_columns()),
        }
    }

    fn check_column(&self, column: usize) -> Result<()> {
        match self.num_columns {
            Some(len) if column >= len => Err(StorageError::ColumnOutOfRange { index: column, len }),
            _ => Ok(()),
        }
    }
}

impl FromIterator<ItemGroup> for ItemTable {
    /// Arity is taken from the first group and not checked against the
    /// rest; use [`ItemTable::add`] for untrusted input.
    fn from_iter<T: IntoIterator<Item = ItemGroup>>(iter: T) -> Self {
        let groups: Vec<ItemGroupPtr> = iter.into_iter().map(Arc::new).collect();
        let num_columns = groups.first().map(|group| group.len());
        Self {
            groups,
            num_columns,
        }
    }
}
