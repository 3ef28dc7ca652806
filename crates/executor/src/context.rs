//! The evaluation context of one joined row.

use itemsql_parser::{ColumnBinding, EvalContext, EvalError, NodeId};
use itemsql_storage::ItemDataPtr;
use rustc_hash::FxHashMap;

use crate::select::PreparedSelect;

/// A flattened row, linked to the active row of every enclosing statement.
pub(crate) struct RowView<'a> {
    row: &'a [ItemDataPtr],
    outer: Option<&'a RowView<'a>>,
    subqueries: &'a FxHashMap<NodeId, PreparedSelect>,
}

impl<'a> RowView<'a> {
    pub(crate) fn new(
        row: &'a [ItemDataPtr],
        outer: Option<&'a RowView<'a>>,
        subqueries: &'a FxHashMap<NodeId, PreparedSelect>,
    ) -> Self {
        Self {
            row,
            outer,
            subqueries,
        }
    }
}

impl EvalContext for RowView<'_> {
    fn column(&self, binding: ColumnBinding) -> Result<ItemDataPtr, EvalError> {
        let mut view = self;
        for _ in 0..binding.depth {
            view = view
                .outer
                .ok_or_else(|| EvalError::NoData(format!("enclosing row for depth {}", binding.depth)))?;
        }
        view.row
            .get(binding.slot)
            .cloned()
            .ok_or_else(|| EvalError::NoData(format!("column slot {}", binding.slot)))
    }

    fn exists(&self, node: NodeId) -> Result<bool, EvalError> {
        let subquery = self
            .subqueries
            .get(&node)
            .ok_or_else(|| EvalError::Subquery(format!("no statement prepared for node {node}")))?;
        subquery
            .exists(Some(self))
            .map_err(|err| EvalError::Subquery(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{int, text};

    #[test]
    fn reads_enclosing_rows_by_depth() {
        let subqueries = FxHashMap::default();
        let outer_row = vec![text("web"), int(7)];
        let inner_row = vec![int(1)];
        let outer = RowView::new(&outer_row, None, &subqueries);
        let inner = RowView::new(&inner_row, Some(&outer), &subqueries);
        let local = inner.column(ColumnBinding { depth: 0, slot: 0 }).unwrap();
        let enclosing = inner.column(ColumnBinding { depth: 1, slot: 1 }).unwrap();
        assert_eq!((local.as_integer(), enclosing.as_integer()), (Some(1), Some(7)));
        assert!(matches!(
            inner.column(ColumnBinding { depth: 2, slot: 0 }),
            Err(EvalError::NoData(_))
        ));
        assert!(matches!(inner.exists(3), Err(EvalError::Subquery(_))));
    }
}
