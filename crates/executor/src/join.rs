//! Nested-loop enumeration of joined rows.
//!
//! Elements are visited in FROM order. Each active element writes its
//! columns into its slots of the flattened row; an element joined through
//! an index only visits the rows matching the value already bound by an
//! earlier element. The visitor sees every complete combination and may
//! stop the enumeration with `ControlFlow::Break`.

use std::ops::ControlFlow;

use itemsql_planner::{AccessPath, JoinElement};
use itemsql_storage::{ItemData, ItemDataPtr, ItemType, ITEM_ID_ANONY};

use crate::error::{Result, SelectError};
use crate::source::ElementSource;

type Visitor<'v> = dyn FnMut(&[ItemDataPtr]) -> Result<ControlFlow<()>> + 'v;

pub(crate) struct NestedLoopJoin<'q> {
    elements: &'q [JoinElement],
    access: &'q [AccessPath],
    sources: &'q [ElementSource],
    num_slots: usize,
}

impl<'q> NestedLoopJoin<'q> {
    pub(crate) fn new(
        elements: &'q [JoinElement],
        access: &'q [AccessPath],
        sources: &'q [ElementSource],
        num_slots: usize,
    ) -> Result<Self> {
        if elements.len() != access.len() || elements.len() != sources.len() {
            return Err(SelectError::Internal(format!(
                "{} FROM elements planned as {} access paths over {} sources",
                elements.len(),
                access.len(),
                sources.len()
            )));
        }
        Ok(Self {
            elements,
            access,
            sources,
            num_slots,
        })
    }

    pub(crate) fn run<F>(&self, mut visit: F) -> Result<ControlFlow<()>>
    where
        F: FnMut(&[ItemDataPtr]) -> Result<ControlFlow<()>>,
    {
        let unset = ItemData::null(ITEM_ID_ANONY, ItemType::Int);
        let mut row = vec![unset; self.num_slots];
        self.visit_element(0, &mut row, &mut visit)
    }

    fn visit_element(&self, depth: usize, row: &mut [ItemDataPtr], visit: &mut Visitor<'_>) -> Result<ControlFlow<()>> {
        if depth == self.elements.len() {
            return visit(row);
        }
        let element = &self.elements[depth];
        let source = &self.sources[depth];
        let slots = element.offset..element.offset + element.width;
        if slots.end > row.len() {
            return Err(SelectError::Internal(format!("element {depth} exceeds the joined row")));
        }
        for position in source.candidates(self.access[depth], row)? {
            row[slots.clone()].clone_from_slice(source.row(position)?.items());
            if self.visit_element(depth + 1, row, visit)?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::source::make_item_tables;
    use itemsql_parser::parse_select;
    use itemsql_planner::{build_elements, NameResolver, PrimaryCondition};

    fn rows(sql: &str, access: Vec<AccessPath>, stop_after: Option<usize>) -> Vec<Vec<i128>> {
        rows_with(sql, access, &[], stop_after)
    }

    fn rows_with(
        sql: &str,
        access: Vec<AccessPath>,
        primary: &[PrimaryCondition],
        stop_after: Option<usize>,
    ) -> Vec<Vec<i128>> {
        let registry = fixtures::registry();
        let stmt = parse_select(sql).unwrap();
        let resolver = NameResolver::new(&registry, &stmt.from).unwrap();
        let tables = make_item_tables(resolver.tables()).unwrap();
        let elements = build_elements(&stmt.from, &resolver).unwrap();
        let mut sources: Vec<ElementSource> = elements
            .iter()
            .map(|element| ElementSource::materialize(element, &tables).unwrap())
            .collect();
        for (source, path) in sources.iter_mut().zip(&access) {
            source.prepare_access(*path, primary).unwrap();
        }
        let join = NestedLoopJoin::new(&elements, &access, &sources, resolver.num_slots()).unwrap();
        let mut out = Vec::new();
        let flow = join
            .run(|row| {
                out.push(row.iter().map(|item| item.as_integer().unwrap_or(-1)).collect());
                Ok(match stop_after {
                    Some(limit) if out.len() >= limit => ControlFlow::Break(()),
                    _ => ControlFlow::Continue(()),
                })
            })
            .unwrap();
        assert_eq!(flow.is_break(), stop_after.is_some());
        out
    }

    #[test]
    fn scans_produce_the_product() {
        let out = rows("select * from t1, t2", vec![AccessPath::TableScan; 2], None);
        assert_eq!(
            out,
            vec![
                vec![1, 10, 1, 100],
                vec![1, 10, 3, 300],
                vec![2, 20, 1, 100],
                vec![2, 20, 3, 300],
            ]
        );
    }

    #[test]
    fn index_join_binds_from_earlier_element() {
        let access = vec![AccessPath::TableScan, AccessPath::IndexJoin { column: 0, bound_slot: 0 }];
        let out = rows("select * from t1, t2", access, None);
        assert_eq!(out, vec![vec![1, 10, 1, 100]]);
    }

    #[test]
    fn narrowed_element_visits_only_matching_rows() {
        let primary = [PrimaryCondition::ColumnEqValue {
            slot: 0,
            value: fixtures::int(2),
        }];
        let access = vec![AccessPath::IndexLookup { column: 0, condition: 0 }, AccessPath::TableScan];
        let out = rows_with("select * from t1, t2", access, &primary, None);
        assert_eq!(out, vec![vec![2, 20, 1, 100], vec![2, 20, 3, 300]]);
    }

    #[test]
    fn break_stops_enumeration() {
        let out = rows("select * from t1, t2", vec![AccessPath::TableScan; 2], Some(1));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn mismatched_plan_is_rejected() {
        let elements = Vec::new();
        assert!(matches!(
            NestedLoopJoin::new(&elements, &[AccessPath::TableScan], &[], 0),
            Err(SelectError::Internal(_))
        ));
    }
}
