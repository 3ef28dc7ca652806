//! Table formulas: how the tables of one FROM element are joined.
//!
//! `a JOIN b ON .. JOIN c ON ..` becomes a left-deep tree
//! `Join(Join(a, b), c)`. Comma-separated elements each get their own
//! formula; they are combined by the join planner.

use itemsql_parser::{FromItem, JoinCondition, JoinKind};
use tracing::trace;

use crate::error::{PlanError, Result};
use crate::resolver::{NameResolver, ResolvedTable};

/// Join columns of an explicit `ON` condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinColumns {
    /// Column position in the rows produced by the left subtree.
    pub left: usize,
    /// Column position in the right table.
    pub right: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableFormula {
    /// Index of a table in the resolver.
    Table(usize),
    Join {
        kind: JoinKind,
        left: Box<TableFormula>,
        right: Box<TableFormula>,
        condition: Option<JoinColumns>,
    },
}

impl TableFormula {
    /// Resolver indices of the leaf tables, left to right.
    pub fn tables(&self) -> Vec<usize> {
        let mut tables = Vec::new();
        self.collect_tables(&mut tables);
        tables
    }

    fn collect_tables(&self, out: &mut Vec<usize>) {
        match self {
            TableFormula::Table(index) => out.push(*index),
            TableFormula::Join { left, right, .. } => {
                left.collect_tables(out);
                right.collect_tables(out);
            }
        }
    }

    /// Number of columns produced by the formula.
    pub fn width(&self, tables: &[ResolvedTable]) -> usize {
        self.tables()
            .into_iter()
            .map(|index| tables[index].num_columns())
            .sum()
    }

    /// Offset of `table_name`'s first column within the formula's rows.
    pub fn column_index_offset(&self, tables: &[ResolvedTable], table_name: &str) -> Option<usize> {
        let mut offset = 0;
        for index in self.tables() {
            let table = &tables[index];
            if table.visible_name().eq_ignore_ascii_case(table_name) {
                return Some(offset);
            }
            offset += table.num_columns();
        }
        None
    }
}

/// One comma-separated FROM element.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinElement {
    pub formula: TableFormula,
    /// Slot of the element's first column in the flattened row.
    pub offset: usize,
    pub width: usize,
}

impl JoinElement {
    pub fn contains_slot(&self, slot: usize) -> bool {
        (self.offset..self.offset + self.width).contains(&slot)
    }

    /// True when the element is a single table without explicit joins.
    pub fn is_single_table(&self) -> bool {
        matches!(self.formula, TableFormula::Table(_))
    }
}

/// Builds one element per FROM item, resolving `ON` columns.
pub fn build_elements(from: &[FromItem], resolver: &NameResolver<'_>) -> Result<Vec<JoinElement>> {
    let tables = resolver.tables();
    let mut elements = Vec::with_capacity(from.len());
    let mut next_table = 0;
    for item in from {
        let first = next_table;
        let mut formula = TableFormula::Table(first);
        next_table += 1;
        for join in &item.joins {
            let right = next_table;
            next_table += 1;
            let condition = match &join.condition {
                Some(condition) => Some(join_columns(condition, resolver, &formula, right)?),
                None => None,
            };
            formula = TableFormula::Join {
                kind: join.kind,
                left: Box::new(formula),
                right: Box::new(TableFormula::Table(right)),
                condition,
            };
        }
        let offset = tables[first].offset;
        let width = formula.width(tables);
        trace!(offset, width, tables = ?formula.tables(), "built FROM element");
        elements.push(JoinElement { formula, offset, width });
    }
    Ok(elements)
}

/// Maps `ON a = b` onto the left subtree and the right table, swapping
/// the operands when they are written the other way round.
fn join_columns(
    condition: &JoinCondition,
    resolver: &NameResolver<'_>,
    left: &TableFormula,
    right: usize,
) -> Result<JoinColumns> {
    let invalid = |reason| PlanError::InvalidJoinCondition {
        left: condition.left.to_string(),
        right: condition.right.to_string(),
        reason,
    };
    let a = resolver.resolve(&condition.left)?;
    let b = resolver.resolve(&condition.right)?;
    if a.binding.depth != 0 || b.binding.depth != 0 {
        return Err(invalid("columns must belong to the joined tables"));
    }
    let tables = resolver.tables();
    let left_tables = left.tables();
    let left_base = tables[left_tables[0]].offset;
    let in_left = |table: usize| left_tables.contains(&table);
    let (outer, inner) = if in_left(a.table) && b.table == right {
        (a, b)
    } else if in_left(b.table) && a.table == right {
        (b, a)
    } else {
        return Err(invalid("each side must name one of the joined tables"));
    };
    Ok(JoinColumns {
        left: outer.binding.slot - left_base,
        right: inner.column,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::tests::{registry, resolver_for};
    use itemsql_parser::parse_select;

    fn elements(sql: &str) -> Vec<JoinElement> {
        let registry = registry();
        let stmt = parse_select(sql).unwrap();
        let resolver = NameResolver::new(&registry, &stmt.from).unwrap();
        build_elements(&stmt.from, &resolver).unwrap()
    }

    #[test]
    fn comma_elements_are_separate() {
        let elements = elements("select * from hosts, items");
        assert_eq!(elements.len(), 2);
        assert_eq!((elements[1].offset, elements[1].width), (2, 3));
        assert!(elements.iter().all(JoinElement::is_single_table));
    }

    #[test]
    fn explicit_joins_build_left_deep_tree() {
        let elements = elements(
            "select * from hosts h join items i on h.id = i.host_id \
             left join events e on e.item_id = i.id",
        );
        assert_eq!(elements.len(), 1);
        let element = &elements[0];
        assert_eq!(element.width, 8);
        let TableFormula::Join { kind, left, condition, .. } = &element.formula else {
            panic!("expected a join");
        };
        assert_eq!(*kind, JoinKind::LeftOuter);
        // `i.id` sits at position 2 of the h+i rows, `item_id` is column 1 of events.
        assert_eq!(*condition, Some(JoinColumns { left: 2, right: 1 }));
        assert_eq!(left.tables(), vec![0, 1]);
        let TableFormula::Join { condition: inner, .. } = left.as_ref() else {
            panic!("expected a nested join");
        };
        assert_eq!(*inner, Some(JoinColumns { left: 0, right: 1 }));
    }

    #[test]
    fn column_index_offset_matches_resolver() {
        let registry = registry();
        let stmt = parse_select("select * from events e, hosts h join items i on i.host_id = h.id").unwrap();
        let resolver = resolver_for(&registry, "select * from events e, hosts h join items i on i.host_id = h.id");
        let elements = build_elements(&stmt.from, &resolver).unwrap();
        let joined = &elements[1];
        for name in ["h", "i"] {
            let local = joined.formula.column_index_offset(resolver.tables(), name).unwrap();
            assert_eq!(Some(joined.offset + local), resolver.column_index_offset(name));
        }
        assert_eq!(joined.formula.column_index_offset(resolver.tables(), "e"), None);
    }

    #[test]
    fn join_condition_must_reference_joined_tables() {
        let registry = registry();
        let stmt = parse_select("select * from events e, hosts h join items i on e.item_id = i.id").unwrap();
        let resolver = NameResolver::new(&registry, &stmt.from).unwrap();
        assert!(matches!(
            build_elements(&stmt.from, &resolver),
            Err(PlanError::InvalidJoinCondition { .. })
        ));
    }
}
