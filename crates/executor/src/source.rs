//! Row sources of the FROM elements.

use std::cmp::Ordering;
use std::ops::Range;
use std::slice;
use std::sync::Arc;

use itemsql_parser::JoinKind;
use itemsql_planner::{AccessPath, JoinElement, PrimaryCondition, ResolvedTable, TableFormula};
use itemsql_storage::{ItemData, ItemDataPtr, ItemGroupPtr, ItemIndex, ItemTable, ItemTablePtr, StorageError};
use tracing::trace;

use crate::error::{Result, SelectError};

/// Calls the factory of every resolved table. A factory without data is an
/// error; an empty snapshot is a valid table with no rows.
pub(crate) fn make_item_tables(tables: &[ResolvedTable]) -> Result<Vec<ItemTablePtr>> {
    tables
        .iter()
        .map(|table| {
            let snapshot = table
                .info
                .make_table()
                .ok_or_else(|| SelectError::NoData(table.name().to_string()))?;
            let expected = table.num_columns();
            if snapshot.num_columns() != expected {
                if !snapshot.is_empty() {
                    return Err(StorageError::ArityMismatch {
                        expected,
                        found: snapshot.num_columns(),
                    }
                    .into());
                }
                return Ok(Arc::new(ItemTable::with_columns(expected)));
            }
            trace!(table = table.name(), rows = snapshot.num_rows(), "made item table");
            Ok(snapshot)
        })
        .collect()
}

/// The rows of one FROM element, plus the index used to probe it or the
/// positions it is narrowed to.
#[derive(Debug)]
pub(crate) struct ElementSource {
    table: ItemTablePtr,
    width: usize,
    index: Option<ItemIndex>,
    narrowed: Option<Vec<usize>>,
}

impl ElementSource {
    /// Materializes the element, running its explicit joins.
    pub(crate) fn materialize(element: &JoinElement, tables: &[ItemTablePtr]) -> Result<Self> {
        Ok(Self {
            table: formula_table(&element.formula, tables)?,
            width: element.width,
            index: None,
            narrowed: None,
        })
    }

    /// Builds what `path` reads: the join index, or the positions left by
    /// the literal condition it names in `primary`.
    pub(crate) fn prepare_access(&mut self, path: AccessPath, primary: &[PrimaryCondition]) -> Result<()> {
        let condition = |at: usize| {
            primary
                .get(at)
                .ok_or_else(|| SelectError::Internal(format!("primary condition {at} was not planned")))
        };
        match path {
            AccessPath::TableScan => {}
            AccessPath::IndexJoin { column, .. } => {
                self.index = Some(self.table.build_index(column)?);
            }
            AccessPath::IndexLookup { column, condition: at } => {
                let PrimaryCondition::ColumnEqValue { value, .. } = condition(at)? else {
                    return Err(SelectError::Internal(format!("condition {at} is not an equality")));
                };
                let positions = self.table.build_index(column)?.lookup(value).to_vec();
                trace!(column, rows = positions.len(), "narrowed by equality");
                self.narrowed = Some(positions);
            }
            AccessPath::RangeScan { column, condition: at } => {
                let PrimaryCondition::ColumnBetween { low, high, .. } = condition(at)? else {
                    return Err(SelectError::Internal(format!("condition {at} is not a range")));
                };
                let mut positions = Vec::new();
                for position in 0..self.table.num_rows() {
                    let group = self.row(position)?;
                    let item = group.item_at(column).ok_or(StorageError::ColumnOutOfRange {
                        index: column,
                        len: group.len(),
                    })?;
                    if may_lie_within(item, low, high) {
                        positions.push(position);
                    }
                }
                trace!(column, rows = positions.len(), "narrowed by range");
                self.narrowed = Some(positions);
            }
        }
        Ok(())
    }

    pub(crate) fn num_rows(&self) -> usize {
        self.table.num_rows()
    }

    /// Positions of the rows to visit given the partially built `row`.
    pub(crate) fn candidates(&self, path: AccessPath, row: &[ItemDataPtr]) -> Result<Candidates<'_>> {
        match (path, &self.index) {
            (AccessPath::TableScan, _) => Ok(Candidates::Scan(0..self.table.num_rows())),
            (AccessPath::IndexJoin { bound_slot, .. }, Some(index)) => {
                let key = row
                    .get(bound_slot)
                    .ok_or_else(|| SelectError::Internal(format!("join slot {bound_slot} out of range")))?;
                Ok(Candidates::Probe(index.lookup(key).iter()))
            }
            (AccessPath::IndexJoin { .. }, None) => {
                Err(SelectError::Internal("index join without an index".to_string()))
            }
            (AccessPath::IndexLookup { .. } | AccessPath::RangeScan { .. }, _) => match &self.narrowed {
                Some(positions) => Ok(Candidates::Probe(positions.iter())),
                None => Err(SelectError::Internal("narrowed access was not prepared".to_string())),
            },
        }
    }

    pub(crate) fn row(&self, position: usize) -> Result<&ItemGroupPtr> {
        let group = self
            .table
            .group_at(position)
            .ok_or_else(|| SelectError::Internal(format!("row {position} out of range")))?;
        if group.len() != self.width {
            return Err(StorageError::ArityMismatch {
                expected: self.width,
                found: group.len(),
            }
            .into());
        }
        Ok(group)
    }
}

pub(crate) enum Candidates<'a> {
    Scan(Range<usize>),
    Probe(slice::Iter<'a, usize>),
}

impl Iterator for Candidates<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        match self {
            Candidates::Scan(range) => range.next(),
            Candidates::Probe(positions) => positions.next().copied(),
        }
    }
}

/// False only when `item` certainly fails `BETWEEN low AND high`. Rows
/// whose comparison would fail stay in so the WHERE clause reports them.
fn may_lie_within(item: &ItemData, low: &ItemData, high: &ItemData) -> bool {
    match item.compare(low) {
        Err(_) => true,
        Ok(None) | Ok(Some(Ordering::Less)) => false,
        Ok(Some(_)) => match item.compare(high) {
            Err(_) => true,
            Ok(None) => false,
            Ok(Some(ordering)) => ordering != Ordering::Greater,
        },
    }
}

fn formula_table(formula: &TableFormula, tables: &[ItemTablePtr]) -> Result<ItemTablePtr> {
    match formula {
        TableFormula::Table(index) => tables
            .get(*index)
            .cloned()
            .ok_or_else(|| SelectError::Internal(format!("table {index} was not made"))),
        TableFormula::Join {
            kind,
            left,
            right,
            condition,
        } => {
            let left = formula_table(left, tables)?;
            let right = formula_table(right, tables)?;
            let joined = match (kind, condition) {
                (JoinKind::Cross, _) | (_, None) => left.cross_join(&right),
                (JoinKind::Inner, Some(on)) => left.inner_join(&right, on.left, on.right)?,
                (JoinKind::LeftOuter, Some(on)) => left.left_outer_join(&right, on.left, on.right)?,
                (JoinKind::RightOuter, Some(on)) => left.right_outer_join(&right, on.left, on.right)?,
                (JoinKind::FullOuter, Some(on)) => left.full_outer_join(&right, on.left, on.right)?,
            };
            trace!(?kind, rows = joined.num_rows(), "ran explicit join");
            Ok(Arc::new(joined))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use itemsql_parser::parse_select;
    use itemsql_planner::{build_elements, NameResolver};

    fn sources(sql: &str) -> Vec<ElementSource> {
        let registry = fixtures::registry();
        let stmt = parse_select(sql).unwrap();
        let resolver = NameResolver::new(&registry, &stmt.from).unwrap();
        let tables = make_item_tables(resolver.tables()).unwrap();
        build_elements(&stmt.from, &resolver)
            .unwrap()
            .iter()
            .map(|element| ElementSource::materialize(element, &tables).unwrap())
            .collect()
    }

    #[test]
    fn explicit_outer_join_pads_missing_side() {
        let sources = sources("select * from t1 left join t2 on t1.a = t2.a");
        let source = &sources[0];
        assert_eq!(source.num_rows(), 2);
        let padded = source.row(1).unwrap();
        assert_eq!(padded.item_at(0).unwrap().as_integer(), Some(2));
        assert!(padded.item_at(2).unwrap().is_null());
    }

    #[test]
    fn index_probe_visits_only_matches() {
        let mut sources = sources("select * from t1, t2");
        let path = AccessPath::IndexJoin { column: 0, bound_slot: 0 };
        sources[1].prepare_access(path, &[]).unwrap();
        let row = vec![fixtures::int(1)];
        let found: Vec<usize> = sources[1].candidates(path, &row).unwrap().collect();
        assert_eq!(found, vec![0]);
        let scanned: Vec<usize> = sources[1].candidates(AccessPath::TableScan, &row).unwrap().collect();
        assert_eq!(scanned, vec![0, 1]);
    }

    #[test]
    fn literal_conditions_narrow_the_rows_visited() {
        let primary = [
            PrimaryCondition::ColumnEqValue {
                slot: 1,
                value: fixtures::text("x"),
            },
            PrimaryCondition::ColumnBetween {
                slot: 0,
                low: fixtures::int(2),
                high: fixtures::int(3),
            },
        ];
        let mut sources = sources("select * from t");
        let row = vec![fixtures::int(0); 2];
        assert_eq!(sources[0].candidates(AccessPath::TableScan, &row).unwrap().count(), 3);

        let lookup = AccessPath::IndexLookup { column: 1, condition: 0 };
        sources[0].prepare_access(lookup, &primary).unwrap();
        let found: Vec<usize> = sources[0].candidates(lookup, &row).unwrap().collect();
        assert_eq!(found, vec![0, 2]);

        let range = AccessPath::RangeScan { column: 0, condition: 1 };
        sources[0].prepare_access(range, &primary).unwrap();
        let found: Vec<usize> = sources[0].candidates(range, &row).unwrap().collect();
        assert_eq!(found, vec![1, 2]);
    }

    #[test]
    fn range_keeps_rows_the_where_clause_must_reject() {
        let null = ItemData::null(itemsql_storage::ITEM_ID_ANONY, itemsql_storage::ItemType::Int);
        let (low, high) = (fixtures::int(2), fixtures::int(3));
        assert!(!may_lie_within(&null, &low, &high));
        assert!(!may_lie_within(&fixtures::int(4), &low, &high));
        assert!(may_lie_within(&fixtures::text("x"), &low, &high));
    }

    #[test]
    fn narrowing_needs_a_matching_condition() {
        let mut sources = sources("select * from t");
        let path = AccessPath::IndexLookup { column: 0, condition: 0 };
        assert!(matches!(sources[0].prepare_access(path, &[]), Err(SelectError::Internal(_))));
        assert!(matches!(
            sources[0].candidates(path, &[]),
            Err(SelectError::Internal(_))
        ));
    }

    #[test]
    fn missing_index_is_internal_error() {
        let sources = sources("select * from t1, t2");
        let path = AccessPath::IndexJoin { column: 0, bound_slot: 0 };
        assert!(matches!(
            sources[1].candidates(path, &[fixtures::int(1)]),
            Err(SelectError::Internal(_))
        ));
    }

    #[test]
    fn factory_without_data_fails() {
        let registry = fixtures::registry();
        let stmt = parse_select("select * from missing").unwrap();
        let resolver = NameResolver::new(&registry, &stmt.from).unwrap();
        assert!(matches!(
            make_item_tables(resolver.tables()),
            Err(SelectError::NoData(table)) if table == "missing"
        ));
    }

    #[test]
    fn empty_snapshot_takes_schema_arity() {
        let registry = fixtures::registry();
        let stmt = parse_select("select * from empty").unwrap();
        let resolver = NameResolver::new(&registry, &stmt.from).unwrap();
        let tables = make_item_tables(resolver.tables()).unwrap();
        assert_eq!((tables[0].num_rows(), tables[0].num_columns()), (0, 1));
    }
}
