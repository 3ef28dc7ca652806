//! Primary conditions and the join plan.
//!
//! Primary conditions are the top-level AND terms of a WHERE clause that
//! compare a column against another column, a literal, or a BETWEEN range.
//! Column-to-column equalities between two FROM elements let the later
//! element be probed through an index on the join column instead of being
//! scanned for every combination of earlier rows. Literal equalities and
//! ranges narrow an element to the rows that can satisfy them.

use itemsql_parser::{CompareOperator, NodeId, WhereNode, WhereOperator, WhereTree};
use itemsql_storage::ItemDataPtr;
use tracing::{debug, trace};

use crate::table_formula::JoinElement;

#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryCondition {
    /// `a = b`, both columns of the current statement.
    ColumnEqColumn { left: usize, right: usize },
    /// `a = literal`
    ColumnEqValue { slot: usize, value: ItemDataPtr },
    /// `a BETWEEN low AND high`
    ColumnBetween {
        slot: usize,
        low: ItemDataPtr,
        high: ItemDataPtr,
    },
}

/// Collects primary conditions from a bound WHERE tree. Terms touching
/// columns of an enclosing statement are skipped.
pub fn pick_primary_conditions(tree: &WhereTree) -> Vec<PrimaryCondition> {
    let conditions: Vec<PrimaryCondition> = tree
        .and_terms()
        .into_iter()
        .filter_map(|term| primary_condition(tree, term))
        .collect();
    trace!(count = conditions.len(), "picked primary conditions");
    conditions
}

fn primary_condition(tree: &WhereTree, term: NodeId) -> Option<PrimaryCondition> {
    let local_slot = |id: Option<NodeId>| {
        id.and_then(|id| tree.column(id))
            .and_then(|leaf| leaf.binding)
            .filter(|binding| binding.depth == 0)
            .map(|binding| binding.slot)
    };
    let literal = |id: Option<NodeId>| id.and_then(|id| tree.literal(id)).cloned();
    let (left, right) = (tree.left(term), tree.right(term));
    match tree.node(term) {
        WhereNode::Element(WhereOperator::Compare(CompareOperator::Equal)) => {
            match (local_slot(left), local_slot(right)) {
                (Some(left), Some(right)) => Some(PrimaryCondition::ColumnEqColumn { left, right }),
                (Some(slot), None) => literal(right).map(|value| PrimaryCondition::ColumnEqValue { slot, value }),
                (None, Some(slot)) => literal(left).map(|value| PrimaryCondition::ColumnEqValue { slot, value }),
                (None, None) => None,
            }
        }
        WhereNode::Element(WhereOperator::Between) => {
            let slot = local_slot(left)?;
            match right.map(|id| tree.node(id)) {
                Some(WhereNode::PairedNumber(low, high)) => Some(PrimaryCondition::ColumnBetween {
                    slot,
                    low: low.clone(),
                    high: high.clone(),
                }),
                _ => None,
            }
        }
        _ => None,
    }
}

/// How the rows of one FROM element are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPath {
    /// Visit every row.
    TableScan,
    /// Look rows up by `column` (position within the element's rows),
    /// keyed by the value already bound at `bound_slot` of the flattened
    /// row.
    IndexJoin { column: usize, bound_slot: usize },
    /// Visit the rows whose `column` equals the literal of primary
    /// condition `condition`.
    IndexLookup { column: usize, condition: usize },
    /// Visit the rows whose `column` lies in the range of primary
    /// condition `condition`.
    RangeScan { column: usize, condition: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPlan {
    /// One access path per FROM element, in declaration order.
    pub access: Vec<AccessPath>,
}

impl JoinPlan {
    pub fn index_joins(&self) -> usize {
        self.access
            .iter()
            .filter(|path| matches!(path, AccessPath::IndexJoin { .. }))
            .count()
    }

    /// Elements narrowed by a literal equality or a range.
    pub fn restricted(&self) -> usize {
        self.access
            .iter()
            .filter(|path| matches!(path, AccessPath::IndexLookup { .. } | AccessPath::RangeScan { .. }))
            .count()
    }
}

/// Chooses an access path for every element. A later element is probed
/// through an index when an equality ties one of its columns to a column
/// of an earlier element. Otherwise a literal equality, then a range, on
/// one of its columns narrows the rows visited. The first element is
/// scanned unless it can be narrowed.
pub fn prepare_join(elements: &[JoinElement], primary: &[PrimaryCondition]) -> JoinPlan {
    let access = elements
        .iter()
        .enumerate()
        .map(|(position, element)| {
            let joined = if position == 0 {
                None
            } else {
                index_join_for(element, primary)
            };
            let path = joined
                .or_else(|| restriction_for(element, primary))
                .unwrap_or(AccessPath::TableScan);
            trace!(element = position, ?path, "chose access path");
            path
        })
        .collect();
    let plan = JoinPlan { access };
    debug!(
        elements = elements.len(),
        index_joins = plan.index_joins(),
        restricted = plan.restricted(),
        "prepared join plan"
    );
    plan
}

fn index_join_for(element: &JoinElement, primary: &[PrimaryCondition]) -> Option<AccessPath> {
    primary.iter().find_map(|condition| {
        let PrimaryCondition::ColumnEqColumn { left, right } = *condition else {
            return None;
        };
        let probe = |own: usize, other: usize| {
            (element.contains_slot(own) && other < element.offset).then(|| AccessPath::IndexJoin {
                column: own - element.offset,
                bound_slot: other,
            })
        };
        probe(left, right).or_else(|| probe(right, left))
    })
}

fn restriction_for(element: &JoinElement, primary: &[PrimaryCondition]) -> Option<AccessPath> {
    let own = |slot: usize| element.contains_slot(slot).then(|| slot - element.offset);
    let lookup = primary.iter().enumerate().find_map(|(condition, primary)| match *primary {
        PrimaryCondition::ColumnEqValue { slot, .. } => {
            own(slot).map(|column| AccessPath::IndexLookup { column, condition })
        }
        _ => None,
    });
    lookup.or_else(|| {
        primary.iter().enumerate().find_map(|(condition, primary)| match *primary {
            PrimaryCondition::ColumnBetween { slot, .. } => {
                own(slot).map(|column| AccessPath::RangeScan { column, condition })
            }
            _ => None,
        })
    })
}
