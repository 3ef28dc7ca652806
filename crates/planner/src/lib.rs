//! Query planner primitives.
//!
//! - resolve column names against the FROM tables (and enclosing statements)
//! - turn each FROM element into a table formula
//! - choose between a table scan and an index join for every element

pub mod error;
pub mod join_plan;
pub mod resolver;
pub mod table_formula;

pub use error::PlanError;
pub use join_plan::{pick_primary_conditions, prepare_join, AccessPath, JoinPlan, PrimaryCondition};
pub use resolver::{NameResolver, ResolvedColumn, ResolvedTable};
pub use table_formula::{build_elements, JoinColumns, JoinElement, TableFormula};

use itemsql_parser::{FromItem, WhereTree};

#[derive(Debug, Clone, PartialEq)]
pub struct FromPlan {
    pub elements: Vec<JoinElement>,
    pub primary: Vec<PrimaryCondition>,
    pub join: JoinPlan,
}

/// Plan the FROM clause of a statement whose WHERE columns are already
/// bound through `resolver`.
pub fn plan_from(
    from: &[FromItem],
    resolver: &NameResolver<'_>,
    where_clause: Option<&WhereTree>,
) -> Result<FromPlan, PlanError> {
    let elements = build_elements(from, resolver)?;
    let primary = where_clause.map(pick_primary_conditions).unwrap_or_default();
    let join = prepare_join(&elements, &primary);
    Ok(FromPlan {
        elements,
        primary,
        join,
    })
}
