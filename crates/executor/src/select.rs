//! SELECT orchestration.
//!
//! A statement moves through a fixed sequence of phases:
//! parse, build table info, resolve names, build output columns, make item
//! tables, optimize and plan, join, group, serialize. Any failure abandons
//! the statement; the executor's phase then tells how far it got.
//!
//! EXISTS subqueries are prepared together with their enclosing statement
//! (names they cannot resolve locally bind to the enclosing FROM tables)
//! and run once per enclosing row, stopping at the first match.

use std::ops::ControlFlow;

use itemsql_parser::{
    parse_select, ColumnLeaf, ColumnName, FormulaTree, Limit, NodeId, OptimizationKind, SelectColumn, SelectStmt,
    WhereTree,
};
use itemsql_planner::{plan_from, FromPlan, NameResolver, PlanError, ResolvedColumn};
use itemsql_storage::{ItemDataPtr, TableRegistry};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::context::RowView;
use crate::error::{Result, SelectError};
use crate::group::{group_rows, sort_rows, Row, SortKey};
use crate::join::NestedLoopJoin;
use crate::options::SelectOptions;
use crate::output::{item_text, OutputColumn, SelectOutput};
use crate::source::{make_item_tables, ElementSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectPhase {
    Fresh,
    Parsed,
    TableInfoBuilt,
    NamesResolved,
    ColumnDefsBuilt,
    ItemTablesMade,
    FormulaOptimized,
    Joined,
    Grouped,
    Serialized,
    Done,
}

fn advance(phase: &mut SelectPhase, next: SelectPhase) {
    debug!(from = ?*phase, to = ?next, "select phase");
    *phase = next;
}

/// Runs SELECT statements against a table registry.
pub struct SelectExecutor<'r> {
    registry: &'r TableRegistry,
    options: SelectOptions,
    phase: SelectPhase,
}

impl<'r> SelectExecutor<'r> {
    pub fn new(registry: &'r TableRegistry) -> Self {
        Self::with_options(registry, SelectOptions::default())
    }

    pub fn with_options(registry: &'r TableRegistry, options: SelectOptions) -> Self {
        Self {
            registry,
            options,
            phase: SelectPhase::Fresh,
        }
    }

    /// The phase the last statement reached.
    pub fn phase(&self) -> SelectPhase {
        self.phase
    }

    pub fn options(&self) -> &SelectOptions {
        &self.options
    }

    pub fn select(&mut self, sql: &str) -> Result<SelectOutput> {
        let mut query = self.prepare(sql)?;

        let mut selected = query.selected_rows()?;
        debug!(rows = selected.len(), "joined");
        self.advance(SelectPhase::Joined);

        if self.options.apply_order_by {
            sort_rows(&mut selected, &query.order_by)?;
        }
        let groups = group_rows(selected, &query.group_by);
        debug!(groups = groups.len(), "grouped");
        self.advance(SelectPhase::Grouped);

        let mut rows = query.serialize(&groups, &self.options.null_text)?;
        if let Some(limit) = query.limit.filter(|_| self.options.enforce_limit) {
            rows = rows.into_iter().skip(limit.offset).take(limit.count).collect();
        }
        self.advance(SelectPhase::Serialized);

        let output = SelectOutput {
            columns: query.outputs.into_iter().map(|output| output.column).collect(),
            rows,
        };
        self.advance(SelectPhase::Done);
        Ok(output)
    }

    /// True when at least one joined row satisfies the WHERE clause. The
    /// join stops at the first such row.
    pub fn run_for_exists(&mut self, sql: &str) -> Result<bool> {
        let query = self.prepare(sql)?;
        let found = query.exists(None)?;
        debug!(found, "exists");
        self.advance(SelectPhase::Joined);
        self.advance(SelectPhase::Done);
        Ok(found)
    }

    fn prepare(&mut self, sql: &str) -> Result<PreparedSelect> {
        self.phase = SelectPhase::Fresh;
        let stmt = parse_select(sql)?;
        self.advance(SelectPhase::Parsed);
        let registry = self.registry;
        let phase = &mut self.phase;
        PreparedSelect::prepare(registry, stmt, None, &mut |next| advance(phase, next))
    }

    fn advance(&mut self, next: SelectPhase) {
        advance(&mut self.phase, next);
    }
}

struct OutputFormula {
    column: OutputColumn,
    formula: FormulaTree,
}

/// A statement with every name bound, its tables made and its join
/// planned.
pub(crate) struct PreparedSelect {
    distinct: bool,
    outputs: Vec<OutputFormula>,
    where_clause: Option<WhereTree>,
    where_kind: OptimizationKind,
    subqueries: FxHashMap<NodeId, PreparedSelect>,
    plan: FromPlan,
    sources: Vec<ElementSource>,
    num_slots: usize,
    group_by: Vec<usize>,
    order_by: Vec<SortKey>,
    limit: Option<Limit>,
}

impl PreparedSelect {
    fn prepare(
        registry: &TableRegistry,
        stmt: SelectStmt,
        parent: Option<&NameResolver<'_>>,
        on_phase: &mut dyn FnMut(SelectPhase),
    ) -> Result<Self> {
        let SelectStmt {
            distinct,
            columns,
            from,
            mut where_clause,
            group_by,
            order_by,
            limit,
        } = stmt;

        let resolver = match parent {
            Some(parent) => NameResolver::new(registry, &from)?.with_parent(parent),
            None => NameResolver::new(registry, &from)?,
        };
        on_phase(SelectPhase::TableInfoBuilt);

        let bind = |name: &ColumnName| resolver.resolve(name).map(|column| (column.binding, column.item_type));
        let mut subqueries = FxHashMap::default();
        if let Some(tree) = where_clause.as_mut() {
            tree.bind_columns(&bind)?;
            tree.coerce_literals();
            let statements: Vec<(NodeId, SelectStmt)> = tree
                .exists_nodes()
                .map(|(node, statement)| (node, statement.clone()))
                .collect();
            for (node, statement) in statements {
                let subquery = PreparedSelect::prepare(registry, statement, Some(&resolver), &mut |_| {})?;
                subqueries.insert(node, subquery);
            }
        }
        let group_by = group_by
            .iter()
            .map(|name| local_slot(&resolver, name))
            .collect::<Result<Vec<_>>>()?;
        let order_by = order_by
            .iter()
            .map(|item| {
                Ok(SortKey {
                    slot: local_slot(&resolver, &item.column)?,
                    descending: item.descending,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        on_phase(SelectPhase::NamesResolved);

        let mut outputs = output_formulas(registry.schema_name(), &resolver, columns)?;
        on_phase(SelectPhase::ColumnDefsBuilt);

        let tables = make_item_tables(resolver.tables())?;
        on_phase(SelectPhase::ItemTablesMade);

        let where_kind = where_clause
            .as_ref()
            .map_or(OptimizationKind::AlwaysTrue, |tree| tree.optimize().kind);
        for output in &mut outputs {
            output.formula.optimize();
        }
        let plan = plan_from(&from, &resolver, where_clause.as_ref())?;
        let mut sources = plan
            .elements
            .iter()
            .map(|element| ElementSource::materialize(element, &tables))
            .collect::<Result<Vec<_>>>()?;
        for (source, path) in sources.iter_mut().zip(&plan.join.access) {
            source.prepare_access(*path, &plan.primary)?;
        }
        debug!(
            tables = tables.len(),
            elements = plan.elements.len(),
            index_joins = plan.join.index_joins(),
            restricted = plan.join.restricted(),
            where_kind = ?where_kind,
            subqueries = subqueries.len(),
            "prepared statement"
        );
        on_phase(SelectPhase::FormulaOptimized);

        Ok(Self {
            distinct,
            outputs,
            where_clause,
            where_kind,
            subqueries,
            plan,
            sources,
            num_slots: resolver.num_slots(),
            group_by,
            order_by,
            limit,
        })
    }

    /// Rows surviving the WHERE clause, in join order.
    fn selected_rows(&self) -> Result<Vec<Row>> {
        let mut selected = Vec::new();
        if self.where_kind == OptimizationKind::AlwaysFalse {
            debug!("WHERE is always false, skipping the join");
            return Ok(selected);
        }
        let flow = self.enumerate(None, |row| {
            selected.push(row.to_vec());
            Ok(ControlFlow::Continue(()))
        })?;
        debug_assert!(flow.is_continue());
        Ok(selected)
    }

    pub(crate) fn exists(&self, outer: Option<&RowView<'_>>) -> Result<bool> {
        if self.where_kind == OptimizationKind::AlwaysFalse {
            return Ok(false);
        }
        let flow = self.enumerate(outer, |_| Ok(ControlFlow::Break(())))?;
        Ok(flow.is_break())
    }

    fn enumerate<F>(&self, outer: Option<&RowView<'_>>, mut emit: F) -> Result<ControlFlow<()>>
    where
        F: FnMut(&[ItemDataPtr]) -> Result<ControlFlow<()>>,
    {
        let join = NestedLoopJoin::new(&self.plan.elements, &self.plan.join.access, &self.sources, self.num_slots)?;
        let filter = self
            .where_clause
            .as_ref()
            .filter(|_| self.where_kind != OptimizationKind::AlwaysTrue);
        join.run(|row| {
            if let Some(tree) = filter {
                let view = RowView::new(row, outer, &self.subqueries);
                if !tree.evaluate(&view)? {
                    return Ok(ControlFlow::Continue(()));
                }
            }
            emit(row)
        })
    }

    /// Evaluates every output for every row. With aggregates or GROUP BY
    /// only the last row of each group is printed; DISTINCT drops rows
    /// already printed anywhere in the result.
    fn serialize(&mut self, groups: &[Vec<Row>], null_text: &str) -> Result<Vec<Vec<String>>> {
        let masked = !self.group_by.is_empty() || self.outputs.iter().any(|output| output.formula.has_statistics());
        let mut printed: FxHashSet<Vec<String>> = FxHashSet::default();
        let mut rows = Vec::new();
        for group in groups {
            for output in &mut self.outputs {
                output.formula.reset_statistics();
            }
            let last = group.len().saturating_sub(1);
            for (position, row) in group.iter().enumerate() {
                let view = RowView::new(row, None, &self.subqueries);
                let mut texts = Vec::with_capacity(self.outputs.len());
                for output in &mut self.outputs {
                    let value = output
                        .formula
                        .evaluate(&view)?
                        .ok_or_else(|| SelectError::NoData(output.column.alias.clone()))?;
                    texts.push(item_text(&value, null_text));
                }
                if masked && position != last {
                    continue;
                }
                if self.distinct && !printed.insert(texts.clone()) {
                    trace!(row = ?texts, "dropped duplicate row");
                    continue;
                }
                rows.push(texts);
            }
        }
        Ok(rows)
    }
}

/// Slot of a column of the current statement.
fn local_slot(resolver: &NameResolver<'_>, name: &ColumnName) -> Result<usize> {
    let column = resolver.resolve(name)?;
    if column.binding.depth != 0 {
        return Err(PlanError::UnknownColumn(name.to_string()).into());
    }
    Ok(column.binding.slot)
}

/// Expands wildcards and binds every SELECT-list formula.
fn output_formulas(schema: &str, resolver: &NameResolver<'_>, columns: Vec<SelectColumn>) -> Result<Vec<OutputFormula>> {
    let mut outputs = Vec::new();
    for column in columns {
        match column {
            SelectColumn::AllColumns => {
                for resolved in resolver.all_columns() {
                    outputs.push(wildcard_output(schema, resolver, &resolved));
                }
            }
            SelectColumn::TableColumns(table) => {
                for resolved in resolver.table_columns(&table)? {
                    outputs.push(wildcard_output(schema, resolver, &resolved));
                }
            }
            SelectColumn::Expr { mut formula, alias } => {
                formula.bind_columns(|name: &ColumnName| {
                    resolver.resolve(name).map(|column| (column.binding, column.item_type))
                })?;
                let column = match formula.as_single_column() {
                    Some(leaf) => {
                        let resolved = resolver.resolve(&leaf.name)?;
                        describe(schema, resolver, &resolved, &leaf.name, alias)
                    }
                    None => OutputColumn {
                        schema: schema.to_string(),
                        alias: alias.unwrap_or_else(|| formula.to_string()),
                        ..OutputColumn::default()
                    },
                };
                outputs.push(OutputFormula { column, formula });
            }
        }
    }
    Ok(outputs)
}

fn wildcard_output(schema: &str, resolver: &NameResolver<'_>, resolved: &ResolvedColumn) -> OutputFormula {
    let table = &resolver.tables()[resolved.table];
    let column_name = table
        .info
        .column(resolved.column)
        .map_or_else(String::new, |def| def.column_name.clone());
    let name = ColumnName::new(Some(table.visible_name()), &column_name);
    let mut leaf = ColumnLeaf::new(name.clone());
    leaf.bind(resolved.binding, resolved.item_type);
    OutputFormula {
        column: describe(schema, resolver, resolved, &name, None),
        formula: FormulaTree::variable(leaf),
    }
}

fn describe(
    schema: &str,
    resolver: &NameResolver<'_>,
    resolved: &ResolvedColumn,
    written: &ColumnName,
    alias: Option<String>,
) -> OutputColumn {
    let mut column = OutputColumn {
        schema: schema.to_string(),
        column: written.column.clone(),
        ..OutputColumn::default()
    };
    if resolved.binding.depth == 0 {
        let table = &resolver.tables()[resolved.table];
        column.table = table.name().to_string();
        column.table_alias = table.alias.clone().unwrap_or_default();
        if let Some(def) = table.info.column(resolved.column) {
            column.column = def.column_name.clone();
        }
    }
    column.alias = alias.unwrap_or_else(|| column.column.clone());
    column
}
