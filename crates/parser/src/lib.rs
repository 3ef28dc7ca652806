/// SELECT statement parsing for itemsql.
///
/// Modules:
/// - `separator`, `parsable_string`: word reader with pluggable separator checkers
/// - `lexer`: statement lexer built on the word reader
/// - `tree`: priority-insertion expression tree arena
/// - `where_tree`, `formula`: WHERE predicates and SELECT-list formulas
/// - `eval`: evaluation context, operators and constant folding results
/// - `ast`: the parsed statement
/// - `parser`: section-driven SELECT parser

pub mod ast;
pub mod error;
pub mod eval;
pub mod formula;
pub mod lexer;
pub mod parsable_string;
pub mod parser;
pub mod separator;
pub mod tree;
pub mod where_tree;

pub use ast::{
    ColumnBinding, ColumnLeaf, ColumnName, FromItem, JoinClause, JoinCondition, JoinKind, Limit,
    OrderByItem, SelectColumn, SelectStmt, TableRef,
};
pub use error::{EvalError, ParseError};
pub use eval::{
    ArithmeticOperator, CompareOperator, ConstantContext, EvalContext, OptimizationKind,
    OptimizationResult,
};
pub use formula::{AggregateFunction, FormulaNode, FormulaTree};
pub use tree::NodeId;
pub use where_tree::{WhereNode, WhereOperator, WhereTree};

use parser::SelectParser;

/// Parse a SELECT statement.
pub fn parse_select(input: &str) -> Result<SelectStmt, ParseError> {
    SelectParser::new(input).parse()
}
