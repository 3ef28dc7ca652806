use itemsql_storage::{ItemType, StorageError};
use thiserror::Error;

/// Errors raised while turning statement text into a [`SelectStmt`](crate::ast::SelectStmt).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("statement must start with SELECT")]
    MissingSelect,

    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),

    #[error("unexpected end of {0}")]
    UnexpectedEnd(&'static str),

    #[error("unterminated quoted string")]
    UnterminatedQuote,

    #[error("malformed BETWEEN: {0}")]
    MalformedBetween(String),

    #[error("{0} clause is empty")]
    EmptyClause(&'static str),

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("unbalanced parenthesis")]
    UnbalancedParenthesis,

    #[error("malformed expression: {0}")]
    MalformedTree(&'static str),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("invalid column reference '{0}'")]
    InvalidColumnName(String),

    #[error("{0} clause appears twice")]
    DuplicateClause(&'static str),
}

/// Errors raised while evaluating WHERE and formula trees against a row.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("no data for {0}")]
    NoData(String),

    #[error("column '{0}' is not bound")]
    UnboundColumn(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("operator '{operator}' expects numeric operands, found {found}")]
    NonNumeric {
        operator: &'static str,
        found: ItemType,
    },

    #[error("expression is not a predicate")]
    NotPredicate,

    #[error("subquery failed: {0}")]
    Subquery(String),
}
