use itemsql_parser::{EvalError, ParseError};
use itemsql_planner::PlanError;
use itemsql_storage::StorageError;
use thiserror::Error;

/// Failure of one statement. Every error aborts the statement; there is
/// no partial result.
#[derive(Error, Debug)]
pub enum SelectError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("{0}")]
    Plan(#[from] PlanError),

    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("no data supplied for table '{0}'")]
    NoData(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SelectError>;
