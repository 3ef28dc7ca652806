use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("unknown table alias '{0}'")]
    UnknownAlias(String),

    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("duplicate table alias '{0}'")]
    DuplicateAlias(String),

    #[error("invalid join condition '{left} = {right}': {reason}")]
    InvalidJoinCondition {
        left: String,
        right: String,
        reason: &'static str,
    },

    #[error("'{0}.*' cannot refer to a table of an enclosing statement")]
    WildcardNotAllowed(String),
}

pub type Result<T> = std::result::Result<T, PlanError>;
