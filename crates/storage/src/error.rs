//! Error types for the value model and the schema registry.

use thiserror::Error;

use crate::item::ItemType;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("type mismatch: cannot compare {left} with {right}")]
    TypeMismatch { left: ItemType, right: ItemType },

    #[error("arity mismatch: expected {expected} columns, found {found}")]
    ArityMismatch { expected: usize, found: usize },

    #[error("column index {index} out of range for {len} columns")]
    ColumnOutOfRange { index: usize, len: usize },

    #[error("table already registered: {0}")]
    DuplicateTable(String),

    #[error("duplicate column '{column}' in table {table}")]
    DuplicateColumn { table: String, column: String },

    #[error("invalid schema for table {table}: {reason}")]
    InvalidSchema { table: String, reason: String },

    #[error("cannot convert '{value}' to {target}")]
    Coercion { value: String, target: ItemType },
}
