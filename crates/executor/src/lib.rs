/// Query executor: runs SELECT statements over registered virtual tables.
///
/// A statement is prepared (names bound, item tables made, join planned),
/// then its FROM elements are enumerated with a nested loop, filtered by
/// the WHERE clause, grouped and serialized to text rows.
pub mod error;
pub mod options;
pub mod output;
pub mod select;

mod context;
mod group;
mod join;
mod source;

#[cfg(test)]
mod fixtures;

pub use error::{Result, SelectError};
pub use options::SelectOptions;
pub use output::{OutputColumn, SelectOutput};
pub use select::{SelectExecutor, SelectPhase};
