/// Top-level integration crate for itemsql.
///
/// The embedding application registers its virtual tables (column
/// definitions plus a factory returning the current rows) in a
/// [`TableRegistry`], then runs SELECT statements through a
/// [`SqlProcessor`]. Results come back as text rows with labelled columns.
pub mod config;

use std::sync::Arc;

use itemsql_executor::SelectExecutor;
use tracing::{debug, warn};

pub use config::ProcessorConfig;
pub use itemsql_executor::{OutputColumn, SelectError, SelectOptions, SelectOutput, SelectPhase};
pub use itemsql_parser::{parse_select, ParseError};
pub use itemsql_planner::PlanError;
pub use itemsql_storage::{
    ColumnDef, ItemData, ItemDataPtr, ItemGroup, ItemTable, ItemTablePtr, ItemType, SqlColumnType, SqlKeyType,
    StorageError, TableFactory, TableRegistry, ITEM_ID_ANONY,
};

/// Runs statements against a shared, fully registered table registry.
#[derive(Debug, Clone)]
pub struct SqlProcessor {
    registry: Arc<TableRegistry>,
    config: ProcessorConfig,
}

impl SqlProcessor {
    pub fn new(registry: Arc<TableRegistry>) -> Self {
        Self::with_config(registry, ProcessorConfig::default())
    }

    pub fn with_config(registry: Arc<TableRegistry>, config: ProcessorConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<TableRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn select(&self, sql: &str) -> Result<SelectOutput, SelectError> {
        let mut executor = SelectExecutor::with_options(&self.registry, self.config.select_options());
        match executor.select(sql) {
            Ok(output) => {
                debug!(rows = output.num_rows(), columns = output.columns.len(), "select finished");
                Ok(output)
            }
            Err(err) => {
                warn!(sql, phase = ?executor.phase(), error = %err, "select failed");
                Err(err)
            }
        }
    }

    /// True when the statement matches at least one row.
    pub fn run_for_exists(&self, sql: &str) -> Result<bool, SelectError> {
        let mut executor = SelectExecutor::with_options(&self.registry, self.config.select_options());
        executor.run_for_exists(sql).map_err(|err| {
            warn!(sql, phase = ?executor.phase(), error = %err, "exists check failed");
            err
        })
    }
}

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
