//! Virtual table registry: static column metadata plus a factory per table.
//!
//! The registry is filled once by the embedding application (one registry
//! per data source) and is read-only afterwards, so it can be shared
//! between concurrently executing statements behind an `Arc`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, StorageError};
use crate::item::{ItemId, ItemType};
use crate::item_table::ItemTablePtr;

/// SQL-level column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlColumnType {
    Int,
    BigUint,
    Varchar,
    Char,
    Text,
    Double,
    Datetime,
}

impl SqlColumnType {
    /// Item type that carries values of this column.
    pub fn item_type(self) -> ItemType {
        match self {
            SqlColumnType::Int => ItemType::Int,
            SqlColumnType::BigUint => ItemType::Uint64,
            SqlColumnType::Double => ItemType::Double,
            SqlColumnType::Varchar
            | SqlColumnType::Char
            | SqlColumnType::Text
            | SqlColumnType::Datetime => ItemType::String,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlKeyType {
    #[default]
    None,
    Primary,
    Unique,
    Index,
}

/// Static metadata of one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub item_id: ItemId,
    pub table_name: String,
    pub column_name: String,
    pub column_type: SqlColumnType,
    pub column_length: usize,
    pub decimal_length: usize,
    pub can_be_null: bool,
    pub key_type: SqlKeyType,
    pub default_value: Option<String>,
}

impl ColumnDef {
    pub fn new(
        item_id: ItemId,
        table_name: impl Into<String>,
        column_name: impl Into<String>,
        column_type: SqlColumnType,
        column_length: usize,
    ) -> Self {
        Self {
            item_id,
            table_name: table_name.into(),
            column_name: column_name.into(),
            column_type,
            column_length,
            decimal_length: 0,
            can_be_null: false,
            key_type: SqlKeyType::None,
            default_value: None,
        }
    }

    pub fn key(mut self, key_type: SqlKeyType) -> Self {
        self.key_type = key_type;
        self
    }

    pub fn nullable(mut self, can_be_null: bool) -> Self {
        self.can_be_null = can_be_null;
        self
    }

    pub fn decimal_length(mut self, decimal_length: usize) -> Self {
        self.decimal_length = decimal_length;
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn item_type(&self) -> ItemType {
        self.column_type.item_type()
    }
}

/// Produces the current snapshot of a virtual table. `None` means the
/// source has no data to offer, which the engine treats as an error.
pub type TableFactory = Arc<dyn Fn() -> Option<ItemTablePtr> + Send + Sync>;

pub struct TableStaticInfo {
    pub table_id: i32,
    pub table_name: String,
    pub columns: Vec<ColumnDef>,
    factory: TableFactory,
}

impl TableStaticInfo {
    pub fn column(&self, index: usize) -> Option<&ColumnDef> {
        self.columns.get(index)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.column_name.eq_ignore_ascii_case(name))
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn make_table(&self) -> Option<ItemTablePtr> {
        (self.factory)()
    }
}

impl fmt::Debug for TableStaticInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableStaticInfo")
            .field("table_id", &self.table_id)
            .field("table_name", &self.table_name)
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct TableRegistry {
    schema_name: String,
    tables: Vec<Arc<TableStaticInfo>>,
    by_name: HashMap<String, usize>,
}

impl TableRegistry {
    pub fn new(schema_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            ..Self::default()
        }
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    pub fn register<F>(
        &mut self,
        table_id: i32,
        table_name: impl Into<String>,
        columns: Vec<ColumnDef>,
        factory: F,
    ) -> Result<()>
    where
        F: Fn() -> Option<ItemTablePtr> + Send + Sync + 'static,
    {
        let table_name = table_name.into();
        let key = normalize_identifier(&table_name);
        if self.by_name.contains_key(&key) {
            return Err(StorageError::DuplicateTable(table_name));
        }
        validate_columns(&table_name, &columns)?;

        debug!(
            schema = %self.schema_name,
            table = %table_name,
            columns = columns.len(),
            "registered virtual table"
        );
        self.by_name.insert(key, self.tables.len());
        self.tables.push(Arc::new(TableStaticInfo {
            table_id,
            table_name,
            columns,
            factory: Arc::new(factory),
        }));
        Ok(())
    }

    pub fn get(&self, table_name: &str) -> Option<&Arc<TableStaticInfo>> {
        self.by_name
            .get(&normalize_identifier(table_name))
            .map(|&index| &self.tables[index])
    }

    /// Tables in registration order.
    pub fn tables(&self) -> impl Iterator<Item = &Arc<TableStaticInfo>> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

fn validate_columns(table_name: &str, columns: &[ColumnDef]) -> Result<()> {
    if columns.is_empty() {
        return Err(StorageError::InvalidSchema {
            table: table_name.to_string(),
            reason: "no columns".to_string(),
        });
    }
    for (position, column) in columns.iter().enumerate() {
        if !column.table_name.eq_ignore_ascii_case(table_name) {
            return Err(StorageError::InvalidSchema {
                table: table_name.to_string(),
                reason: format!(
                    "column '{}' belongs to table '{}'",
                    column.column_name, column.table_name
                ),
            });
        }
        let duplicated = columns[..position]
            .iter()
            .any(|earlier| earlier.column_name.eq_ignore_ascii_case(&column.column_name));
        if duplicated {
            return Err(StorageError::DuplicateColumn {
                table: table_name.to_string(),
                column: column.column_name.clone(),
            });
        }
    }
    Ok(())
}

fn normalize_identifier(name: &str) -> String {
    name.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemData;
    use crate::item_table::ItemTable;

    fn host_columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new(1, "hosts", "id", SqlColumnType::BigUint, 20).key(SqlKeyType::Primary),
            ColumnDef::new(2, "hosts", "name", SqlColumnType::Varchar, 255).nullable(true),
        ]
    }

    #[test]
    fn register_and_lookup_is_case_insensitive() {
        let mut registry = TableRegistry::new("monitoring");
        registry
            .register(1, "hosts", host_columns(), || {
                let mut table = ItemTable::new();
                table
                    .add(
                        vec![ItemData::uint64(1, 7), ItemData::string(2, "web")]
                            .into_iter()
                            .collect::<crate::ItemGroup>(),
                    )
                    .ok()?;
                Some(Arc::new(table))
            })
            .unwrap();

        let info = registry.get("HOSTS").unwrap();
        assert_eq!(info.table_name, "hosts");
        assert_eq!(info.column_index("Name"), Some(1));
        assert_eq!(info.column(0).unwrap().key_type, SqlKeyType::Primary);
        assert_eq!(info.column(0).unwrap().item_type(), ItemType::Uint64);
        assert_eq!(info.make_table().unwrap().num_rows(), 1);
        assert_eq!(registry.schema_name(), "monitoring");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_table_is_rejected() {
        let mut registry = TableRegistry::new("monitoring");
        registry.register(1, "hosts", host_columns(), || None).unwrap();
        assert_eq!(
            registry.register(2, "Hosts", host_columns(), || None),
            Err(StorageError::DuplicateTable("Hosts".to_string()))
        );
    }

    #[test]
    fn columns_must_belong_to_the_table() {
        let mut registry = TableRegistry::new("monitoring");
        let mut columns = host_columns();
        columns.push(ColumnDef::new(3, "hosts", "NAME", SqlColumnType::Text, 0));
        assert!(matches!(
            registry.register(1, "hosts", columns, || None),
            Err(StorageError::DuplicateColumn { .. })
        ));

        let foreign = vec![ColumnDef::new(1, "events", "id", SqlColumnType::Int, 11)];
        assert!(matches!(
            registry.register(1, "hosts", foreign, || None),
            Err(StorageError::InvalidSchema { .. })
        ));
        assert!(registry.is_empty());
    }
}
