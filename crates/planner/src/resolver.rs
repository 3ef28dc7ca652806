//! Column name resolution across the tables of a FROM clause.
//!
//! Tables are laid out left to right in declaration order (explicit join
//! tables follow the table they join) and each occupies a contiguous run of
//! slots in the flattened row. A name resolves as follows:
//! 1. a single table with no qualifier, or a qualifier naming it, owns it
//! 2. a qualifier is looked up among the visible table names (alias, or
//!    the table name when there is no alias)
//! 3. a bare name belongs to the first table declaring that column; a
//!    name declared by several tables is not reported as ambiguous
//! 4. anything not found locally is tried against the parent resolver of
//!    an enclosing statement, one scope further out

use std::sync::Arc;

use itemsql_parser::{ColumnBinding, ColumnName, FromItem, TableRef};
use itemsql_storage::{ItemType, TableRegistry, TableStaticInfo};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::{PlanError, Result};

#[derive(Debug, Clone)]
pub struct ResolvedTable {
    pub info: Arc<TableStaticInfo>,
    pub alias: Option<String>,
    /// Slot of the table's first column in the flattened row.
    pub offset: usize,
    /// Index of the comma-separated FROM element holding the table.
    pub element: usize,
}

impl ResolvedTable {
    pub fn name(&self) -> &str {
        &self.info.table_name
    }

    pub fn visible_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.info.table_name)
    }

    pub fn num_columns(&self) -> usize {
        self.info.num_columns()
    }

    pub fn contains_slot(&self, slot: usize) -> bool {
        (self.offset..self.offset + self.num_columns()).contains(&slot)
    }
}

/// A resolved column reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedColumn {
    /// Index of the owning table in its resolver.
    pub table: usize,
    /// Column position inside the owning table.
    pub column: usize,
    pub binding: ColumnBinding,
    pub item_type: ItemType,
}

#[derive(Debug, Clone)]
pub struct NameResolver<'a> {
    tables: Vec<ResolvedTable>,
    by_name: FxHashMap<String, usize>,
    parent: Option<&'a NameResolver<'a>>,
}

impl<'a> NameResolver<'a> {
    pub fn new(registry: &TableRegistry, from: &[FromItem]) -> Result<Self> {
        let mut resolver = Self {
            tables: Vec::new(),
            by_name: FxHashMap::default(),
            parent: None,
        };
        let mut offset = 0;
        for (element, item) in from.iter().enumerate() {
            let refs = std::iter::once(&item.table).chain(item.joins.iter().map(|join| &join.table));
            for table_ref in refs {
                offset += resolver.add_table(registry, table_ref, element, offset)?;
            }
        }
        Ok(resolver)
    }

    /// Falls back to `parent` for names not found here.
    pub fn with_parent(mut self, parent: &'a NameResolver<'a>) -> Self {
        self.parent = Some(parent);
        self
    }

    fn add_table(&mut self, registry: &TableRegistry, table_ref: &TableRef, element: usize, offset: usize) -> Result<usize> {
        let info = registry
            .get(&table_ref.name)
            .ok_or_else(|| PlanError::UnknownTable(table_ref.name.clone()))?;
        let visible = normalize_identifier(table_ref.visible_name());
        if self.by_name.contains_key(&visible) {
            return Err(PlanError::DuplicateAlias(table_ref.visible_name().to_string()));
        }
        self.by_name.insert(visible, self.tables.len());
        self.tables.push(ResolvedTable {
            info: Arc::clone(info),
            alias: table_ref.alias.clone(),
            offset,
            element,
        });
        Ok(info.num_columns())
    }

    pub fn tables(&self) -> &[ResolvedTable] {
        &self.tables
    }

    /// Total width of the flattened row.
    pub fn num_slots(&self) -> usize {
        self.tables.last().map_or(0, |table| table.offset + table.num_columns())
    }

    /// Looks a table up by alias, or by name when it has no alias.
    pub fn table(&self, visible_name: &str) -> Option<&ResolvedTable> {
        self.table_index(visible_name).map(|index| &self.tables[index])
    }

    fn table_index(&self, qualifier: &str) -> Option<usize> {
        if let Some(&index) = self.by_name.get(&normalize_identifier(qualifier)) {
            return Some(index);
        }
        match self.tables.as_slice() {
            [only] if only.name().eq_ignore_ascii_case(qualifier) => Some(0),
            _ => None,
        }
    }

    /// The local table owning `slot`.
    pub fn table_of_slot(&self, slot: usize) -> Option<&ResolvedTable> {
        self.tables.iter().find(|table| table.contains_slot(slot))
    }

    /// Base slot of a table's columns, looked up by visible name.
    pub fn column_index_offset(&self, table_name: &str) -> Option<usize> {
        self.table(table_name).map(|table| table.offset)
    }

    pub fn resolve(&self, name: &ColumnName) -> Result<ResolvedColumn> {
        if let Some(column) = self.resolve_local(name)? {
            return Ok(column);
        }
        match self.parent {
            Some(parent) => {
                let mut column = parent.resolve(name)?;
                column.binding.depth += 1;
                trace!(column = %name, depth = column.binding.depth, "resolved in enclosing statement");
                Ok(column)
            }
            None => Err(match &name.table {
                Some(qualifier) => PlanError::UnknownAlias(qualifier.clone()),
                None => PlanError::UnknownColumn(name.column.clone()),
            }),
        }
    }

    /// `Ok(None)` means no local table could own the name.
    fn resolve_local(&self, name: &ColumnName) -> Result<Option<ResolvedColumn>> {
        let found = match &name.table {
            Some(qualifier) => {
                let Some(table) = self.table_index(qualifier) else {
                    return Ok(None);
                };
                let column = self.tables[table]
                    .info
                    .column_index(&name.column)
                    .ok_or_else(|| PlanError::UnknownColumn(name.to_string()))?;
                (table, column)
            }
            None => {
                let owner = self.tables.iter().enumerate().find_map(|(table, resolved)| {
                    resolved.info.column_index(&name.column).map(|column| (table, column))
                });
                match owner {
                    Some(found) => found,
                    None => return Ok(None),
                }
            }
        };
        Ok(Some(self.column_at(found.0, found.1)))
    }

    fn column_at(&self, table: usize, column: usize) -> ResolvedColumn {
        let resolved = &self.tables[table];
        let item_type = resolved
            .info
            .column(column)
            .map_or(ItemType::String, |def| def.item_type());
        ResolvedColumn {
            table,
            column,
            binding: ColumnBinding {
                depth: 0,
                slot: resolved.offset + column,
            },
            item_type,
        }
    }

    /// Every column of every table, in row order.
    pub fn all_columns(&self) -> Vec<ResolvedColumn> {
        self.tables
            .iter()
            .enumerate()
            .flat_map(|(table, resolved)| (0..resolved.num_columns()).map(move |column| (table, column)))
            .map(|(table, column)| self.column_at(table, column))
            .collect()
    }

    /// Every column of the table named `qualifier`.
    pub fn table_columns(&self, qualifier: &str) -> Result<Vec<ResolvedColumn>> {
        let Some(table) = self.table_index(qualifier) else {
            let outer = self.parent.is_some_and(|parent| parent.table(qualifier).is_some());
            return Err(if outer {
                PlanError::WildcardNotAllowed(qualifier.to_string())
            } else {
                PlanError::UnknownAlias(qualifier.to_string())
            });
        };
        Ok((0..self.tables[table].num_columns())
            .map(|column| self.column_at(table, column))
            .collect())
    }
}

fn normalize_identifier(name: &str) -> String {
    name.to_ascii_lowercase()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use itemsql_parser::parse_select;
    use itemsql_storage::{ColumnDef, SqlColumnType};

    pub(crate) fn registry() -> TableRegistry {
        let mut registry = TableRegistry::new("monitoring");
        let tables: [(&str, &[(&str, SqlColumnType)]); 3] = [
            ("hosts", &[("id", SqlColumnType::BigUint), ("name", SqlColumnType::Varchar)]),
            (
                "items",
                &[
                    ("id", SqlColumnType::BigUint),
                    ("host_id", SqlColumnType::BigUint),
                    ("name", SqlColumnType::Varchar),
                ],
            ),
            (
                "events",
                &[
                    ("id", SqlColumnType::BigUint),
                    ("item_id", SqlColumnType::BigUint),
                    ("value", SqlColumnType::Double),
                ],
            ),
        ];
        for (table_id, (table, columns)) in tables.iter().enumerate() {
            let defs = columns
                .iter()
                .enumerate()
                .map(|(i, (name, ty))| ColumnDef::new((table_id * 10 + i) as u64, *table, *name, *ty, 0))
                .collect();
            registry.register(table_id as i32, *table, defs, || None).unwrap();
        }
        registry
    }

    pub(crate) fn resolver_for<'a>(registry: &TableRegistry, sql: &str) -> NameResolver<'a> {
        let stmt = parse_select(sql).unwrap();
        NameResolver::new(registry, &stmt.from).unwrap()
    }

    #[test]
    fn offsets_follow_declaration_order() {
        let registry = registry();
        let resolver = resolver_for(&registry, "select * from hosts h, items i join events e on i.id = e.item_id");
        let offsets: Vec<(usize, usize)> = resolver.tables().iter().map(|t| (t.offset, t.element)).collect();
        assert_eq!(offsets, vec![(0, 0), (2, 1), (5, 1)]);
        assert_eq!(resolver.num_slots(), 8);
        assert_eq!(resolver.column_index_offset("e"), Some(5));
        assert_eq!(resolver.table_of_slot(4).map(ResolvedTable::visible_name), Some("i"));
    }

    #[test]
    fn single_table_accepts_name_or_alias() {
        let registry = registry();
        let resolver = resolver_for(&registry, "select * from hosts h");
        let by_alias = resolver.resolve(&ColumnName::new(Some("h"), "name")).unwrap();
        let by_name = resolver.resolve(&ColumnName::new(Some("hosts"), "name")).unwrap();
        let bare = resolver.resolve(&ColumnName::new(None, "NAME")).unwrap();
        assert_eq!(by_alias, by_name);
        assert_eq!(bare.binding, ColumnBinding { depth: 0, slot: 1 });
        assert_eq!(bare.item_type, ItemType::String);
    }

    #[test]
    fn bare_names_bind_to_the_first_declaring_table() {
        let registry = registry();
        let resolver = resolver_for(&registry, "select * from items i, hosts h");
        // Both tables declare `name`; the first one wins without an error.
        let name = resolver.resolve(&ColumnName::new(None, "name")).unwrap();
        assert_eq!(resolver.tables()[name.table].visible_name(), "i");
        assert_eq!(name.binding.slot, 2);
        let host_name = resolver.resolve(&ColumnName::new(Some("h"), "name")).unwrap();
        assert_eq!(host_name.binding.slot, 4);
    }

    #[test]
    fn unknown_names() {
        let registry = registry();
        let resolver = resolver_for(&registry, "select * from hosts h, items i");
        assert_eq!(
            resolver.resolve(&ColumnName::new(Some("x"), "id")),
            Err(PlanError::UnknownAlias("x".to_string()))
        );
        assert_eq!(
            resolver.resolve(&ColumnName::new(None, "clock")),
            Err(PlanError::UnknownColumn("clock".to_string()))
        );
        assert_eq!(
            resolver.resolve(&ColumnName::new(Some("h"), "clock")),
            Err(PlanError::UnknownColumn("h.clock".to_string()))
        );
        // With two tables only visible names qualify.
        assert!(resolver.resolve(&ColumnName::new(Some("hosts"), "id")).is_err());
    }

    #[test]
    fn from_clause_errors() {
        let registry = registry();
        let unknown = parse_select("select * from nowhere").unwrap();
        assert_eq!(
            NameResolver::new(&registry, &unknown.from).err(),
            Some(PlanError::UnknownTable("nowhere".to_string()))
        );
        let duplicate = parse_select("select * from hosts, items hosts").unwrap();
        assert_eq!(
            NameResolver::new(&registry, &duplicate.from).err(),
            Some(PlanError::DuplicateAlias("hosts".to_string()))
        );
    }

    #[test]
    fn parent_scope_is_one_level_out() {
        let registry = registry();
        let outer = resolver_for(&registry, "select * from hosts h");
        let inner = resolver_for(&registry, "select * from items i").with_parent(&outer);
        let local = inner.resolve(&ColumnName::new(None, "host_id")).unwrap();
        assert_eq!(local.binding, ColumnBinding { depth: 0, slot: 1 });
        let correlated = inner.resolve(&ColumnName::new(Some("h"), "id")).unwrap();
        assert_eq!(correlated.binding, ColumnBinding { depth: 1, slot: 0 });
        assert_eq!(
            inner.table_columns("h"),
            Err(PlanError::WildcardNotAllowed("h".to_string()))
        );
    }

    #[test]
    fn wildcard_expansion() {
        let registry = registry();
        let resolver = resolver_for(&registry, "select * from hosts h, items i");
        assert_eq!(resolver.all_columns().len(), 5);
        let slots: Vec<usize> = resolver
            .table_columns("i")
            .unwrap()
            .iter()
            .map(|c| c.binding.slot)
            .collect();
        assert_eq!(slots, vec![2, 3, 4]);
    }
}
