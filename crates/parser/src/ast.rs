//! Parsed SELECT statement.

use std::fmt;

use itemsql_storage::{ItemData, ItemDataPtr, ItemType, ITEM_ID_ANONY};

use crate::error::ParseError;
use crate::formula::FormulaTree;
use crate::where_tree::WhereTree;

/// A SELECT statement.
#[derive(Debug, Clone, Default)]
pub struct SelectStmt {
    pub distinct: bool,
    pub columns: Vec<SelectColumn>,
    pub from: Vec<FromItem>,
    pub where_clause: Option<WhereTree>,
    pub group_by: Vec<ColumnName>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<Limit>,
}

/// A column in the SELECT list.
#[derive(Debug, Clone)]
pub enum SelectColumn {
    /// `*`
    AllColumns,
    /// `t.*`
    TableColumns(String),
    Expr {
        formula: FormulaTree,
        alias: Option<String>,
    },
}

/// A comma-separated element of the FROM clause with its explicit joins.
#[derive(Debug, Clone, PartialEq)]
pub struct FromItem {
    pub table: TableRef,
    pub joins: Vec<JoinClause>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    /// The name this table is referred to by in the statement.
    pub fn visible_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Cross,
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub table: TableRef,
    pub condition: Option<JoinCondition>,
}

/// `ON left = right`
#[derive(Debug, Clone, PartialEq)]
pub struct JoinCondition {
    pub left: ColumnName,
    pub right: ColumnName,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub column: ColumnName,
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub count: usize,
    pub offset: usize,
}

/// A possibly table-qualified column name as written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnName {
    pub table: Option<String>,
    pub column: String,
}

impl ColumnName {
    pub fn new(table: Option<&str>, column: &str) -> Self {
        Self {
            table: table.map(str::to_string),
            column: column.to_string(),
        }
    }

    /// Parses `column` or `table.column`.
    pub fn parse(word: &str) -> Result<Self, ParseError> {
        let invalid = || ParseError::InvalidColumnName(word.to_string());
        let mut parts = word.split('.');
        let first = parts.next().ok_or_else(invalid)?;
        let name = match (parts.next(), parts.next()) {
            (None, _) => Self::new(None, first),
            (Some(column), None) => Self::new(Some(first), column),
            (Some(_), Some(_)) => return Err(invalid()),
        };
        let valid_part = |part: &str| !part.is_empty() && part.chars().all(is_identifier_char);
        if !valid_part(&name.column) || !name.table.as_deref().map_or(true, valid_part) {
            return Err(invalid());
        }
        Ok(name)
    }
}

impl fmt::Display for ColumnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{table}.{}", self.column),
            None => f.write_str(&self.column),
        }
    }
}

/// Where a column's value lives while a row is evaluated: `depth` counts
/// statements outward (0 is the current one, 1 its enclosing statement)
/// and `slot` is the column's offset in that statement's combined row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnBinding {
    pub depth: usize,
    pub slot: usize,
}

/// A column reference inside a WHERE or formula tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnLeaf {
    pub name: ColumnName,
    pub binding: Option<ColumnBinding>,
    pub item_type: Option<ItemType>,
}

impl ColumnLeaf {
    pub fn new(name: ColumnName) -> Self {
        Self {
            name,
            binding: None,
            item_type: None,
        }
    }

    pub fn bind(&mut self, binding: ColumnBinding, item_type: ItemType) {
        self.binding = Some(binding);
        self.item_type = Some(item_type);
    }
}

pub(crate) fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

pub(crate) fn is_number(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('.') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

/// Parses a numeric literal into the narrowest item type that holds it:
/// Int, then Uint64, then Double.
pub(crate) fn parse_number(word: &str, negative: bool) -> Result<ItemDataPtr, ParseError> {
    let invalid = || ParseError::InvalidNumber(word.to_string());
    if word.contains(['.', 'e', 'E']) {
        let value: f64 = word.parse().map_err(|_| invalid())?;
        return Ok(ItemData::double(ITEM_ID_ANONY, if negative { -value } else { value }));
    }
    let magnitude: u64 = word.parse().map_err(|_| invalid())?;
    let value = if negative {
        -i128::from(magnitude)
    } else {
        i128::from(magnitude)
    };
    Ok(integer_item(value))
}

pub(crate) fn integer_item(value: i128) -> ItemDataPtr {
    if let Ok(v) = i32::try_from(value) {
        ItemData::int(ITEM_ID_ANONY, v)
    } else if let Ok(v) = u64::try_from(value) {
        ItemData::uint64(ITEM_ID_ANONY, v)
    } else {
        ItemData::double(ITEM_ID_ANONY, value as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemsql_storage::ItemValue;

    #[test]
    fn column_names() {
        assert_eq!(ColumnName::parse("host").unwrap(), ColumnName::new(None, "host"));
        assert_eq!(ColumnName::parse("h.name").unwrap(), ColumnName::new(Some("h"), "name"));
        assert!(ColumnName::parse("a.b.c").is_err());
        assert!(ColumnName::parse("a.").is_err());
        assert!(ColumnName::parse("x'y").is_err());
        assert_eq!(ColumnName::new(Some("h"), "id").to_string(), "h.id");
    }

    #[test]
    fn numbers_take_the_narrowest_type() {
        assert_eq!(parse_number("42", false).unwrap().value(), &ItemValue::Int(42));
        assert_eq!(parse_number("42", true).unwrap().value(), &ItemValue::Int(-42));
        assert_eq!(
            parse_number("4294967296", false).unwrap().value(),
            &ItemValue::Uint64(4_294_967_296)
        );
        assert_eq!(parse_number("2.5", false).unwrap().value(), &ItemValue::Double(2.5));
        assert!(parse_number("12ab", false).is_err());
        assert!(is_number("3"));
        assert!(is_number(".5"));
        assert!(!is_number("a3"));
    }
}
