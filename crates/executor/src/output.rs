//! Text output of a SELECT.

use itemsql_storage::ItemData;

/// Label of one output column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputColumn {
    pub schema: String,
    /// Table name; empty for computed columns.
    pub table: String,
    pub table_alias: String,
    pub column: String,
    /// Name the column is reported under: the `AS` alias, the column name,
    /// or the formula text.
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectOutput {
    pub columns: Vec<OutputColumn>,
    pub rows: Vec<Vec<String>>,
}

impl SelectOutput {
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn aliases(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.alias.as_str()).collect()
    }
}

pub(crate) fn item_text(item: &ItemData, null_text: &str) -> String {
    if item.is_null() {
        null_text.to_string()
    } else {
        item.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemsql_storage::{ItemType, ITEM_ID_ANONY};

    #[test]
    fn null_uses_configured_text() {
        assert_eq!(item_text(&ItemData::null(ITEM_ID_ANONY, ItemType::Int), "-"), "-");
        assert_eq!(item_text(&ItemData::double(ITEM_ID_ANONY, 2.5), "-"), "2.5");
        assert_eq!(item_text(&ItemData::string(ITEM_ID_ANONY, "web"), "-"), "web");
    }
}
