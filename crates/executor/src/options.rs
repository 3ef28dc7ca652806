/// Per-statement execution switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOptions {
    /// Sort selected rows by ORDER BY before grouping.
    pub apply_order_by: bool,
    /// Apply LIMIT/OFFSET to the serialized rows.
    pub enforce_limit: bool,
    /// Text emitted for NULL values.
    pub null_text: String,
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self {
            apply_order_by: false,
            enforce_limit: false,
            null_text: "NULL".to_string(),
        }
    }
}
