//! Processor configuration.
//!
//! Every field has a default, so a JSON document only needs the settings it
//! changes:
//!
//! ```ignore
//! let config = ProcessorConfig::from_json_str(r#"{ "enforce_limit": true }"#)?;
//! ```

use itemsql_executor::SelectOptions;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Sort rows by ORDER BY before grouping (default: false)
    #[serde(default = "default_apply_order_by")]
    pub apply_order_by: bool,

    /// Apply LIMIT/OFFSET to the output rows (default: false)
    #[serde(default = "default_enforce_limit")]
    pub enforce_limit: bool,

    /// Text printed for NULL values (default: "NULL")
    #[serde(default = "default_null_text")]
    pub null_text: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            apply_order_by: default_apply_order_by(),
            enforce_limit: default_enforce_limit(),
            null_text: default_null_text(),
        }
    }
}

fn default_apply_order_by() -> bool {
    false
}

fn default_enforce_limit() -> bool {
    false
}

fn default_null_text() -> String {
    "NULL".to_string()
}

impl ProcessorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn select_options(&self) -> SelectOptions {
        SelectOptions::from(self)
    }
}

impl From<&ProcessorConfig> for SelectOptions {
    fn from(config: &ProcessorConfig) -> Self {
        SelectOptions {
            apply_order_by: config.apply_order_by,
            enforce_limit: config.enforce_limit,
            null_text: config.null_text.clone(),
        }
    }
}
