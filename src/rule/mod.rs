//! Topic rules: schema descriptions that map JSON events to supertable rows
//!
//! A rule file is a JSON array of [`RuleConfig`] entries. Rules are compiled
//! once into an immutable [`RuleSet`] which is then shared by reference for
//! concurrent, lock-free lookups on the ingestion path.
//!
//! ```json
//! [{
//!   "rule_name": "sensor readings",
//!   "topic": "sensors/data",
//!   "rule": {
//!     "s_table": "sensors",
//!     "tags": [{"name": "device", "value_type": "string", "length": 16, "path": "$.id"}],
//!     "columns": [
//!       {"name": "ts", "value_type": "timeSecond", "path": "$.ts"},
//!       {"name": "temperature", "value_type": "float", "path": "$.temp"}
//!     ],
//!     "table": {"default_value": "unknown", "path": "$.id"}
//!   }
//! }]
//! ```

mod compiler;
mod json_path;
mod mapper;

pub use compiler::{CompiledRule, FieldDescriptor, RuleSet};
pub use json_path::JsonPath;
pub use mapper::Row;

use serde::{Deserialize, Serialize};

/// One entry of the rule file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub rule_name: String,
    pub topic: String,
    pub rule: Rule,
}

/// Schema description for one topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Owning supertable
    pub s_table: String,
    #[serde(default)]
    pub tags: Vec<FieldSpec>,
    /// Ordered columns; index 0 must be the `ts` time column
    #[serde(default)]
    pub columns: Vec<FieldSpec>,
    #[serde(default)]
    pub table: TableNameSpec,
}

/// How the physical table name is derived from an event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableNameSpec {
    /// Used verbatim when `path` does not resolve
    #[serde(default)]
    pub default_value: String,
    #[serde(default)]
    pub path: String,
}

/// Declared tag or column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub value_type: String,
    /// Width of fixed-width string columns
    #[serde(default)]
    pub length: usize,
    #[serde(default)]
    pub default_value: serde_json::Value,
    #[serde(default)]
    pub path: String,
    /// Layout for `timeString` fields
    #[serde(default)]
    pub time_layout: String,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, value_type: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_type: value_type.into(),
            length: 0,
            default_value: serde_json::Value::Null,
            path: path.into(),
            time_layout: String::new(),
        }
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    pub fn with_default(mut self, default_value: serde_json::Value) -> Self {
        self.default_value = default_value;
        self
    }

    pub fn with_layout(mut self, layout: impl Into<String>) -> Self {
        self.time_layout = layout.into();
        self
    }
}
