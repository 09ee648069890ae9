//! Schema primitives shared by the write and read paths
//!
//! Values are carried as a closed tagged variant so conversion and SQL
//! rendering are exhaustive over the declared value types.

mod table;
mod value;

pub use table::{FieldInfo, TableInfo};
pub use value::{format_timestamp, parse_time, FieldKind, Value, ValueType};

/// Name of the mandatory primary timestamp column
pub const TIMESTAMP_COLUMN: &str = "ts";
