//! SQL text rendering
//!
//! The store only speaks SQL text, so every statement is built as a string.
//! Values are rendered as escaped literals. Identifiers (table, column and
//! tag names) are written verbatim and must be validated by the caller; the
//! rule compiler does this for supertable names.

mod ddl;
mod select;

pub use ddl::{create_stable, AlterAction, AlterStatement, AlterTarget, TableKind};
pub(crate) use select::identifier_re;
pub use select::{plan_select, SelectParams, DEFAULT_FILL};

use crate::schema::{format_timestamp, Value};

/// Backslash-escape quote characters and backslashes in a string literal body.
pub fn escape_string(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len() + 2);
    for c in raw.chars() {
        if matches!(c, '\'' | '"' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Render a cell as a SQL literal.
pub fn render_literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format!("{:.6}", f),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => format!("'{}'", escape_string(s)),
        Value::Timestamp(t) => format!("'{}'", format_timestamp(t)),
    }
}

/// Comma-separated literals, no padding.
pub fn render_values(values: &[Value]) -> String {
    values
        .iter()
        .map(render_literal)
        .collect::<Vec<_>>()
        .join(",")
}

/// `INSERT INTO <table> USING <stable> TAGS (<tags>) VALUES (<columns>)`
pub fn insert_statement(table: &str, stable: &str, tags: &[Value], columns: &[Value]) -> String {
    format!(
        "INSERT INTO {} USING {} TAGS ({}) VALUES ({})",
        table,
        stable,
        render_values(tags),
        render_values(columns)
    )
}

/// Multi-row insert with pre-rendered tag and value lists.
pub fn insert_rows_statement(table: &str, stable: &str, tags: &str, rows: &[String]) -> String {
    let mut sql = format!("INSERT INTO {} USING {} TAGS ({}) VALUES", table, stable, tags);
    for row in rows {
        sql.push_str(" (");
        sql.push_str(row);
        sql.push(')');
    }
    sql
}
