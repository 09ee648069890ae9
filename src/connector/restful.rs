//! Decoding of the store's REST response envelope
//!
//! The REST endpoint answers every statement with a JSON envelope:
//! `{status, head, column_meta, data, rows, code, desc}`. Cells arrive as
//! untyped JSON; `column_meta` carries `[name, type_code, length]` per column
//! and decides how each cell is typed.

use super::StoreResponse;
use crate::schema::Value;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Layout of timestamp cells returned by the REST endpoint
pub const REST_TIME_LAYOUT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

const STATUS_OK: &str = "succ";

const TYPE_BOOL: i64 = 1;
const TYPE_TINYINT: i64 = 2;
const TYPE_BIGINT: i64 = 5;
const TYPE_FLOAT: i64 = 6;
const TYPE_DOUBLE: i64 = 7;
const TYPE_TIMESTAMP: i64 = 9;
const TYPE_UTINYINT: i64 = 11;
const TYPE_UBIGINT: i64 = 14;

/// Raw REST response body
#[derive(Debug, Clone, Deserialize)]
pub struct RestfulEnvelope {
    pub status: String,
    #[serde(default)]
    pub head: Vec<String>,
    #[serde(default)]
    pub column_meta: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    pub data: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    pub rows: i64,
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub desc: String,
}

impl RestfulEnvelope {
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Convert into a typed [`StoreResponse`], or the store error it reports.
    pub fn into_response(self) -> Result<StoreResponse> {
        if self.status != STATUS_OK {
            if self.desc.is_empty() {
                return Err(Error::Query(format!(
                    "store answered with status '{}' and no description",
                    self.status
                )));
            }
            return Err(Error::Store {
                code: self.code,
                desc: self.desc,
            });
        }

        let mut head = Vec::with_capacity(self.column_meta.len());
        let mut types = Vec::with_capacity(self.column_meta.len());
        for (idx, meta) in self.column_meta.iter().enumerate() {
            let name = meta.first().and_then(|v| v.as_str()).ok_or_else(|| {
                Error::Query(format!("column_meta[{}] has no column name", idx))
            })?;
            let type_code = meta.get(1).and_then(|v| v.as_i64()).ok_or_else(|| {
                Error::Query(format!("column_meta[{}] has no type code", idx))
            })?;
            head.push(name.to_string());
            types.push(type_code);
        }
        if head.is_empty() {
            head = self.head;
        }

        let mut rows = Vec::with_capacity(self.data.len());
        for raw_row in &self.data {
            let mut row = Vec::with_capacity(raw_row.len());
            for (idx, cell) in raw_row.iter().enumerate() {
                row.push(decode_cell(cell, types.get(idx).copied())?);
            }
            rows.push(row);
        }

        Ok(StoreResponse {
            head,
            rows,
            row_count: self.rows,
        })
    }
}

fn decode_cell(cell: &serde_json::Value, type_code: Option<i64>) -> Result<Value> {
    if cell.is_null() {
        return Ok(Value::Null);
    }
    let Some(type_code) = type_code else {
        return Ok(Value::from_json(cell));
    };
    let value = match (type_code, cell) {
        (TYPE_TIMESTAMP, serde_json::Value::String(raw)) => {
            let t = DateTime::parse_from_str(raw, REST_TIME_LAYOUT)
                .map_err(|e| Error::Query(format!("invalid timestamp cell '{}': {}", raw, e)))?;
            Value::Timestamp(t.with_timezone(&Utc))
        }
        (TYPE_BOOL, serde_json::Value::Number(n)) => {
            Value::Bool(n.as_f64().map(|f| f as i64 == 1).unwrap_or(false))
        }
        (TYPE_TINYINT..=TYPE_BIGINT | TYPE_UTINYINT..=TYPE_UBIGINT, serde_json::Value::Number(n)) => {
            Value::Int(n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or_default())
        }
        (TYPE_FLOAT | TYPE_DOUBLE, serde_json::Value::Number(n)) => {
            Value::Float(n.as_f64().unwrap_or(f64::NAN))
        }
        (_, other) => Value::from_json(other),
    };
    Ok(value)
}
