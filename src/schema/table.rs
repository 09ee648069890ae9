//! Table layout descriptors and `DESCRIBE` output parsing

use super::value::Value;
use crate::connector::StoreResponse;
use crate::{Error, Result};

/// Column or tag definition as the store sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    /// Store type name, e.g. `bigint`, `binary`, `timestamp`
    pub data_type: String,
    /// Width for fixed-width string types, ignored otherwise
    pub length: usize,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, length: usize) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            length,
        }
    }

    /// The reserved primary timestamp column
    pub fn timestamp() -> Self {
        Self::new("ts", "timestamp", 0)
    }

    /// Whether the store type carries an explicit width
    pub fn is_sized(&self) -> bool {
        self.data_type.eq_ignore_ascii_case("binary") || self.data_type.eq_ignore_ascii_case("nchar")
    }

    /// `name type` or `name type(length)` for fixed-width strings
    pub fn column_spec(&self) -> String {
        if self.is_sized() {
            format!("{} {}({})", self.name, self.data_type, self.length)
        } else {
            format!("{} {}", self.name, self.data_type)
        }
    }
}

/// Ordered fields and tags of a table or supertable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableInfo {
    pub fields: Vec<FieldInfo>,
    pub tags: Vec<FieldInfo>,
}

impl TableInfo {
    /// Build from a `DESCRIBE <table>` response.
    ///
    /// Rows whose `Note` is `TAG` are tags; every other row is a field.
    pub fn from_describe(response: &StoreResponse) -> Result<Self> {
        let field_idx = response.column_index("Field")?;
        let type_idx = response.column_index("Type")?;
        let length_idx = response.column_index("Length")?;
        let note_idx = response.column_index("Note")?;

        let mut info = TableInfo::default();
        for (row_no, row) in response.rows.iter().enumerate() {
            let cell = |idx: usize| {
                row.get(idx).ok_or_else(|| {
                    Error::Query(format!("describe row {} has only {} cells", row_no, row.len()))
                })
            };
            let name = cell(field_idx)?
                .as_str()
                .ok_or_else(|| Error::Query(format!("describe row {}: Field is not text", row_no)))?
                .to_string();
            let data_type = cell(type_idx)?
                .as_str()
                .ok_or_else(|| Error::Query(format!("describe row {}: Type is not text", row_no)))?
                .to_string();
            let length = match cell(length_idx)? {
                Value::Int(n) if *n >= 0 => *n as usize,
                Value::Null => 0,
                other => {
                    return Err(Error::Query(format!(
                        "describe row {}: invalid Length {:?}",
                        row_no, other
                    )))
                }
            };
            let field = FieldInfo {
                name,
                data_type,
                length,
            };
            if matches!(cell(note_idx)?, Value::String(note) if note == "TAG") {
                info.tags.push(field);
            } else {
                info.fields.push(field);
            }
        }
        Ok(info)
    }
}
