//! Read path for stablebridge
//!
//! A [`QueryRequest`] names many tables (and, for supertables, many tag
//! groups). The [`Executor`] plans one SELECT per table or tag group, runs
//! them concurrently on the shared worker pool and merges the marshalled
//! results into a single [`QueryResponse`], or returns the first error.

mod catalog;
mod executor;
mod marshal;
mod telemetry;

pub use catalog::{StableSummary, TableSummary};
pub use executor::Executor;
pub use marshal::{convert_rows, partition_bounds, ResultMarshaller};

use crate::schema::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Tag name to required value
pub type TagGroup = BTreeMap<String, Value>;

/// Per-table part of a logical query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableQuery {
    #[serde(default, alias = "column_list")]
    pub columns: Vec<String>,
    /// One query is issued per tag group; empty for plain tables
    #[serde(default)]
    pub tags: Vec<TagGroup>,
}

impl TableQuery {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            tags: Vec::new(),
        }
    }

    pub fn with_tag_group(mut self, group: TagGroup) -> Self {
        self.tags.push(group);
        self
    }
}

/// Logical multi-table query
///
/// Aggregation, time range, interval, fill, limit and offset apply to every
/// table entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub tables: HashMap<String, TableQuery>,
    #[serde(default)]
    pub aggregation: String,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub interval: String,
    #[serde(default)]
    pub fill: String,
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl QueryRequest {
    pub fn table(mut self, name: impl Into<String>, query: TableQuery) -> Self {
        self.tables.insert(name.into(), query);
        self
    }
}

/// One sample of a column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataItem {
    pub time: DateTime<Utc>,
    pub value: Value,
}

/// Samples of one column of one table or tag group, in source row order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<TagGroup>,
    pub column: String,
    pub values: Vec<DataItem>,
}

/// Merged results of a logical query
///
/// Results are keyed by table, tag group and column; their position carries
/// no meaning.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResponse {
    pub results: Vec<QueryResult>,
}

impl QueryResponse {
    /// Result for `table` / `column`, optionally restricted to a tag group
    pub fn find(&self, table: &str, tags: Option<&TagGroup>, column: &str) -> Option<&QueryResult> {
        self.results.iter().find(|r| {
            r.table == table && r.column == column && (tags.is_none() || r.tags.as_ref() == tags)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
