//! Query planner: logical query parameters to SELECT text

use crate::schema::{format_timestamp, Value, TIMESTAMP_COLUMN};
use crate::{Error, Result};

use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use super::render_literal;

/// Fill policy used when an interval is requested without one
pub const DEFAULT_FILL: &str = "none";

/// Parameters of a single SELECT against one table or tag group
#[derive(Debug, Clone, Default)]
pub struct SelectParams<'a> {
    /// Fully qualified table name
    pub table: &'a str,
    /// Aggregation function applied to every column, empty for raw rows
    pub aggregation: &'a str,
    pub columns: &'a [String],
    /// Tag equality filter
    pub tags: Option<&'a BTreeMap<String, Value>>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Downsampling window, e.g. `10m`
    pub interval: &'a str,
    pub fill: &'a str,
    pub limit: usize,
    pub offset: usize,
}

pub(crate) fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"))
}

fn interval_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]+[a-zA-Z]{1,2}$").expect("valid interval regex"))
}

fn fill_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z]+(\s*,\s*-?[0-9]+(\.[0-9]+)?)*$").expect("valid fill regex")
    })
}

/// Render a SELECT statement.
///
/// Fails when an interval is requested without an aggregation function, or
/// when any verbatim token is not a plain identifier.
pub fn plan_select(params: &SelectParams<'_>) -> Result<String> {
    if !params.interval.is_empty() && params.aggregation.is_empty() {
        return Err(Error::Planning(format!(
            "interval '{}' on {} requires an aggregation function",
            params.interval, params.table
        )));
    }
    if params.columns.is_empty() {
        return Err(Error::Planning(format!(
            "no columns requested for {}",
            params.table
        )));
    }
    for column in params.columns {
        if column != "*" && !identifier_re().is_match(column) {
            return Err(Error::Planning(format!("invalid column name '{}'", column)));
        }
    }
    if !params.aggregation.is_empty() && !identifier_re().is_match(params.aggregation) {
        return Err(Error::Planning(format!(
            "invalid aggregation function '{}'",
            params.aggregation
        )));
    }

    let columns = if params.aggregation.is_empty() {
        params.columns.join(", ")
    } else {
        params
            .columns
            .iter()
            .map(|c| format!("{}({}) AS {}", params.aggregation, c, c))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut sql = format!("SELECT {} FROM {}", columns, params.table);

    let mut conditions = Vec::new();
    if let Some(start) = &params.start {
        conditions.push(format!("{} >= '{}'", TIMESTAMP_COLUMN, format_timestamp(start)));
    }
    if let Some(end) = &params.end {
        conditions.push(format!("{} <= '{}'", TIMESTAMP_COLUMN, format_timestamp(end)));
    }
    if let Some(tags) = params.tags {
        for (tag, value) in tags {
            if !identifier_re().is_match(tag) {
                return Err(Error::Planning(format!("invalid tag name '{}'", tag)));
            }
            conditions.push(format!("{} = {}", tag, render_literal(value)));
        }
    }
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    if !params.interval.is_empty() {
        if !interval_re().is_match(params.interval) {
            return Err(Error::Planning(format!(
                "invalid interval '{}'",
                params.interval
            )));
        }
        let fill = if params.fill.is_empty() {
            DEFAULT_FILL
        } else {
            params.fill
        };
        if !fill_re().is_match(fill) {
            return Err(Error::Planning(format!("invalid fill policy '{}'", fill)));
        }
        sql.push_str(&format!(" INTERVAL({}) FILL({})", params.interval, fill));
    }

    if params.limit > 0 {
        sql.push_str(&format!(" LIMIT {}", params.limit));
    }
    if params.offset > 0 {
        sql.push_str(&format!(" OFFSET {}", params.offset));
    }
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_raw_select_without_filters() {
        let columns = cols(&["colA", "colB"]);
        let sql = plan_select(&SelectParams {
            table: "db.t",
            columns: &columns,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(sql, "SELECT colA, colB FROM db.t");
    }

    #[test]
    fn test_full_select() {
        let columns = cols(&["colA"]);
        let mut tags = BTreeMap::new();
        tags.insert("tagA".to_string(), Value::String("v1".into()));
        let start = DateTime::from_timestamp(1_672_531_200, 0).unwrap();
        let end = DateTime::from_timestamp(1_672_534_800, 0).unwrap();
        let sql = plan_select(&SelectParams {
            table: "db.t",
            aggregation: "avg",
            columns: &columns,
            tags: Some(&tags),
            start: Some(start),
            end: Some(end),
            interval: "10m",
            fill: "",
            limit: 100,
            offset: 0,
        })
        .unwrap();
        assert_eq!(
            sql,
            "SELECT avg(colA) AS colA FROM db.t WHERE ts >= '2023-01-01T00:00:00Z' \
             AND ts <= '2023-01-01T01:00:00Z' AND tagA = 'v1' INTERVAL(10m) FILL(none) LIMIT 100"
        );
    }

    #[test]
    fn test_interval_without_aggregation_fails() {
        let columns = cols(&["colA"]);
        let err = plan_select(&SelectParams {
            table: "db.t",
            columns: &columns,
            interval: "1m",
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, Error::Planning(_)));
    }

    #[test]
    fn test_explicit_fill_is_kept() {
        let columns = cols(&["v"]);
        let sql = plan_select(&SelectParams {
            table: "db.t",
            aggregation: "max",
            columns: &columns,
            interval: "1h",
            fill: "prev",
            ..Default::default()
        })
        .unwrap();
        assert!(sql.ends_with("INTERVAL(1h) FILL(prev)"));

        let sql = plan_select(&SelectParams {
            table: "db.t",
            aggregation: "max",
            columns: &columns,
            interval: "1h",
            fill: "value, 0",
            ..Default::default()
        })
        .unwrap();
        assert!(sql.ends_with("FILL(value, 0)"));
    }

    #[test]
    fn test_only_end_bound_and_non_string_tag() {
        let columns = cols(&["v"]);
        let mut tags = BTreeMap::new();
        tags.insert("group_id".to_string(), Value::Int(3));
        tags.insert("active".to_string(), Value::Bool(true));
        let end = DateTime::from_timestamp(1_672_531_200, 0).unwrap();
        let sql = plan_select(&SelectParams {
            table: "db.st",
            columns: &columns,
            tags: Some(&tags),
            end: Some(end),
            offset: 20,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            sql,
            "SELECT v FROM db.st WHERE ts <= '2023-01-01T00:00:00Z' AND active = true AND group_id = 3 OFFSET 20"
        );
    }

    #[test]
    fn test_tag_value_is_escaped() {
        let columns = cols(&["v"]);
        let mut tags = BTreeMap::new();
        tags.insert("site".to_string(), Value::String("x' OR '1'='1".into()));
        let sql = plan_select(&SelectParams {
            table: "db.st",
            columns: &columns,
            tags: Some(&tags),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(sql, r"SELECT v FROM db.st WHERE site = 'x\' OR \'1\'=\'1'");
    }

    #[test]
    fn test_rejects_injected_tokens() {
        let columns = cols(&["v; DROP TABLE x"]);
        assert!(plan_select(&SelectParams {
            table: "db.t",
            columns: &columns,
            ..Default::default()
        })
        .is_err());

        let columns = cols(&["v"]);
        assert!(plan_select(&SelectParams {
            table: "db.t",
            aggregation: "avg",
            columns: &columns,
            interval: "1m) UNION",
            ..Default::default()
        })
        .is_err());
    }
}
