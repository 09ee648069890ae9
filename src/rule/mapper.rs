//! Ingestion mapper: JSON payload to a typed row

use super::compiler::RuleSet;
use crate::schema::{FieldKind, Value};
use crate::sql::insert_statement;
use crate::{Error, Result};

use chrono::{DateTime, Utc};

/// One event mapped onto its physical table
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub table: String,
    pub stable: String,
    /// Index-aligned with the rule's declared tags
    pub tags: Vec<Value>,
    /// Index-aligned with the rule's declared columns; `columns[0]` is `ts`
    pub columns: Vec<Value>,
}

impl Row {
    /// `INSERT INTO <table> USING <stable> TAGS (..) VALUES (..)`
    pub fn to_insert_sql(&self) -> String {
        insert_statement(&self.table, &self.stable, &self.tags, &self.columns)
    }
}

impl RuleSet {
    /// Map a payload using the topic's rule.
    ///
    /// Returns `Ok(None)` when no rule is registered for `topic`.
    pub fn parse(&self, topic: &str, payload: &[u8]) -> Result<Option<Row>> {
        self.parse_at(topic, payload, Utc::now())
    }

    /// Same as [`RuleSet::parse`] with an explicit substitute for a missing
    /// timestamp.
    pub fn parse_at(&self, topic: &str, payload: &[u8], now: DateTime<Utc>) -> Result<Option<Row>> {
        let Some(rule) = self.get(topic) else {
            return Ok(None);
        };
        let document: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| Error::mapping(topic, format!("payload is not valid JSON: {}", e)))?;

        // A resolved path never falls back to the default, even when null.
        let table = match rule.table_path.get(&document) {
            Some(serde_json::Value::String(s)) => format!("_{}", s),
            Some(serde_json::Value::Null) => "_".to_string(),
            Some(other) => format!("_{}", other),
            None => rule.table_default.clone(),
        };

        let mut tags = vec![Value::Null; rule.tag_count];
        let mut columns = vec![Value::Null; rule.column_count];
        for field in rule.fields() {
            let value = match field.path.get(&document).filter(|v| !v.is_null()) {
                Some(found) => field.convert(found).map_err(|reason| {
                    Error::mapping(topic, format!("field '{}': {}", field.name, reason))
                })?,
                None if field.is_timestamp() => Value::Timestamp(now),
                None => field.default.clone(),
            };
            match field.kind {
                FieldKind::Column => columns[field.index] = value,
                FieldKind::Tag => tags[field.index] = value,
            }
        }

        Ok(Some(Row {
            table,
            stable: rule.stable.clone(),
            tags,
            columns,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{FieldSpec, Rule, RuleConfig, TableNameSpec};
    use serde_json::json;

    fn rules() -> RuleSet {
        RuleSet::compile(vec![
            RuleConfig {
                rule_name: String::new(),
                topic: "sensors/data".to_string(),
                rule: Rule {
                    s_table: "sensors".to_string(),
                    tags: vec![FieldSpec::new("device", "string", "$.id")],
                    columns: vec![
                        FieldSpec::new("ts", "timeSecond", "$.ts"),
                        FieldSpec::new("temperature", "float", "$.temp"),
                    ],
                    table: TableNameSpec {
                        default_value: "unknown".to_string(),
                        path: "$.id".to_string(),
                    },
                },
            },
            RuleConfig {
                rule_name: String::new(),
                topic: "meters/raw".to_string(),
                rule: Rule {
                    s_table: "meters".to_string(),
                    tags: vec![
                        FieldSpec::new("site", "string", "meta.site").with_default(json!("none")),
                        FieldSpec::new("group_id", "int", "meta.group"),
                    ],
                    columns: vec![
                        FieldSpec::new("ts", "timeString", "$.at")
                            .with_layout("%Y-%m-%d %H:%M:%S")
                            .with_default(json!("2000-01-01 00:00:00")),
                        FieldSpec::new("current", "float", "$.readings[0]"),
                        FieldSpec::new("ok", "bool", "$.ok").with_default(json!(true)),
                    ],
                    table: TableNameSpec {
                        default_value: "m_default".to_string(),
                        path: "meta.serial".to_string(),
                    },
                },
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_maps_sensor_event() {
        let row = rules()
            .parse("sensors/data", br#"{"id":"dev1","temp":23.5,"ts":1700000000}"#)
            .unwrap()
            .unwrap();
        assert_eq!(row.table, "_dev1");
        assert_eq!(row.stable, "sensors");
        assert_eq!(row.tags, vec![Value::String("dev1".into())]);
        assert_eq!(
            row.columns,
            vec![
                Value::Timestamp(DateTime::from_timestamp(1_700_000_000, 0).unwrap()),
                Value::Float(23.5)
            ]
        );
    }

    #[test]
    fn test_missing_table_path_uses_default_verbatim() {
        let row = rules()
            .parse("sensors/data", br#"{"temp":23.5,"ts":1700000000}"#)
            .unwrap()
            .unwrap();
        assert_eq!(row.table, "unknown");
        assert_eq!(row.tags, vec![Value::Null]);
    }

    #[test]
    fn test_empty_table_value_still_prefixed() {
        let row = rules()
            .parse("sensors/data", br#"{"id":"","ts":1700000000}"#)
            .unwrap()
            .unwrap();
        assert_eq!(row.table, "_");
    }

    #[test]
    fn test_numeric_table_value_uses_literal_text() {
        let row = rules()
            .parse("meters/raw", br#"{"meta":{"serial":42},"at":"2023-01-01 00:00:00"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(row.table, "_42");
    }

    #[test]
    fn test_unknown_topic_is_silent() {
        assert!(rules().parse("other", b"not even json").unwrap().is_none());
    }

    #[test]
    fn test_missing_ts_uses_now_not_default() {
        let now = DateTime::from_timestamp(1_650_000_000, 0).unwrap();
        let row = rules()
            .parse_at("meters/raw", br#"{"readings":[1.25]}"#, now)
            .unwrap()
            .unwrap();
        assert_eq!(row.columns[0], Value::Timestamp(now));
        assert_eq!(row.columns[1], Value::Float(1.25));
        assert_eq!(row.columns[2], Value::Bool(true));
        assert_eq!(row.tags, vec![Value::String("none".into()), Value::Null]);
        assert_eq!(row.table, "m_default");
    }

    #[test]
    fn test_null_is_treated_as_absent() {
        let now = DateTime::from_timestamp(1_650_000_000, 0).unwrap();
        let row = rules()
            .parse_at("meters/raw", br#"{"at":null,"ok":null}"#, now)
            .unwrap()
            .unwrap();
        assert_eq!(row.columns[0], Value::Timestamp(now));
        assert_eq!(row.columns[2], Value::Bool(true));
    }

    #[test]
    fn test_null_table_path_still_resolves() {
        let row = rules()
            .parse("sensors/data", br#"{"id":null,"temp":1.5,"ts":1700000000}"#)
            .unwrap()
            .unwrap();
        assert_eq!(row.table, "_");
        assert_eq!(row.tags, vec![Value::Null]);
    }

    #[test]
    fn test_bad_time_string_fails_whole_event() {
        let err = rules()
            .parse("meters/raw", br#"{"at":"yesterday","readings":[1.0]}"#)
            .unwrap_err();
        match err {
            Error::Mapping { topic, reason } => {
                assert_eq!(topic, "meters/raw");
                assert!(reason.contains("ts"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_invalid_json_is_mapping_error() {
        assert!(matches!(
            rules().parse("sensors/data", b"{"),
            Err(Error::Mapping { .. })
        ));
    }

    #[test]
    fn test_row_to_insert_sql() {
        let row = rules()
            .parse(
                "meters/raw",
                br#"{"meta":{"site":"o'hare","group":3,"serial":"m1"},"at":"2023-01-01 00:00:00","readings":[2.5],"ok":false}"#,
            )
            .unwrap()
            .unwrap();
        assert_eq!(
            row.to_insert_sql(),
            r"INSERT INTO _m1 USING meters TAGS ('o\'hare',3) VALUES ('2023-01-01T00:00:00Z',2.500000,false)"
        );
    }
}
