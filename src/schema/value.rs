//! Dynamically typed cells and declared value types
//!
//! Every value that flows between JSON events, generated SQL and store
//! responses is carried as a [`Value`]. Conversion from JSON is driven by the
//! field's declared [`ValueType`], never by inspecting the runtime JSON type.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A single dynamically typed cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Untyped conversion used for store responses and query tag filters.
    ///
    /// Arrays and objects keep their raw JSON text.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bool(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{}", s),
            Value::Timestamp(t) => write!(f, "{}", format_timestamp(t)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::String(s) => serializer.serialize_str(s),
            Value::Timestamp(t) => serializer.serialize_str(&format_timestamp(t)),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(Value::from_json(&json))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Timestamp(t)
    }
}

/// RFC3339 with as many fractional digits as needed, always in UTC (`Z`).
pub fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse a time string with a chrono `strftime` layout.
///
/// Layouts with an offset specifier are honoured; layouts without one are
/// read as UTC. A date-only layout yields midnight UTC.
pub fn parse_time(layout: &str, raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    if layout.eq_ignore_ascii_case("rfc3339") {
        return DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| format!("cannot parse '{}' as RFC3339: {}", raw, e));
    }
    if let Ok(t) = DateTime::parse_from_str(raw, layout) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(raw, layout) {
        return Ok(t.and_utc());
    }
    match NaiveDate::parse_from_str(raw, layout) {
        Ok(d) => Ok(d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()),
        Err(e) => Err(format!(
            "cannot parse '{}' with layout '{}': {}",
            raw, layout, e
        )),
    }
}

/// Declared value type of a rule field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Int,
    Double,
    Bool,
    String,
    /// Time given as text, parsed with the field's layout
    TimeString,
    TimeSecond,
    TimeMillisecond,
    TimeMicrosecond,
    TimeNanosecond,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Int => "int",
            ValueType::Double => "float",
            ValueType::Bool => "bool",
            ValueType::String => "string",
            ValueType::TimeString => "timeString",
            ValueType::TimeSecond => "timeSecond",
            ValueType::TimeMillisecond => "timeMillisecond",
            ValueType::TimeMicrosecond => "timeMicrosecond",
            ValueType::TimeNanosecond => "timeNanosecond",
        }
    }

    pub fn is_time(&self) -> bool {
        matches!(
            self,
            ValueType::TimeString
                | ValueType::TimeSecond
                | ValueType::TimeMillisecond
                | ValueType::TimeMicrosecond
                | ValueType::TimeNanosecond
        )
    }

    /// Store column type for this value type
    pub fn column_type(&self) -> &'static str {
        match self {
            ValueType::Int => "bigint",
            ValueType::Double => "double",
            ValueType::Bool => "bool",
            ValueType::String => "binary",
            ValueType::TimeString
            | ValueType::TimeSecond
            | ValueType::TimeMillisecond
            | ValueType::TimeMicrosecond
            | ValueType::TimeNanosecond => "timestamp",
        }
    }

    /// Convert a JSON value into a cell of this type.
    ///
    /// `layout` is only consulted for [`ValueType::TimeString`].
    pub fn convert(
        &self,
        json: &serde_json::Value,
        layout: Option<&str>,
    ) -> std::result::Result<Value, String> {
        if json.is_null() {
            return Ok(Value::Null);
        }
        match self {
            ValueType::Int => json_to_i64(json).map(Value::Int),
            ValueType::Double => json_to_f64(json).map(Value::Float),
            ValueType::Bool => json_to_bool(json).map(Value::Bool),
            ValueType::String => Ok(Value::String(json_to_string(json))),
            ValueType::TimeString => {
                let layout = layout.ok_or_else(|| "missing time layout".to_string())?;
                parse_time(layout, &json_to_string(json)).map(Value::Timestamp)
            }
            ValueType::TimeSecond => {
                let secs = json_to_i64(json)?;
                DateTime::from_timestamp(secs, 0)
                    .map(Value::Timestamp)
                    .ok_or_else(|| format!("{} seconds is out of range", secs))
            }
            ValueType::TimeMillisecond => {
                let millis = json_to_i64(json)?;
                DateTime::from_timestamp_millis(millis)
                    .map(Value::Timestamp)
                    .ok_or_else(|| format!("{} milliseconds is out of range", millis))
            }
            ValueType::TimeMicrosecond => {
                let micros = json_to_i64(json)?;
                DateTime::from_timestamp_micros(micros)
                    .map(Value::Timestamp)
                    .ok_or_else(|| format!("{} microseconds is out of range", micros))
            }
            ValueType::TimeNanosecond => {
                Ok(Value::Timestamp(DateTime::from_timestamp_nanos(json_to_i64(json)?)))
            }
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "int" => Ok(ValueType::Int),
            "float" => Ok(ValueType::Double),
            "bool" => Ok(ValueType::Bool),
            "string" => Ok(ValueType::String),
            "timeString" => Ok(ValueType::TimeString),
            "timeSecond" => Ok(ValueType::TimeSecond),
            "timeMillisecond" => Ok(ValueType::TimeMillisecond),
            "timeMicrosecond" => Ok(ValueType::TimeMicrosecond),
            "timeNanosecond" => Ok(ValueType::TimeNanosecond),
            other => Err(format!(
                "unknown value type '{}'; expected one of int, float, bool, string, \
                 timeString, timeSecond, timeMillisecond, timeMicrosecond, timeNanosecond",
                other
            )),
        }
    }
}

/// Whether a field is a tag or a column of its supertable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Tag,
    Column,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Tag => "tag",
            FieldKind::Column => "column",
        }
    }
}

fn json_to_i64(json: &serde_json::Value) -> std::result::Result<i64, String> {
    match json {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| format!("{} is not an integer", n)),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<i64>()
            .or_else(|_| s.trim().parse::<f64>().map(|f| f as i64))
            .map_err(|_| format!("'{}' is not an integer", s)),
        serde_json::Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(format!("{} is not an integer", other)),
    }
}

fn json_to_f64(json: &serde_json::Value) -> std::result::Result<f64, String> {
    match json {
        serde_json::Value::Number(n) => n.as_f64().ok_or_else(|| format!("{} is not a number", n)),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{}' is not a number", s)),
        serde_json::Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => Err(format!("{} is not a number", other)),
    }
}

fn json_to_bool(json: &serde_json::Value) -> std::result::Result<bool, String> {
    match json {
        serde_json::Value::Bool(b) => Ok(*b),
        serde_json::Value::Number(n) => Ok(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
        serde_json::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(format!("'{}' is not a boolean", s)),
        },
        other => Err(format!("{} is not a boolean", other)),
    }
}

fn json_to_string(json: &serde_json::Value) -> String {
    match json {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_type_round_trips_config_names() {
        for name in [
            "int",
            "float",
            "bool",
            "string",
            "timeString",
            "timeSecond",
            "timeMillisecond",
            "timeMicrosecond",
            "timeNanosecond",
        ] {
            let vt: ValueType = name.parse().unwrap();
            assert_eq!(vt.as_str(), name);
        }
        assert!("double".parse::<ValueType>().is_err());
    }

    #[test]
    fn test_time_scales() {
        let secs = ValueType::TimeSecond.convert(&json!(1_700_000_000), None).unwrap();
        let millis = ValueType::TimeMillisecond
            .convert(&json!(1_700_000_000_000i64), None)
            .unwrap();
        let micros = ValueType::TimeMicrosecond
            .convert(&json!(1_700_000_000_000_000i64), None)
            .unwrap();
        let nanos = ValueType::TimeNanosecond
            .convert(&json!(1_700_000_000_000_000_000i64), None)
            .unwrap();
        assert_eq!(secs, millis);
        assert_eq!(millis, micros);
        assert_eq!(micros, nanos);
        assert_eq!(
            format_timestamp(&secs.as_timestamp().unwrap()),
            "2023-11-14T22:13:20Z"
        );
    }

    #[test]
    fn test_column_types() {
        let scalar = [
            (ValueType::Int, "bigint"),
            (ValueType::Double, "double"),
            (ValueType::Bool, "bool"),
            (ValueType::String, "binary"),
        ];
        for (vt, expected) in scalar {
            assert!(!vt.is_time());
            assert_eq!(vt.column_type(), expected);
        }
        for name in [
            "timeString",
            "timeSecond",
            "timeMillisecond",
            "timeMicrosecond",
            "timeNanosecond",
        ] {
            let vt: ValueType = name.parse().unwrap();
            assert!(vt.is_time());
            assert_eq!(vt.column_type(), "timestamp");
        }
    }

    #[test]
    fn test_time_string_with_layout() {
        let v = ValueType::TimeString
            .convert(&json!("2023-01-02 03:04:05"), Some("%Y-%m-%d %H:%M:%S"))
            .unwrap();
        assert_eq!(
            format_timestamp(&v.as_timestamp().unwrap()),
            "2023-01-02T03:04:05Z"
        );

        let err = ValueType::TimeString
            .convert(&json!("yesterday"), Some("%Y-%m-%d %H:%M:%S"))
            .unwrap_err();
        assert!(err.contains("yesterday"));
    }

    #[test]
    fn test_time_string_with_offset_normalizes_to_utc() {
        let v = ValueType::TimeString
            .convert(&json!("2023-01-02T03:04:05+0200"), Some("%Y-%m-%dT%H:%M:%S%z"))
            .unwrap();
        assert_eq!(
            format_timestamp(&v.as_timestamp().unwrap()),
            "2023-01-02T01:04:05Z"
        );
    }

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(ValueType::Int.convert(&json!("42"), None).unwrap(), Value::Int(42));
        assert_eq!(ValueType::Int.convert(&json!(7.9), None).unwrap(), Value::Int(7));
        assert_eq!(
            ValueType::Double.convert(&json!(3), None).unwrap(),
            Value::Float(3.0)
        );
        assert_eq!(
            ValueType::Bool.convert(&json!("true"), None).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            ValueType::String.convert(&json!(12.5), None).unwrap(),
            Value::String("12.5".to_string())
        );
        assert!(ValueType::Int.convert(&json!("abc"), None).is_err());
        assert_eq!(ValueType::Int.convert(&json!(null), None).unwrap(), Value::Null);
    }

    #[test]
    fn test_value_serializes_timestamp_as_rfc3339() {
        let t = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let text = serde_json::to_string(&Value::Timestamp(t)).unwrap();
        assert_eq!(text, "\"2023-11-14T22:13:20Z\"");
    }

    #[test]
    fn test_value_deserializes_untyped_json() {
        let v: Vec<Value> = serde_json::from_str(r#"[1, 2.5, "a", true, null]"#).unwrap();
        assert_eq!(
            v,
            vec![
                Value::Int(1),
                Value::Float(2.5),
                Value::String("a".to_string()),
                Value::Bool(true),
                Value::Null
            ]
        );
    }
}
