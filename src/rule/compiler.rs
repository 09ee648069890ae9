//! Rule validation and compilation

use super::json_path::JsonPath;
use super::{FieldSpec, RuleConfig};
use crate::schema::{FieldInfo, FieldKind, Value, ValueType, TIMESTAMP_COLUMN};
use crate::sql::{create_stable, identifier_re};
use crate::{Error, Result};

use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Fully resolved tag or column of a compiled rule
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    /// Position within the tag list or the column list
    pub index: usize,
    pub value_type: ValueType,
    pub kind: FieldKind,
    /// Width of fixed-width string fields
    pub length: usize,
    /// Default already coerced to `value_type`
    pub default: Value,
    pub time_layout: Option<String>,
    pub path: JsonPath,
}

impl FieldDescriptor {
    /// Whether this is the reserved timestamp column.
    pub fn is_timestamp(&self) -> bool {
        self.kind == FieldKind::Column && self.index == 0
    }

    pub fn convert(&self, json: &serde_json::Value) -> std::result::Result<Value, String> {
        self.value_type.convert(json, self.time_layout.as_deref())
    }
}

/// Immutable, validated form of one topic's rule
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule_name: String,
    pub topic: String,
    pub stable: String,
    pub tag_count: usize,
    pub column_count: usize,
    pub(crate) table_default: String,
    pub(crate) table_path: JsonPath,
    pub(crate) fields: Vec<FieldDescriptor>,
    by_path: HashMap<String, usize>,
}

impl CompiledRule {
    fn compile(config: &RuleConfig) -> Result<Self> {
        let topic = config.topic.as_str();
        let rule = &config.rule;

        if rule.tags.is_empty() {
            return Err(Error::invalid_rule(topic, "tags could not be empty"));
        }
        if rule.columns.len() < 2 {
            return Err(Error::invalid_rule(
                topic,
                "must contain at least two columns",
            ));
        }
        if rule.columns[0].name != TIMESTAMP_COLUMN {
            return Err(Error::invalid_rule(
                topic,
                format!("first column must be named '{}'", TIMESTAMP_COLUMN),
            ));
        }
        if rule.s_table.is_empty() {
            return Err(Error::invalid_rule(topic, "supertable name could not be empty"));
        }
        if !identifier_re().is_match(&rule.s_table) {
            return Err(Error::invalid_rule(
                topic,
                format!("supertable name '{}' contains an illegal character", rule.s_table),
            ));
        }

        let ts_type = parse_value_type(topic, &rule.columns[0])?;
        if !ts_type.is_time() {
            return Err(Error::invalid_rule(
                topic,
                format!(
                    "column '{}' must have a time value type, got '{}'",
                    TIMESTAMP_COLUMN, rule.columns[0].value_type
                ),
            ));
        }

        let mut fields = Vec::with_capacity(rule.columns.len() + rule.tags.len());
        for (index, spec) in rule.columns.iter().enumerate() {
            fields.push(compile_field(topic, spec, index, FieldKind::Column)?);
        }
        for (index, spec) in rule.tags.iter().enumerate() {
            fields.push(compile_field(topic, spec, index, FieldKind::Tag)?);
        }

        let mut by_path = HashMap::with_capacity(fields.len());
        for (slot, field) in fields.iter().enumerate() {
            if field.path.is_empty() {
                continue;
            }
            if let Some(previous) = by_path.insert(field.path.canonical(), slot) {
                let other = &fields[previous];
                return Err(Error::invalid_rule(
                    topic,
                    format!(
                        "path '{}' is declared by both {} '{}' and {} '{}'",
                        field.path,
                        other.kind.as_str(),
                        other.name,
                        field.kind.as_str(),
                        field.name
                    ),
                ));
            }
        }

        let table_path = JsonPath::parse(&rule.table.path)
            .map_err(|reason| Error::invalid_rule(topic, format!("table path: {}", reason)))?;

        Ok(Self {
            rule_name: config.rule_name.clone(),
            topic: topic.to_string(),
            stable: rule.s_table.clone(),
            tag_count: rule.tags.len(),
            column_count: rule.columns.len(),
            table_default: rule.table.default_value.clone(),
            table_path,
            fields,
            by_path,
        })
    }

    /// Descriptor bound to a JSON path, in any of its spellings.
    pub fn field_for_path(&self, path: &str) -> Option<&FieldDescriptor> {
        let canonical = JsonPath::parse(path).ok()?.canonical();
        self.by_path.get(&canonical).map(|slot| &self.fields[*slot])
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Store definitions of the columns, `ts` first
    pub fn column_infos(&self) -> Vec<FieldInfo> {
        self.field_infos(FieldKind::Column)
    }

    pub fn tag_infos(&self) -> Vec<FieldInfo> {
        self.field_infos(FieldKind::Tag)
    }

    fn field_infos(&self, kind: FieldKind) -> Vec<FieldInfo> {
        self.fields
            .iter()
            .filter(|f| f.kind == kind)
            .map(|f| FieldInfo::new(f.name.clone(), f.value_type.column_type(), f.length))
            .collect()
    }

    /// `CREATE STABLE IF NOT EXISTS` for this rule's supertable
    pub fn create_stable_sql(&self) -> String {
        create_stable(&self.stable, &self.column_infos(), &self.tag_infos())
    }
}

fn parse_value_type(topic: &str, spec: &FieldSpec) -> Result<ValueType> {
    spec.value_type
        .parse::<ValueType>()
        .map_err(|reason| Error::invalid_rule(topic, format!("field '{}': {}", spec.name, reason)))
}

fn compile_field(
    topic: &str,
    spec: &FieldSpec,
    index: usize,
    kind: FieldKind,
) -> Result<FieldDescriptor> {
    let value_type = parse_value_type(topic, spec)?;
    if !identifier_re().is_match(&spec.name) {
        return Err(Error::invalid_rule(
            topic,
            format!("{} name '{}' is not a valid identifier", kind.as_str(), spec.name),
        ));
    }
    let time_layout = if spec.time_layout.is_empty() {
        None
    } else {
        Some(spec.time_layout.clone())
    };
    if value_type == ValueType::TimeString && time_layout.is_none() {
        return Err(Error::invalid_rule(
            topic,
            format!(
                "field '{}' must set time_layout when value type is timeString",
                spec.name
            ),
        ));
    }
    let path = JsonPath::parse(&spec.path)
        .map_err(|reason| Error::invalid_rule(topic, format!("field '{}': {}", spec.name, reason)))?;
    let default = value_type
        .convert(&spec.default_value, time_layout.as_deref())
        .map_err(|reason| {
            Error::invalid_rule(
                topic,
                format!("default value of field '{}': {}", spec.name, reason),
            )
        })?;

    Ok(FieldDescriptor {
        name: spec.name.clone(),
        index,
        value_type,
        kind,
        length: spec.length,
        default,
        time_layout,
        path,
    })
}

/// Immutable topic to rule table, built once and shared by reference
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: HashMap<String, CompiledRule>,
    /// Topics in load order
    order: Vec<String>,
}

impl RuleSet {
    /// Validate every rule, then install all of them. Any invalid rule fails
    /// the whole set.
    pub fn compile(configs: Vec<RuleConfig>) -> Result<Self> {
        let mut compiled = Vec::with_capacity(configs.len());
        for config in &configs {
            compiled.push(CompiledRule::compile(config)?);
        }

        let mut rules = HashMap::with_capacity(compiled.len());
        let mut order = Vec::with_capacity(compiled.len());
        for rule in compiled {
            if rules.contains_key(&rule.topic) {
                return Err(Error::invalid_rule(
                    &rule.topic,
                    "topic is declared by more than one rule",
                ));
            }
            debug!(topic = %rule.topic, stable = %rule.stable, "Compiled rule");
            order.push(rule.topic.clone());
            rules.insert(rule.topic.clone(), rule);
        }
        info!(rules = order.len(), "Rule set compiled");
        Ok(Self { rules, order })
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let configs: Vec<RuleConfig> = serde_json::from_str(text)?;
        Self::compile(configs)
    }

    /// Load and compile a rule file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::Config(format!(
                "rule file {} does not exist",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn get(&self, topic: &str) -> Option<&CompiledRule> {
        self.rules.get(topic)
    }

    pub fn rule_exists(&self, topic: &str) -> bool {
        self.rules.contains_key(topic)
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// One `CREATE STABLE IF NOT EXISTS` per rule, in load order.
    pub fn create_stable_statements(&self) -> Vec<String> {
        self.order
            .iter()
            .filter_map(|topic| self.rules.get(topic))
            .map(CompiledRule::create_stable_sql)
            .collect()
    }
}
