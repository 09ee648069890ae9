//! Environment-based configuration
//!
//! Builds the executor and the rule set from environment variables so the
//! same binary can be pointed at different databases and rule files.

use crate::connector::Connector;
use crate::query::Executor;
use crate::rule::RuleSet;
use crate::{Error, Result};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Default size of the process-wide worker pool
pub const DEFAULT_POOL_SIZE: usize = 10_000;
/// Rows per marshalling batch
pub const DEFAULT_MARSHAL_BATCH: usize = 7_000;

/// Executor settings
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Database every table name is qualified with
    pub database: String,
    /// Log every statement sent to the store
    pub show_sql: bool,
    pub pool_size: usize,
    pub marshal_batch_size: usize,
    /// Layout for `ts` cells returned as text; RFC3339 when unset
    pub time_layout: Option<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            database: "default".to_string(),
            show_sql: false,
            pool_size: DEFAULT_POOL_SIZE,
            marshal_batch_size: DEFAULT_MARSHAL_BATCH,
            time_layout: None,
        }
    }
}

impl ExecutorConfig {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Default::default()
        }
    }

    /// Read overrides from the process environment.
    ///
    /// Environment variables:
    /// - STABLEBRIDGE_DATABASE: database name (default: default)
    /// - STABLEBRIDGE_SHOW_SQL: "1"/"true" to log statements
    /// - STABLEBRIDGE_POOL_SIZE: worker pool capacity (default: 10000)
    /// - STABLEBRIDGE_MARSHAL_BATCH: rows per marshalling batch (default: 7000)
    /// - STABLEBRIDGE_TIME_LAYOUT: strftime layout of text timestamps
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(database) = var("STABLEBRIDGE_DATABASE") {
            config.database = database.trim().to_string();
        }
        if let Some(show_sql) = var("STABLEBRIDGE_SHOW_SQL") {
            config.show_sql = parse_flag("STABLEBRIDGE_SHOW_SQL", &show_sql)?;
        }
        if let Some(size) = var("STABLEBRIDGE_POOL_SIZE") {
            config.pool_size = parse_positive("STABLEBRIDGE_POOL_SIZE", &size)?;
        }
        if let Some(batch) = var("STABLEBRIDGE_MARSHAL_BATCH") {
            config.marshal_batch_size = parse_positive("STABLEBRIDGE_MARSHAL_BATCH", &batch)?;
        }
        config.time_layout = var("STABLEBRIDGE_TIME_LAYOUT");
        Ok(config)
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    let value = raw.trim();
    if value == "1" || value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value == "0" || value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(Error::Config(format!("{} must be true or false, got '{}'", key, raw)))
    }
}

fn parse_positive<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr + PartialOrd + Default,
{
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(Error::Config(format!(
            "{} must be a positive integer, got '{}'",
            key, raw
        ))),
    }
}

pub struct ComponentFactory;

impl ComponentFactory {
    /// Create an executor over `connector` from environment
    pub fn create_executor(connector: Arc<dyn Connector>) -> Result<Executor> {
        let config = ExecutorConfig::from_env()?;
        info!(
            database = %config.database,
            pool_size = config.pool_size,
            show_sql = config.show_sql,
            "Creating executor"
        );
        Ok(Executor::new(connector, config))
    }

    /// Load the rule set named by STABLEBRIDGE_RULES
    pub fn load_rules() -> Result<Arc<RuleSet>> {
        let path = std::env::var("STABLEBRIDGE_RULES").map_err(|_| {
            Error::Config("STABLEBRIDGE_RULES must point at a rule file".to_string())
        })?;
        info!("Loading rules from {}", path);
        Ok(Arc::new(RuleSet::load(&path)?))
    }
}
