//! Write path for stablebridge
//!
//! The ingester owns no state besides the shared rule set and executor:
//! each event is mapped through its topic's rule and inserted immediately.

mod telemetry;

use crate::connector::CallContext;
use crate::query::Executor;
use crate::rule::RuleSet;
use crate::{Error, Result};

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct Ingester {
    rules: Arc<RuleSet>,
    executor: Arc<Executor>,
}

impl Ingester {
    pub fn new(rules: Arc<RuleSet>, executor: Arc<Executor>) -> Self {
        Self { rules, executor }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Create every rule's supertable if it does not exist yet.
    ///
    /// Supertables are created in the executor's database.
    pub async fn ensure_stables(&self, ctx: &CallContext) -> Result<usize> {
        let mut created = 0;
        for topic in self.rules.topics() {
            let Some(rule) = self.rules.get(topic) else {
                continue;
            };
            let sql = crate::sql::create_stable(
                &self.executor.qualified(&rule.stable),
                &rule.column_infos(),
                &rule.tag_infos(),
            );
            match self.executor.do_exec(ctx, &sql).await {
                Ok(_) => {
                    telemetry::record_stable_statement("success");
                    created += 1;
                }
                Err(e) => {
                    telemetry::record_stable_statement("error");
                    warn!(topic = %topic, stable = %rule.stable, "Failed to create supertable: {}", e);
                    return Err(e);
                }
            }
        }
        info!(stables = created, "Supertables ensured");
        Ok(created)
    }

    /// Map `payload` with the rule of `topic` and insert it.
    ///
    /// Returns `Ok(None)` when no rule is registered for `topic`, otherwise
    /// the affected row count.
    pub async fn ingest(&self, ctx: &CallContext, topic: &str, payload: &[u8]) -> Result<Option<i64>> {
        let started = Instant::now();
        let result = self.map_and_insert(ctx, topic, payload).await;
        let outcome = match &result {
            Ok(Some(_)) => "inserted",
            Ok(None) => "no_rule",
            Err(Error::Mapping { .. }) => "mapping_error",
            Err(_) => "store_error",
        };
        telemetry::record_event(outcome, payload.len() as u64, started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            warn!(topic = %topic, outcome, "Event not ingested: {}", e);
        }
        result
    }

    async fn map_and_insert(
        &self,
        ctx: &CallContext,
        topic: &str,
        payload: &[u8],
    ) -> Result<Option<i64>> {
        let Some(row) = self.rules.parse(topic, payload)? else {
            debug!(topic = %topic, "No rule for topic");
            return Ok(None);
        };
        let affected = self.executor.insert_row(ctx, &row).await?;
        debug!(topic = %topic, table = %row.table, affected, "Inserted event");
        Ok(Some(affected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutorConfig;
    use crate::connector::{ScriptedConnector, ScriptedReply};

    const RULES: &str = r#"[{
        "rule_name": "sensors",
        "topic": "sensors/data",
        "rule": {
            "s_table": "sensors",
            "tags": [{"name": "device", "value_type": "string", "length": 16, "path": "$.id"}],
            "columns": [
                {"name": "ts", "value_type": "timeSecond", "path": "$.ts"},
                {"name": "temperature", "value_type": "float", "path": "$.temp"}
            ],
            "table": {"default_value": "unknown", "path": "$.id"}
        }
    }]"#;

    fn ingester(connector: ScriptedConnector) -> (Ingester, Arc<ScriptedConnector>) {
        let connector = Arc::new(connector);
        let executor = Executor::new(connector.clone(), ExecutorConfig::new("iot"));
        let rules = RuleSet::from_json_str(RULES).unwrap();
        (Ingester::new(Arc::new(rules), Arc::new(executor)), connector)
    }

    #[tokio::test]
    async fn test_ensure_stables_runs_rule_ddl() {
        let (ingester, connector) = ingester(ScriptedConnector::new());
        assert_eq!(ingester.ensure_stables(&CallContext::new()).await.unwrap(), 1);
        assert_eq!(
            connector.statements(),
            vec!["CREATE STABLE IF NOT EXISTS iot.sensors (ts timestamp, temperature double) TAGS (device binary(16))"]
        );
    }

    #[tokio::test]
    async fn test_ingest_inserts_mapped_row() {
        let (ingester, connector) =
            ingester(ScriptedConnector::new().respond("INSERT", ScriptedReply::Affected(1)));
        let affected = ingester
            .ingest(
                &CallContext::new(),
                "sensors/data",
                br#"{"id":"dev1","temp":23.5,"ts":1700000000}"#,
            )
            .await
            .unwrap();
        assert_eq!(affected, Some(1));
        assert_eq!(
            connector.statements(),
            vec!["INSERT INTO iot._dev1 USING iot.sensors TAGS ('dev1') VALUES ('2023-11-14T22:13:20Z',23.500000)"]
        );
    }

    #[tokio::test]
    async fn test_ingest_without_rule_is_noop() {
        let (ingester, connector) = ingester(ScriptedConnector::new());
        let result = ingester
            .ingest(&CallContext::new(), "other/topic", b"{}")
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(connector.statements().is_empty());
    }

    #[tokio::test]
    async fn test_mapping_error_sends_nothing() {
        let (ingester, connector) = ingester(ScriptedConnector::new());
        let err = ingester
            .ingest(&CallContext::new(), "sensors/data", br#"{"ts":"soon"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Mapping { .. }));
        assert!(connector.statements().is_empty());
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        let (ingester, _) = ingester(ScriptedConnector::new().respond(
            "INSERT",
            ScriptedReply::StoreError {
                code: 866,
                desc: "Table does not exist".into(),
            },
        ));
        let err = ingester
            .ingest(&CallContext::new(), "sensors/data", br#"{"id":"d","ts":1}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store { code: 866, .. }));
    }
}
