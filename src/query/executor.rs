//! Concurrent fan-out executor
//!
//! Every logical query is planned completely before anything is dispatched,
//! so planning errors never reach the store. Tasks report into a channel
//! owned by the calling task, which is the only place results and the first
//! error are recorded.

use super::marshal::ResultMarshaller;
use super::{telemetry, QueryRequest, QueryResponse, QueryResult, TagGroup};
use crate::config::ExecutorConfig;
use crate::connector::{CallContext, Connector, StoreResponse};
use crate::pool::WorkerPool;
use crate::sql::{identifier_re, plan_select, SelectParams};
use crate::{Error, Result};

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn, Instrument};

/// Sends statements to the connector, logging them when asked to
#[derive(Clone)]
pub(crate) struct StatementRunner {
    connector: Arc<dyn Connector>,
    show_sql: bool,
}

impl StatementRunner {
    pub(crate) async fn query(&self, ctx: &CallContext, sql: &str) -> Result<StoreResponse> {
        if self.show_sql {
            info!(sql = %sql, "Query statement");
        }
        let result = self.connector.query(ctx, sql).await;
        telemetry::record_statement("query", outcome(&result));
        result
    }

    pub(crate) async fn exec(&self, ctx: &CallContext, sql: &str) -> Result<i64> {
        if self.show_sql {
            info!(sql = %sql, "Exec statement");
        }
        let result = self.connector.exec(ctx, sql).await;
        telemetry::record_statement("exec", outcome(&result));
        result
    }
}

fn outcome<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(_) => "error",
    }
}

/// One planned SELECT
#[derive(Debug, Clone)]
struct PlannedTask {
    table: String,
    tags: Option<TagGroup>,
    sql: String,
}

/// Query executor over a single database
#[derive(Clone)]
pub struct Executor {
    pub(crate) runner: StatementRunner,
    marshaller: ResultMarshaller,
    pool: WorkerPool,
    database: String,
    pub(crate) time_layout: Option<String>,
}

impl Executor {
    /// Create an executor with its own worker pool of `config.pool_size`
    pub fn new(connector: Arc<dyn Connector>, config: ExecutorConfig) -> Self {
        let pool = WorkerPool::new(config.pool_size);
        Self::with_pool(connector, pool, config)
    }

    /// Create an executor sharing an existing worker pool
    pub fn with_pool(connector: Arc<dyn Connector>, pool: WorkerPool, config: ExecutorConfig) -> Self {
        let marshaller = ResultMarshaller::new(
            pool.clone(),
            config.marshal_batch_size,
            config.time_layout.clone(),
        );
        Self {
            runner: StatementRunner {
                connector,
                show_sql: config.show_sql,
            },
            marshaller,
            pool,
            database: config.database,
            time_layout: config.time_layout,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// `db.name`
    pub fn qualified(&self, name: &str) -> String {
        format!("{}.{}", self.database, name)
    }

    /// Run a query statement as-is.
    pub async fn do_query(&self, ctx: &CallContext, sql: &str) -> Result<StoreResponse> {
        self.runner.query(ctx, sql).await
    }

    /// Run a statement as-is and return the affected row count.
    pub async fn do_exec(&self, ctx: &CallContext, sql: &str) -> Result<i64> {
        self.runner.exec(ctx, sql).await
    }

    fn plan(&self, request: &QueryRequest) -> Result<Vec<PlannedTask>> {
        let mut tasks = Vec::new();
        for (table, table_query) in &request.tables {
            if table_query.columns.is_empty() {
                continue;
            }
            if !identifier_re().is_match(table) {
                return Err(Error::Planning(format!("invalid table name '{}'", table)));
            }
            let qualified = self.qualified(table);
            let base = SelectParams {
                table: &qualified,
                aggregation: &request.aggregation,
                columns: &table_query.columns,
                tags: None,
                start: request.start,
                end: request.end,
                interval: &request.interval,
                fill: &request.fill,
                limit: request.limit,
                offset: request.offset,
            };
            if table_query.tags.is_empty() {
                tasks.push(PlannedTask {
                    table: table.clone(),
                    tags: None,
                    sql: plan_select(&base)?,
                });
            } else {
                for group in &table_query.tags {
                    let sql = plan_select(&SelectParams {
                        tags: Some(group),
                        ..base.clone()
                    })?;
                    tasks.push(PlannedTask {
                        table: table.clone(),
                        tags: Some(group.clone()),
                        sql,
                    });
                }
            }
        }
        Ok(tasks)
    }

    /// Run a logical query across every table and tag group it names.
    ///
    /// Returns every result, or the first error reported by any task with no
    /// partial results.
    pub async fn query(&self, ctx: &CallContext, request: &QueryRequest) -> Result<QueryResponse> {
        let started = Instant::now();
        let run_id = std::env::var("STABLEBRIDGE_TELEMETRY_RUN_ID")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let span = info_span!(
            "query.fanout",
            database = %self.database,
            tables = request.tables.len(),
            run_id = run_id.as_deref().unwrap_or("none")
        );

        let mut tasks_dispatched = 0usize;
        let result = self
            .fan_out(ctx, request, &mut tasks_dispatched)
            .instrument(span)
            .await;

        let elapsed = started.elapsed().as_secs_f64();
        match &result {
            Ok(response) => telemetry::record_fanout(telemetry::FanoutMetrics {
                outcome: "success",
                error_class: None,
                duration_seconds: elapsed,
                tasks: tasks_dispatched as u64,
                results: response.results.len() as u64,
            }),
            Err(error) => telemetry::record_fanout(telemetry::FanoutMetrics {
                outcome: "error",
                error_class: Some(error.class()),
                duration_seconds: elapsed,
                tasks: tasks_dispatched as u64,
                results: 0,
            }),
        }
        result
    }

    async fn fan_out(
        &self,
        ctx: &CallContext,
        request: &QueryRequest,
        dispatched: &mut usize,
    ) -> Result<QueryResponse> {
        let tasks = self.plan(request)?;
        if tasks.is_empty() {
            return Ok(QueryResponse::default());
        }
        debug!(tasks = tasks.len(), "Dispatching fan-out query");

        let call_ctx = ctx.child();
        let (tx, mut rx) = mpsc::unbounded_channel::<Result<Vec<QueryResult>>>();
        let mut failure: Option<Error> = None;

        for task in tasks {
            let tx = tx.clone();
            let task_ctx = call_ctx.clone();
            let runner = self.runner.clone();
            let marshaller = self.marshaller.clone();
            let spawned = self.pool.try_spawn(async move {
                let report = run_task(&runner, &marshaller, &task_ctx, task).await;
                let _ = tx.send(report);
            });
            match spawned {
                Ok(_) => *dispatched += 1,
                Err(e) => {
                    warn!(dispatched = *dispatched, "Fan-out submission rejected: {}", e);
                    call_ctx.cancel_token().cancel();
                    failure = Some(e);
                    break;
                }
            }
        }
        drop(tx);

        let mut results = Vec::new();
        let mut reported = 0usize;
        while let Some(report) = rx.recv().await {
            reported += 1;
            match report {
                Ok(batch) => {
                    if failure.is_none() {
                        results.extend(batch);
                    }
                }
                Err(e) => {
                    if failure.is_none() {
                        warn!("Fan-out task failed, cancelling siblings: {}", e);
                        call_ctx.cancel_token().cancel();
                        failure = Some(e);
                    } else {
                        debug!("Discarding error after first failure: {}", e);
                    }
                }
            }
        }

        if failure.is_none() && reported < *dispatched {
            failure = Some(Error::Internal(format!(
                "{} of {} fan-out tasks ended without reporting",
                *dispatched - reported,
                *dispatched
            )));
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(QueryResponse { results }),
        }
    }
}

async fn run_task(
    runner: &StatementRunner,
    marshaller: &ResultMarshaller,
    ctx: &CallContext,
    task: PlannedTask,
) -> Result<Vec<QueryResult>> {
    if ctx.is_cancelled() {
        return Err(Error::Cancelled);
    }
    let response = runner.query(ctx, &task.sql).await?;
    if ctx.is_cancelled() {
        return Err(Error::Cancelled);
    }
    let series = marshaller.marshal(response).await?;
    Ok(series
        .into_iter()
        .map(|(column, values)| QueryResult {
            table: task.table.clone(),
            tags: task.tags.clone(),
            column,
            values,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{ScriptedConnector, ScriptedReply};
    use crate::query::TableQuery;
    use crate::schema::Value;
    use chrono::DateTime;

    fn rows(n: usize) -> ScriptedReply {
        let base = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        ScriptedReply::Rows(StoreResponse::new(
            vec!["ts", "v"],
            (0..n)
                .map(|i| {
                    vec![
                        Value::Timestamp(base + chrono::Duration::seconds(i as i64)),
                        Value::Float(i as f64),
                    ]
                })
                .collect(),
        ))
    }

    fn executor(connector: ScriptedConnector) -> (Executor, Arc<ScriptedConnector>) {
        let connector = Arc::new(connector);
        let executor = Executor::new(connector.clone(), ExecutorConfig::new("db"));
        (executor, connector)
    }

    #[tokio::test]
    async fn test_empty_request_returns_empty_response() {
        let (executor, connector) = executor(ScriptedConnector::new());
        let response = executor
            .query(&CallContext::new(), &QueryRequest::default())
            .await
            .unwrap();
        assert!(response.is_empty());
        assert!(connector.statements().is_empty());
    }

    #[tokio::test]
    async fn test_tables_without_columns_are_skipped() {
        let (executor, connector) = executor(ScriptedConnector::new().respond("db.t1", rows(2)));
        let request = QueryRequest::default()
            .table("t1", TableQuery::new(["v"]))
            .table("t2", TableQuery::default());
        let response = executor.query(&CallContext::new(), &request).await.unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(connector.statements(), vec!["SELECT v FROM db.t1"]);
    }

    #[tokio::test]
    async fn test_planning_error_sends_nothing() {
        let (executor, connector) = executor(ScriptedConnector::new());
        let request = QueryRequest {
            interval: "1m".to_string(),
            ..Default::default()
        }
        .table("t1", TableQuery::new(["v"]))
        .table("t2", TableQuery::new(["v"]));
        let err = executor.query(&CallContext::new(), &request).await.unwrap_err();
        assert!(matches!(err, Error::Planning(_)));
        assert!(connector.statements().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_unsafe_table_name() {
        let (executor, _) = executor(ScriptedConnector::new());
        let request = QueryRequest::default().table("t1; DROP", TableQuery::new(["v"]));
        assert!(matches!(
            executor.query(&CallContext::new(), &request).await,
            Err(Error::Planning(_))
        ));
    }

    #[tokio::test]
    async fn test_show_sql_does_not_change_results() {
        let connector = Arc::new(ScriptedConnector::new().respond("db.t1", rows(3)));
        let config = ExecutorConfig {
            show_sql: true,
            ..ExecutorConfig::new("db")
        };
        let executor = Executor::new(connector, config);
        let request = QueryRequest::default().table("t1", TableQuery::new(["v"]));
        let response = executor.query(&CallContext::new(), &request).await.unwrap();
        assert_eq!(response.find("t1", None, "v").unwrap().values.len(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_caller_gets_cancelled() {
        let (executor, connector) = executor(ScriptedConnector::new().respond("db.t1", rows(1)));
        let ctx = CallContext::new();
        ctx.cancel_token().cancel();
        let request = QueryRequest::default().table("t1", TableQuery::new(["v"]));
        let err = executor.query(&ctx, &request).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(connector.statements().is_empty());
    }
}
