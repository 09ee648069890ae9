//! In-memory connector with scripted replies
//!
//! Suitable for development and testing: statements are matched against
//! substring patterns in registration order and answered with canned rows,
//! affected counts or errors. Every statement received is recorded.

use super::{CallContext, Connector, StoreResponse};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

/// Canned answer for a matched statement
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Rows(StoreResponse),
    Affected(i64),
    StoreError { code: i64, desc: String },
    TransportError(String),
}

#[derive(Debug, Clone)]
struct Script {
    pattern: String,
    delay: Option<Duration>,
    reply: ScriptedReply,
}

#[derive(Debug, Default)]
pub struct ScriptedConnector {
    scripts: Vec<Script>,
    statements: Mutex<Vec<String>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer statements containing `pattern` with `reply`
    pub fn respond(mut self, pattern: impl Into<String>, reply: ScriptedReply) -> Self {
        self.scripts.push(Script {
            pattern: pattern.into(),
            delay: None,
            reply,
        });
        self
    }

    /// Like [`respond`](Self::respond) but the reply is held back for `delay`
    pub fn respond_after(
        mut self,
        pattern: impl Into<String>,
        delay: Duration,
        reply: ScriptedReply,
    ) -> Self {
        self.scripts.push(Script {
            pattern: pattern.into(),
            delay: Some(delay),
            reply,
        });
        self
    }

    /// Every statement received so far, in arrival order
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }

    async fn answer(&self, ctx: &CallContext, sql: &str) -> Result<ScriptedReply> {
        self.statements.lock().push(sql.to_string());
        let Some(script) = self.scripts.iter().find(|s| sql.contains(&s.pattern)) else {
            return Ok(ScriptedReply::Affected(0));
        };
        if let Some(delay) = script.delay {
            match ctx.remaining() {
                Some(remaining) if remaining < delay => {
                    tokio::time::sleep(remaining).await;
                    return Err(Error::Timeout);
                }
                _ => tokio::time::sleep(delay).await,
            }
        }
        Ok(script.reply.clone())
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn query(&self, ctx: &CallContext, sql: &str) -> Result<StoreResponse> {
        match self.answer(ctx, sql).await? {
            ScriptedReply::Rows(response) => Ok(response),
            ScriptedReply::Affected(n) => Ok(StoreResponse {
                row_count: n,
                ..Default::default()
            }),
            ScriptedReply::StoreError { code, desc } => Err(Error::Store { code, desc }),
            ScriptedReply::TransportError(msg) => Err(Error::Transport(msg)),
        }
    }

    async fn exec(&self, ctx: &CallContext, sql: &str) -> Result<i64> {
        match self.answer(ctx, sql).await? {
            ScriptedReply::Rows(response) => Ok(response.row_count),
            ScriptedReply::Affected(n) => Ok(n),
            ScriptedReply::StoreError { code, desc } => Err(Error::Store { code, desc }),
            ScriptedReply::TransportError(msg) => Err(Error::Transport(msg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_matching_script_wins() {
        let connector = ScriptedConnector::new()
            .respond("FROM db.a", ScriptedReply::Affected(3))
            .respond("FROM db", ScriptedReply::Affected(1));
        let ctx = CallContext::new();
        assert_eq!(connector.exec(&ctx, "SELECT * FROM db.a").await.unwrap(), 3);
        assert_eq!(connector.exec(&ctx, "SELECT * FROM db.b").await.unwrap(), 1);
        assert_eq!(connector.exec(&ctx, "SHOW DATABASES").await.unwrap(), 0);
        assert_eq!(connector.statements().len(), 3);
    }

    #[tokio::test]
    async fn test_delay_past_deadline_times_out() {
        let connector = ScriptedConnector::new().respond_after(
            "slow",
            Duration::from_secs(10),
            ScriptedReply::Affected(1),
        );
        let ctx = CallContext::new().with_timeout(Duration::from_millis(10));
        let err = connector.exec(&ctx, "slow statement").await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[tokio::test]
    async fn test_transport_error_is_distinct_from_store_error() {
        let connector = ScriptedConnector::new()
            .respond("a", ScriptedReply::TransportError("connection reset".into()))
            .respond("b", ScriptedReply::StoreError { code: 1, desc: "bad".into() });
        let ctx = CallContext::new();
        assert!(matches!(connector.query(&ctx, "a").await, Err(Error::Transport(_))));
        assert!(matches!(connector.query(&ctx, "b").await, Err(Error::Store { .. })));
    }
}
