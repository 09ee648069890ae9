//! Store connector contract
//!
//! The store is reached exclusively through SQL text. Transport is an
//! external concern: implementors of [`Connector`] own connection handling,
//! authentication and deadline enforcement.

pub mod restful;
mod scripted;

pub use restful::RestfulEnvelope;
pub use scripted::{ScriptedConnector, ScriptedReply};

use crate::schema::Value;
use crate::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Tabular response to a query statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreResponse {
    /// Ordered column names
    pub head: Vec<String>,
    /// Rows of cells, index-aligned with `head`
    pub rows: Vec<Vec<Value>>,
    /// Row count reported by the store (affected rows for statements)
    pub row_count: i64,
}

impl StoreResponse {
    pub fn new<S: Into<String>>(head: Vec<S>, rows: Vec<Vec<Value>>) -> Self {
        let row_count = rows.len() as i64;
        Self {
            head: head.into_iter().map(Into::into).collect(),
            rows,
            row_count,
        }
    }

    /// Position of a named column in `head`
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.head
            .iter()
            .position(|column| column == name)
            .ok_or_else(|| Error::Query(format!("response has no '{}' column", name)))
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Per-call context handed to the connector
///
/// Carries the caller's deadline and the cooperative cancellation signal of
/// the logical call the statement belongs to.
#[derive(Debug, Clone)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl CallContext {
    pub fn new() -> Self {
        Self {
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Child context that is cancelled with this one and shares its deadline
    pub fn child(&self) -> Self {
        Self {
            deadline: self.deadline,
            cancel: self.cancel.child_token(),
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

/// SQL-text connection to the store
///
/// Errors distinguish transport failures ([`Error::Transport`]) from
/// store-reported failures ([`Error::Store`]).
#[async_trait]
pub trait Connector: Send + Sync {
    /// Run a statement that returns rows
    async fn query(&self, ctx: &CallContext, sql: &str) -> Result<StoreResponse>;

    /// Run a statement and return the affected row count
    async fn exec(&self, ctx: &CallContext, sql: &str) -> Result<i64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_index() {
        let response = StoreResponse::new(vec!["ts", "v"], vec![]);
        assert_eq!(response.column_index("v").unwrap(), 1);
        assert!(matches!(response.column_index("x"), Err(Error::Query(_))));
    }

    #[tokio::test]
    async fn test_child_context_follows_parent_cancellation() {
        let parent = CallContext::new().with_timeout(Duration::from_secs(5));
        let child = parent.child();
        assert_eq!(child.deadline(), parent.deadline());
        assert!(!child.is_cancelled());
        parent.cancel_token().cancel();
        assert!(child.is_cancelled());
        assert!(parent.remaining().unwrap() <= Duration::from_secs(5));
    }
}
