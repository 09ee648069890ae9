//! # stablebridge
//!
//! Rule-driven ingestion and concurrent querying for supertable time-series
//! stores that are reached only through SQL text.
//!
//! ## Write path
//!
//! - **Rules**: a rule file declares, per topic, the supertable, its tags and
//!   columns and the JSON paths that feed them. Rules are validated up front
//!   and compiled into an immutable [`rule::RuleSet`].
//! - **Mapping**: each JSON event is mapped to a typed [`rule::Row`] and
//!   rendered as an `INSERT ... USING ... TAGS ... VALUES` statement.
//!
//! ## Read path
//!
//! - **Planning**: a logical multi-table query is expanded into one SELECT per
//!   table or tag group.
//! - **Fan-out**: statements run concurrently on a bounded worker pool; the
//!   caller gets every result or the first error, never a partial answer.
//! - **Marshalling**: large responses are converted to per-column series in
//!   parallel batches without changing row order.

pub mod config;
pub mod connector;
pub mod ingester;
pub mod pool;
pub mod query;
pub mod rule;
pub mod schema;
pub mod sql;
pub mod telemetry;

mod error;

pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::config::{ComponentFactory, ExecutorConfig};
    pub use crate::connector::{CallContext, Connector, StoreResponse};
    pub use crate::ingester::Ingester;
    pub use crate::pool::WorkerPool;
    pub use crate::query::{Executor, QueryRequest, QueryResponse, QueryResult, TableQuery};
    pub use crate::rule::{Row, RuleConfig, RuleSet};
    pub use crate::schema::{Value, ValueType};
    pub use crate::{Error, Result};
}
