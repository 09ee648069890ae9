//! Catalog and DDL operations
//!
//! Thin statement builders on top of [`Executor`]; every table, supertable
//! and database name is qualified with the executor's database.

use super::executor::Executor;
use crate::connector::{CallContext, StoreResponse};
use crate::rule::Row;
use crate::schema::{
    format_timestamp, parse_time, FieldInfo, TableInfo, Value, TIMESTAMP_COLUMN,
};
use crate::sql::{
    create_stable, identifier_re, insert_rows_statement, insert_statement, AlterAction,
    AlterStatement, AlterTarget, TableKind,
};
use crate::{Error, Result};

use chrono::{DateTime, Utc};
use tracing::info;

/// One row of `SHOW <db>.STABLES`
#[derive(Debug, Clone, PartialEq)]
pub struct StableSummary {
    pub name: String,
    pub created: Option<DateTime<Utc>>,
    pub columns: i64,
    pub tags: i64,
    pub tables: i64,
}

/// One row of `SHOW <db>.TABLES`
#[derive(Debug, Clone, PartialEq)]
pub struct TableSummary {
    pub name: String,
    pub created: Option<DateTime<Utc>>,
    pub columns: i64,
    pub stable: String,
    pub uid: i64,
    pub tid: i64,
    pub vgroup_id: i64,
}

fn cell<'a>(row: &'a [Value], idx: usize, what: &str) -> Result<&'a Value> {
    row.get(idx)
        .ok_or_else(|| Error::Query(format!("{} row has no cell {}", what, idx)))
}

fn text_cell(row: &[Value], idx: usize, what: &str) -> Result<String> {
    match cell(row, idx, what)? {
        Value::String(s) => Ok(s.clone()),
        other => Err(Error::Query(format!(
            "{} cell {} is not text: {:?}",
            what, idx, other
        ))),
    }
}

fn int_cell(row: &[Value], idx: usize, what: &str) -> Result<i64> {
    match cell(row, idx, what)? {
        Value::Int(i) => Ok(*i),
        Value::Null => Ok(0),
        other => Err(Error::Query(format!(
            "{} cell {} is not an integer: {:?}",
            what, idx, other
        ))),
    }
}

fn time_cell(row: &[Value], idx: usize) -> Option<DateTime<Utc>> {
    match row.get(idx)? {
        Value::Timestamp(t) => Some(*t),
        Value::String(s) => parse_time("rfc3339", s).ok(),
        _ => None,
    }
}

impl Executor {
    /// Fields and tags of a table or supertable
    pub async fn describe_table(&self, ctx: &CallContext, table: &str) -> Result<TableInfo> {
        let sql = format!("DESCRIBE {}", self.qualified(table));
        let response = self.do_query(ctx, &sql).await?;
        TableInfo::from_describe(&response)
    }

    /// Create a supertable; the `ts` column is added when `info` lacks it.
    pub async fn create_stable(&self, ctx: &CallContext, name: &str, info: &TableInfo) -> Result<()> {
        if info.fields.is_empty() {
            return Err(Error::Planning(format!("supertable {} needs fields", name)));
        }
        if info.tags.is_empty() {
            return Err(Error::Planning(format!("supertable {} needs tags", name)));
        }
        let mut fields = Vec::with_capacity(info.fields.len() + 1);
        if info.fields[0].name != TIMESTAMP_COLUMN {
            fields.push(FieldInfo::timestamp());
        }
        fields.extend(info.fields.iter().cloned());

        let sql = create_stable(&self.qualified(name), &fields, &info.tags);
        self.do_exec(ctx, &sql).await?;
        info!(stable = %name, "Created supertable");
        Ok(())
    }

    /// Multi-row insert with pre-rendered tag and value lists.
    pub async fn insert_using_stable(
        &self,
        ctx: &CallContext,
        table: &str,
        stable: &str,
        tags: &str,
        values: &[String],
    ) -> Result<i64> {
        if values.is_empty() {
            return Ok(0);
        }
        let sql = insert_rows_statement(
            &self.qualified(table),
            &self.qualified(stable),
            tags,
            values,
        );
        self.do_exec(ctx, &sql).await
    }

    /// Insert one mapped event.
    pub async fn insert_row(&self, ctx: &CallContext, row: &Row) -> Result<i64> {
        let sql = insert_statement(
            &self.qualified(&row.table),
            &self.qualified(&row.stable),
            &row.tags,
            &row.columns,
        );
        self.do_exec(ctx, &sql).await
    }

    async fn alter(
        &self,
        ctx: &CallContext,
        kind: TableKind,
        table: &str,
        action: AlterAction,
        target: AlterTarget,
        field: &FieldInfo,
    ) -> Result<()> {
        let qualified = self.qualified(table);
        let sql = AlterStatement {
            kind,
            table: &qualified,
            action,
            target,
            field,
        }
        .render()?;
        self.do_exec(ctx, &sql).await?;
        Ok(())
    }

    pub async fn add_column(
        &self,
        ctx: &CallContext,
        kind: TableKind,
        table: &str,
        field: &FieldInfo,
    ) -> Result<()> {
        self.alter(ctx, kind, table, AlterAction::Add, AlterTarget::Column, field)
            .await
    }

    pub async fn add_tag(&self, ctx: &CallContext, stable: &str, field: &FieldInfo) -> Result<()> {
        self.alter(ctx, TableKind::Stable, stable, AlterAction::Add, AlterTarget::Tag, field)
            .await
    }

    /// Change a column definition, typically to widen a string column.
    pub async fn modify_column(
        &self,
        ctx: &CallContext,
        kind: TableKind,
        table: &str,
        field: &FieldInfo,
    ) -> Result<()> {
        self.alter(ctx, kind, table, AlterAction::Modify, AlterTarget::Column, field)
            .await
    }

    pub async fn modify_tag(&self, ctx: &CallContext, stable: &str, field: &FieldInfo) -> Result<()> {
        self.alter(ctx, TableKind::Stable, stable, AlterAction::Modify, AlterTarget::Tag, field)
            .await
    }

    pub async fn create_database(&self, ctx: &CallContext, keep: u32, update: u32) -> Result<()> {
        let sql = format!(
            "CREATE DATABASE IF NOT EXISTS {} KEEP {} UPDATE {}",
            self.database(),
            keep,
            update
        );
        self.do_exec(ctx, &sql).await?;
        Ok(())
    }

    pub async fn alter_database(&self, ctx: &CallContext, parameter: &str, value: i64) -> Result<()> {
        if !identifier_re().is_match(parameter) {
            return Err(Error::Planning(format!(
                "invalid database parameter '{}'",
                parameter
            )));
        }
        let sql = format!("ALTER DATABASE {} {} {}", self.database(), parameter, value);
        self.do_exec(ctx, &sql).await?;
        Ok(())
    }

    /// Timestamp precision of the executor's database, e.g. `ms`
    pub async fn precision(&self, ctx: &CallContext) -> Result<String> {
        let response = self.do_query(ctx, "SHOW DATABASES").await?;
        let name_idx = response.column_index("name")?;
        let precision_idx = response.column_index("precision")?;
        for row in &response.rows {
            if matches!(row.get(name_idx), Some(Value::String(name)) if name == self.database()) {
                return text_cell(row, precision_idx, "databases");
            }
        }
        Err(Error::Query(format!(
            "database {} not found in SHOW DATABASES",
            self.database()
        )))
    }

    pub async fn show_stables(&self, ctx: &CallContext) -> Result<Vec<StableSummary>> {
        let response = self.show(ctx, "STABLES").await?;
        response
            .rows
            .iter()
            .map(|row| {
                Ok(StableSummary {
                    name: text_cell(row, 0, "stables")?,
                    created: time_cell(row, 1),
                    columns: int_cell(row, 2, "stables")?,
                    tags: int_cell(row, 3, "stables")?,
                    tables: int_cell(row, 4, "stables")?,
                })
            })
            .collect()
    }

    pub async fn show_tables(&self, ctx: &CallContext) -> Result<Vec<TableSummary>> {
        let response = self.show(ctx, "TABLES").await?;
        response
            .rows
            .iter()
            .map(|row| {
                Ok(TableSummary {
                    name: text_cell(row, 0, "tables")?,
                    created: time_cell(row, 1),
                    columns: int_cell(row, 2, "tables")?,
                    stable: match cell(row, 3, "tables")? {
                        Value::String(s) => s.clone(),
                        _ => String::new(),
                    },
                    uid: int_cell(row, 4, "tables")?,
                    tid: int_cell(row, 5, "tables")?,
                    vgroup_id: int_cell(row, 6, "tables")?,
                })
            })
            .collect()
    }

    pub async fn stable_names(&self, ctx: &CallContext) -> Result<Vec<String>> {
        let response = self.show(ctx, "STABLES").await?;
        response
            .rows
            .iter()
            .map(|row| text_cell(row, 0, "stables"))
            .collect()
    }

    async fn show(&self, ctx: &CallContext, what: &str) -> Result<StoreResponse> {
        let sql = format!("SHOW {}", self.qualified(what));
        self.do_query(ctx, &sql).await
    }

    /// Rows of a supertable at exactly `ts`, narrowed by raw `where_terms`.
    ///
    /// Terms are appended verbatim and must come from trusted code.
    pub async fn query_one_from_stable(
        &self,
        ctx: &CallContext,
        stable: &str,
        where_terms: &[String],
        ts: DateTime<Utc>,
    ) -> Result<StoreResponse> {
        let mut sql = format!(
            "SELECT * FROM {} WHERE {} = '{}'",
            self.qualified(stable),
            TIMESTAMP_COLUMN,
            format_timestamp(&ts)
        );
        for term in where_terms {
            sql.push_str(" AND ");
            sql.push_str(term);
        }
        self.do_query(ctx, &sql).await
    }

    pub async fn query_one_from_table(
        &self,
        ctx: &CallContext,
        table: &str,
        ts: DateTime<Utc>,
    ) -> Result<StoreResponse> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} = '{}'",
            self.qualified(table),
            TIMESTAMP_COLUMN,
            format_timestamp(&ts)
        );
        self.do_query(ctx, &sql).await
    }
}
