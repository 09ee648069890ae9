//! Result marshalling: row-oriented store responses to per-column series
//!
//! Large responses are split into contiguous batches converted in parallel
//! on the worker pool. Each batch result is written into pre-sized
//! destinations at `batch_index * batch_size + offset`, so the merged order is
//! the source row order no matter which batch finishes first.

use super::{telemetry, DataItem};
use crate::connector::StoreResponse;
use crate::pool::WorkerPool;
use crate::schema::{parse_time, Value, TIMESTAMP_COLUMN};
use crate::{Error, Result};

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;

/// Contiguous row ranges of at most `batch_size` rows covering `0..len`
pub fn partition_bounds(len: usize, batch_size: usize) -> Vec<Range<usize>> {
    let batch_size = batch_size.max(1);
    (0..len)
        .step_by(batch_size)
        .map(|start| start..(start + batch_size).min(len))
        .collect()
}

/// Where the timestamp and the value columns sit in a response
#[derive(Debug, Clone)]
struct ColumnLayout {
    ts_index: usize,
    /// (cell index, column name) for every non-`ts` column, in head order
    columns: Vec<(usize, String)>,
}

impl ColumnLayout {
    fn of(head: &[String]) -> Result<Self> {
        let ts_index = head
            .iter()
            .position(|name| name == TIMESTAMP_COLUMN)
            .ok_or_else(|| {
                Error::Query(format!("response has no '{}' column", TIMESTAMP_COLUMN))
            })?;
        let columns = head
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != ts_index)
            .map(|(idx, name)| (idx, name.clone()))
            .collect();
        Ok(Self { ts_index, columns })
    }
}

fn row_time(cell: Option<&Value>, row_no: usize, layout: Option<&str>) -> Result<DateTime<Utc>> {
    match cell {
        Some(Value::Timestamp(t)) => Ok(*t),
        Some(Value::String(raw)) => parse_time(layout.unwrap_or("rfc3339"), raw)
            .map_err(|reason| Error::Query(format!("row {}: {}", row_no, reason))),
        Some(Value::Int(millis)) => DateTime::from_timestamp_millis(*millis)
            .ok_or_else(|| Error::Query(format!("row {}: timestamp {} out of range", row_no, millis))),
        other => Err(Error::Query(format!(
            "row {}: invalid {} cell {:?}",
            row_no, TIMESTAMP_COLUMN, other
        ))),
    }
}

/// Convert `rows` into one series per column; `first_row` only labels errors.
fn convert_batch(
    rows: &[Vec<Value>],
    first_row: usize,
    layout: &ColumnLayout,
    time_layout: Option<&str>,
) -> Result<Vec<Vec<DataItem>>> {
    let mut series: Vec<Vec<DataItem>> = layout
        .columns
        .iter()
        .map(|_| Vec::with_capacity(rows.len()))
        .collect();
    for (offset, row) in rows.iter().enumerate() {
        let time = row_time(row.get(layout.ts_index), first_row + offset, time_layout)?;
        for (slot, (cell_idx, _)) in layout.columns.iter().enumerate() {
            series[slot].push(DataItem {
                time,
                value: row.get(*cell_idx).cloned().unwrap_or(Value::Null),
            });
        }
    }
    Ok(series)
}

fn into_map(layout: &ColumnLayout, series: Vec<Vec<DataItem>>) -> BTreeMap<String, Vec<DataItem>> {
    layout
        .columns
        .iter()
        .map(|(_, name)| name.clone())
        .zip(series)
        .collect()
}

/// Single-threaded conversion of a whole response.
pub fn convert_rows(
    response: &StoreResponse,
    time_layout: Option<&str>,
) -> Result<BTreeMap<String, Vec<DataItem>>> {
    let layout = ColumnLayout::of(&response.head)?;
    let series = convert_batch(&response.rows, 0, &layout, time_layout)?;
    Ok(into_map(&layout, series))
}

/// Parallel converter bound to a worker pool
#[derive(Debug, Clone)]
pub struct ResultMarshaller {
    pool: WorkerPool,
    batch_size: usize,
    time_layout: Option<Arc<str>>,
}

impl ResultMarshaller {
    pub fn new(pool: WorkerPool, batch_size: usize, time_layout: Option<String>) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
            time_layout: time_layout.map(Arc::from),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Convert `response` into one series per non-`ts` column, preserving
    /// row order.
    pub async fn marshal(&self, response: StoreResponse) -> Result<BTreeMap<String, Vec<DataItem>>> {
        let total = response.rows.len();
        if total <= self.batch_size {
            telemetry::record_marshal(total as u64, 1);
            return convert_rows(&response, self.time_layout.as_deref());
        }

        let layout = Arc::new(ColumnLayout::of(&response.head)?);
        let rows = Arc::new(response.rows);
        let bounds = partition_bounds(total, self.batch_size);
        debug!(rows = total, batches = bounds.len(), "Marshalling in parallel");
        telemetry::record_marshal(total as u64, bounds.len() as u64);

        let mut handles = Vec::with_capacity(bounds.len());
        for (batch_index, range) in bounds.into_iter().enumerate() {
            let rows = Arc::clone(&rows);
            let layout = Arc::clone(&layout);
            let time_layout = self.time_layout.clone();
            let handle = self.pool.try_spawn_blocking(move || {
                let start = range.start;
                convert_batch(&rows[range], start, &layout, time_layout.as_deref())
                    .map(|series| (batch_index, series))
            })?;
            handles.push(handle);
        }

        let mut merged: Vec<Vec<Option<DataItem>>> =
            layout.columns.iter().map(|_| vec![None; total]).collect();
        for handle in handles {
            let (batch_index, series) = handle
                .await
                .map_err(|e| Error::Internal(format!("marshal batch failed: {}", e)))??;
            let base = batch_index * self.batch_size;
            for (slot, items) in series.into_iter().enumerate() {
                for (offset, item) in items.into_iter().enumerate() {
                    merged[slot][base + offset] = Some(item);
                }
            }
        }

        let mut series = Vec::with_capacity(merged.len());
        for column in merged {
            let items = column
                .into_iter()
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| Error::Internal("marshal batches left a gap".to_string()))?;
            series.push(items);
        }
        Ok(into_map(&layout, series))
    }
}
