//! Query-path telemetry instruments and recording helpers.

use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::KeyValue;
use std::sync::OnceLock;

struct QueryInstruments {
    fanout_requests: Counter<u64>,
    fanout_duration_seconds: Histogram<f64>,
    fanout_tasks: Histogram<u64>,
    fanout_results: Histogram<u64>,
    marshal_rows: Histogram<u64>,
    marshal_batches: Histogram<u64>,
    statements: Counter<u64>,
}

fn instruments() -> &'static QueryInstruments {
    static INSTRUMENTS: OnceLock<QueryInstruments> = OnceLock::new();
    INSTRUMENTS.get_or_init(|| {
        let meter = global::meter("stablebridge.query");
        QueryInstruments {
            fanout_requests: meter
                .u64_counter("stablebridge.query.requests")
                .with_description("Fan-out query calls by outcome")
                .init(),
            fanout_duration_seconds: meter
                .f64_histogram("stablebridge.query.duration")
                .with_description("Fan-out query end-to-end latency")
                .with_unit("s")
                .init(),
            fanout_tasks: meter
                .u64_histogram("stablebridge.query.tasks")
                .with_description("Tasks dispatched per fan-out call")
                .init(),
            fanout_results: meter
                .u64_histogram("stablebridge.query.results")
                .with_description("Column results returned per fan-out call")
                .init(),
            marshal_rows: meter
                .u64_histogram("stablebridge.query.marshal.rows")
                .with_description("Rows converted per store response")
                .init(),
            marshal_batches: meter
                .u64_histogram("stablebridge.query.marshal.batches")
                .with_description("Parallel batches per store response")
                .init(),
            statements: meter
                .u64_counter("stablebridge.query.statements")
                .with_description("Statements sent to the store by kind and outcome")
                .init(),
        }
    })
}

pub struct FanoutMetrics {
    pub outcome: &'static str,
    pub error_class: Option<&'static str>,
    pub duration_seconds: f64,
    pub tasks: u64,
    pub results: u64,
}

pub fn record_fanout(metrics: FanoutMetrics) {
    let i = instruments();
    let mut attrs = vec![KeyValue::new("outcome", metrics.outcome)];
    if let Some(error_class) = metrics.error_class {
        attrs.push(KeyValue::new("error.class", error_class));
    }

    i.fanout_requests.add(1, &attrs);
    i.fanout_duration_seconds.record(metrics.duration_seconds, &attrs);
    i.fanout_tasks.record(metrics.tasks, &attrs);
    i.fanout_results.record(metrics.results, &attrs);
}

pub fn record_marshal(rows: u64, batches: u64) {
    let i = instruments();
    i.marshal_rows.record(rows, &[]);
    i.marshal_batches.record(batches, &[]);
}

pub fn record_statement(kind: &'static str, outcome: &'static str) {
    instruments().statements.add(
        1,
        &[KeyValue::new("kind", kind), KeyValue::new("outcome", outcome)],
    );
}
