//! Ingester telemetry instruments and recording helpers.

use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::KeyValue;
use std::sync::OnceLock;

struct IngesterInstruments {
    events: Counter<u64>,
    payload_bytes: Counter<u64>,
    ingest_duration_seconds: Histogram<f64>,
    stable_statements: Counter<u64>,
}

fn instruments() -> &'static IngesterInstruments {
    static INSTRUMENTS: OnceLock<IngesterInstruments> = OnceLock::new();
    INSTRUMENTS.get_or_init(|| {
        let meter = global::meter("stablebridge.ingester");
        IngesterInstruments {
            events: meter
                .u64_counter("stablebridge.ingester.events")
                .with_description("Events handled by outcome")
                .init(),
            payload_bytes: meter
                .u64_counter("stablebridge.ingester.payload.bytes")
                .with_description("Payload bytes of mapped events")
                .with_unit("By")
                .init(),
            ingest_duration_seconds: meter
                .f64_histogram("stablebridge.ingester.duration")
                .with_description("Map and insert latency per event")
                .with_unit("s")
                .init(),
            stable_statements: meter
                .u64_counter("stablebridge.ingester.stable_statements")
                .with_description("Supertable DDL statements by outcome")
                .init(),
        }
    })
}

pub fn record_event(outcome: &'static str, payload_bytes: u64, duration_seconds: f64) {
    let i = instruments();
    let attrs = [KeyValue::new("outcome", outcome)];
    i.events.add(1, &attrs);
    if outcome == "inserted" {
        i.payload_bytes.add(payload_bytes, &attrs);
    }
    i.ingest_duration_seconds.record(duration_seconds, &attrs);
}

pub fn record_stable_statement(outcome: &'static str) {
    instruments()
        .stable_statements
        .add(1, &[KeyValue::new("outcome", outcome)]);
}
