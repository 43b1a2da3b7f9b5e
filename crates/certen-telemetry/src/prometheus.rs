//! A concrete implementation of the metrics sinks using the Prometheus crate.

use crate::sinks::*;
use once_cell::sync::OnceCell;
use prometheus::{
    exponential_buckets, register_gauge, register_histogram, register_histogram_vec,
    register_int_counter, register_int_counter_vec, Gauge, Histogram, HistogramVec, IntCounter,
    IntCounterVec,
};

// --- Metric Statics ---
// Held in OnceCell, initialized exactly once by `install`.

static CYCLES_STARTED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static CYCLES_COMPLETED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static CYCLES_FAILED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static CYCLE_DURATION_SECONDS: OnceCell<Histogram> = OnceCell::new();
static CYCLES_ACTIVE: OnceCell<Gauge> = OnceCell::new();
static ATTESTATIONS_RECEIVED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static ATTESTATION_THRESHOLDS_REACHED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static BATCH_SIZE: OnceCell<Histogram> = OnceCell::new();
static BATCHES_SEALED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static ANCHORS_REVERTED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static CLIENT_REQUEST_DURATION_SECONDS: OnceCell<HistogramVec> = OnceCell::new();
static CLIENT_REQUESTS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static ERRORS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

#[derive(Debug, Clone, Copy)]
pub struct PrometheusSink;

/// Helper macro to reduce boilerplate for getting a metric from OnceCell.
/// This will panic if `install()` has not been called, which is intentional
/// as it indicates a critical application setup error.
macro_rules! get_metric {
    ($metric:ident) => {
        $metric
            .get()
            .expect("Prometheus sink not initialized. Call telemetry::prometheus::install() first.")
    };
}

impl CycleMetricsSink for PrometheusSink {
    fn inc_cycles_started(&self) {
        get_metric!(CYCLES_STARTED_TOTAL).inc();
    }
    fn inc_cycles_completed(&self) {
        get_metric!(CYCLES_COMPLETED_TOTAL).inc();
    }
    fn inc_cycles_failed(&self, stage: &'static str, kind: &'static str) {
        get_metric!(CYCLES_FAILED_TOTAL)
            .with_label_values(&[stage, kind])
            .inc();
    }
    fn observe_cycle_duration(&self, duration_secs: f64) {
        get_metric!(CYCLE_DURATION_SECONDS).observe(duration_secs);
    }
    fn set_active_cycles(&self, count: u64) {
        get_metric!(CYCLES_ACTIVE).set(count as f64);
    }
    fn inc_attestations_received(&self) {
        get_metric!(ATTESTATIONS_RECEIVED_TOTAL).inc();
    }
    fn inc_attestation_thresholds_reached(&self) {
        get_metric!(ATTESTATION_THRESHOLDS_REACHED_TOTAL).inc();
    }
    fn observe_batch_size(&self, size: f64) {
        get_metric!(BATCH_SIZE).observe(size);
    }
    fn inc_batches_sealed(&self) {
        get_metric!(BATCHES_SEALED_TOTAL).inc();
    }
    fn inc_anchors_reverted(&self) {
        get_metric!(ANCHORS_REVERTED_TOTAL).inc();
    }
}

impl ClientMetricsSink for PrometheusSink {
    fn observe_request_duration(&self, client: &str, route: &str, duration_secs: f64) {
        get_metric!(CLIENT_REQUEST_DURATION_SECONDS)
            .with_label_values(&[client, route])
            .observe(duration_secs);
    }
    fn inc_requests_total(&self, client: &str, route: &str, outcome: &'static str) {
        get_metric!(CLIENT_REQUESTS_TOTAL)
            .with_label_values(&[client, route, outcome])
            .inc();
    }
}

impl ErrorMetricsSink for PrometheusSink {
    fn inc_error(&self, kind: &'static str, variant: &'static str) {
        get_metric!(ERRORS_TOTAL)
            .with_label_values(&[kind, variant])
            .inc();
    }
}

/// Initializes all Prometheus metrics collectors and returns a static reference to the sink.
/// This function must be called only once at application startup.
#[allow(clippy::expect_used)]
pub fn install() -> Result<&'static dyn MetricsSink, prometheus::Error> {
    CYCLES_STARTED_TOTAL
        .set(register_int_counter!(
            "certen_cycles_started_total",
            "Total number of proof cycles started by intent discovery."
        )?)
        .expect("static already initialized");
    CYCLES_COMPLETED_TOTAL
        .set(register_int_counter!(
            "certen_cycles_completed_total",
            "Total number of proof cycles that reached Complete."
        )?)
        .expect("static already initialized");
    CYCLES_FAILED_TOTAL
        .set(register_int_counter_vec!(
            "certen_cycles_failed_total",
            "Total number of proof cycles that reached Failed, by stage and error kind.",
            &["stage", "kind"]
        )?)
        .expect("static already initialized");
    CYCLE_DURATION_SECONDS
        .set(register_histogram!(
            "certen_cycle_duration_seconds",
            "Wall-clock duration of a proof cycle from discovery to completion.",
            exponential_buckets(1.0, 2.0, 16)?
        )?)
        .expect("static already initialized");
    CYCLES_ACTIVE
        .set(register_gauge!(
            "certen_cycles_active",
            "Current number of proof cycles in flight."
        )?)
        .expect("static already initialized");
    ATTESTATIONS_RECEIVED_TOTAL
        .set(register_int_counter!(
            "certen_attestations_received_total",
            "Total number of validator attestations accepted toward a cycle's threshold."
        )?)
        .expect("static already initialized");
    ATTESTATION_THRESHOLDS_REACHED_TOTAL
        .set(register_int_counter!(
            "certen_attestation_thresholds_reached_total",
            "Total number of cycles whose BFT attestation threshold was reached."
        )?)
        .expect("static already initialized");
    BATCH_SIZE
        .set(register_histogram!(
            "certen_batch_size",
            "Transaction count of a sealed anchor batch.",
            exponential_buckets(1.0, 2.0, 12)?
        )?)
        .expect("static already initialized");
    BATCHES_SEALED_TOTAL
        .set(register_int_counter!(
            "certen_batches_sealed_total",
            "Total number of anchor batches sealed by the batch pipeline."
        )?)
        .expect("static already initialized");
    ANCHORS_REVERTED_TOTAL
        .set(register_int_counter!(
            "certen_anchors_reverted_total",
            "Total number of anchor transactions that reverted on-chain."
        )?)
        .expect("static already initialized");
    CLIENT_REQUEST_DURATION_SECONDS
        .set(register_histogram_vec!(
            "certen_client_request_duration_seconds",
            "Latency of outbound calls to external collaborators (ledger, EVM chain).",
            &["client", "route"],
            exponential_buckets(0.01, 2.0, 16)?
        )?)
        .expect("static already initialized");
    CLIENT_REQUESTS_TOTAL
        .set(register_int_counter_vec!(
            "certen_client_requests_total",
            "Total outbound client calls, by client, route and outcome.",
            &["client", "route", "outcome"]
        )?)
        .expect("static already initialized");
    ERRORS_TOTAL
        .set(register_int_counter_vec!(
            "certen_errors_total",
            "Total number of errors, categorized by kind and variant.",
            &["kind", "variant"]
        )?)
        .expect("static already initialized");

    static SINK: PrometheusSink = PrometheusSink;
    let _ = crate::sinks::SINK.set(&SINK);
    Ok(&SINK)
}
