//! Defines abstract traits for metrics reporting, decoupling the proof-cycle
//! pipeline from the metrics backend.

use once_cell::sync::OnceCell;

// --- Static Sink Access ---

/// A no-op sink for use in tests or when telemetry is disabled.
#[derive(Debug, Clone, Copy)]
pub struct NopSink;

/// A lazily-initialized static reference to the global `MetricsSink` implementation.
pub static SINK: OnceCell<&'static dyn MetricsSink> = OnceCell::new();
static NOP_SINK: NopSink = NopSink;

/// Returns a static reference to the configured cycle metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn cycle_metrics() -> &'static dyn CycleMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured client/RPC metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn rpc_metrics() -> &'static dyn ClientMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured error metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn error_metrics() -> &'static dyn ErrorMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

// --- Trait Definitions ---

/// A sink for metrics tracking the lifecycle of a proof cycle (§4.6, §8).
pub trait CycleMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the count of proof cycles started (intent discovery succeeded).
    fn inc_cycles_started(&self);
    /// Increments the count of proof cycles that reached `Complete`.
    fn inc_cycles_completed(&self);
    /// Increments the count of proof cycles that reached `Failed`, labeled by
    /// the stage at which they failed and the error's classification.
    fn inc_cycles_failed(&self, stage: &'static str, kind: &'static str);
    /// Observes the wall-clock duration of a cycle from discovery to completion.
    fn observe_cycle_duration(&self, duration_secs: f64);
    /// Sets the gauge for the number of cycles currently in flight.
    fn set_active_cycles(&self, count: u64);
    /// Increments the count of attestations accepted toward a cycle's threshold.
    fn inc_attestations_received(&self);
    /// Increments the count of cycles whose BFT attestation threshold was reached.
    fn inc_attestation_thresholds_reached(&self);
    /// Observes a sealed anchor batch's transaction count.
    fn observe_batch_size(&self, size: f64);
    /// Increments the count of anchor batches sealed.
    fn inc_batches_sealed(&self);
    /// Increments the count of anchor transactions that reverted on-chain.
    fn inc_anchors_reverted(&self);
}
impl CycleMetricsSink for NopSink {
    fn inc_cycles_started(&self) {}
    fn inc_cycles_completed(&self) {}
    fn inc_cycles_failed(&self, _stage: &'static str, _kind: &'static str) {}
    fn observe_cycle_duration(&self, _duration_secs: f64) {}
    fn set_active_cycles(&self, _count: u64) {}
    fn inc_attestations_received(&self) {}
    fn inc_attestation_thresholds_reached(&self) {}
    fn observe_batch_size(&self, _size: f64) {}
    fn inc_batches_sealed(&self) {}
    fn inc_anchors_reverted(&self) {}
}

/// A sink for metrics related to outbound calls against external collaborators
/// (`LedgerClient`, `EvmClient` — §4.10).
pub trait ClientMetricsSink: Send + Sync + std::fmt::Debug {
    /// Observes the latency of a client call, labeled by client and route.
    fn observe_request_duration(&self, client: &str, route: &str, duration_secs: f64);
    /// Increments a counter for total client calls, labeled by client, route and outcome.
    fn inc_requests_total(&self, client: &str, route: &str, outcome: &'static str);
}
impl ClientMetricsSink for NopSink {
    fn observe_request_duration(&self, _client: &str, _route: &str, _duration_secs: f64) {}
    fn inc_requests_total(&self, _client: &str, _route: &str, _outcome: &'static str) {}
}

/// A sink for recording structured error metrics.
pub trait ErrorMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments a counter for a specific error, categorized by its kind and variant.
    fn inc_error(&self, kind: &'static str, variant: &'static str);
}
impl ErrorMetricsSink for NopSink {
    fn inc_error(&self, _kind: &'static str, _variant: &'static str) {}
}

/// A unified sink that implements all domain-specific traits, providing a single
/// point of implementation for metrics backends like Prometheus.
pub trait MetricsSink: CycleMetricsSink + ClientMetricsSink + ErrorMetricsSink {}

impl<T> MetricsSink for T where T: CycleMetricsSink + ClientMetricsSink + ErrorMetricsSink {}
