//! Prometheus Metrics Module
//!
//! Exposes ingest and emission counters via Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Feed**: Frames received from the WebSocket
//! - **Ingest**: Bars accepted, skipped by reason, evicted by retention
//! - **Window**: Current size and order flag
//! - **Emission**: Ticks by mode and lines written
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::emission::EmissionMode;
use crate::domain::window::IngestReport;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "aggregate_window_frames_received_total",
        "Total text frames received from the feed"
    );
    describe_counter!(
        "aggregate_window_records_ingested_total",
        "Total aggregate bars added to the window"
    );
    describe_counter!(
        "aggregate_window_records_skipped_total",
        "Total elements dropped before reaching the window, by reason"
    );
    describe_counter!(
        "aggregate_window_records_evicted_total",
        "Total bars dropped by the retention policy"
    );
    describe_gauge!(
        "aggregate_window_window_size",
        "Number of bars currently in the window"
    );
    describe_gauge!(
        "aggregate_window_order_preserved",
        "1 if the last bar arrived in window order, 0 otherwise"
    );
    describe_counter!(
        "aggregate_window_emissions_total",
        "Total print ticks by emission mode"
    );
    describe_counter!(
        "aggregate_window_lines_emitted_total",
        "Total lines written to the output sink"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a frame read off the WebSocket.
pub fn record_frame_received() {
    counter!("aggregate_window_frames_received_total").increment(1);
}

/// Record elements dropped before reaching the window.
pub fn record_skipped(reason: &'static str, count: u64) {
    if count > 0 {
        counter!("aggregate_window_records_skipped_total", "reason" => reason).increment(count);
    }
}

/// Record the outcome of one ingest call.
pub fn record_ingest(report: &IngestReport) {
    counter!("aggregate_window_records_ingested_total").increment(report.accepted as u64);
    record_skipped("missing_symbol", report.skipped_missing_symbol as u64);
    record_skipped("malformed", report.skipped_malformed as u64);
    if report.evicted > 0 {
        counter!("aggregate_window_records_evicted_total").increment(report.evicted as u64);
    }
}

/// Update the window gauges.
#[allow(clippy::cast_precision_loss)]
pub fn set_window_state(len: usize, order_preserved: bool) {
    gauge!("aggregate_window_window_size").set(len as f64);
    gauge!("aggregate_window_order_preserved").set(if order_preserved { 1.0 } else { 0.0 });
}

/// Record a print tick.
pub fn record_emission(mode: EmissionMode, lines: usize) {
    counter!("aggregate_window_emissions_total", "mode" => mode.as_str()).increment(1);
    if lines > 0 {
        counter!("aggregate_window_lines_emitted_total").increment(lines as u64);
    }
}

// =============================================================================
// Tests
// =============================================================================
