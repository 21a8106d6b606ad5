//! Prometheus Metrics Module
//!
//! Exposes ticker metrics in Prometheus format.
//!
//! # Metrics
//!
//! - **Ticks**: items applied to and rejected by the tick cache
//! - **Session**: connection state, scheduled reconnects, transport errors
//! - **Subscriptions**: size of the persisted set
//!
//! Rendered at `/metrics` on the HTTP server. Recording before
//! [`init_metrics`] is a no-op.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::session::TransportErrorKind;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if another global recorder is already installed.
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

fn register_metrics() {
    describe_counter!(
        "ticker_ticks_received_total",
        "Tick items stored in the tick cache"
    );
    describe_counter!(
        "ticker_ticks_rejected_total",
        "Tick items skipped because they failed to decode"
    );
    describe_histogram!("ticker_batch_size", "Items per tick batch");

    describe_gauge!("ticker_connected", "1 while the ticker transport is connected");
    describe_counter!(
        "ticker_reconnects_scheduled_total",
        "Reconnects scheduled after an unexpected disconnect"
    );
    describe_counter!(
        "ticker_transport_errors_total",
        "Transport errors by kind"
    );

    describe_gauge!("ticker_subscriptions", "Instruments in the persisted subscription set");
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record the outcome of one tick batch.
#[allow(clippy::cast_precision_loss)]
pub fn record_ticks(applied: usize, rejected: usize) {
    counter!("ticker_ticks_received_total").increment(to_u64(applied));
    if rejected > 0 {
        counter!("ticker_ticks_rejected_total").increment(to_u64(rejected));
    }
    histogram!("ticker_batch_size").record((applied + rejected) as f64);
}

/// Update the connection gauge.
pub fn set_connected(connected: bool) {
    gauge!("ticker_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record a scheduled reconnect.
pub fn record_reconnect_scheduled() {
    counter!("ticker_reconnects_scheduled_total").increment(1);
}

/// Record a transport error.
pub fn record_transport_error(kind: TransportErrorKind) {
    counter!("ticker_transport_errors_total", "kind" => kind.as_str()).increment(1);
}

/// Update the subscription gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscriptions(count: usize) {
    gauge!("ticker_subscriptions").set(count as f64);
}

fn to_u64(value: usize) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

// =============================================================================
// Tests
// =============================================================================
