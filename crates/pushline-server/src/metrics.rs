//! Metrics collection and export for Pushline.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use pushline_core::{CloseReason, HubObserver, RouteOutcome, SessionSummary};
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "pushline_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "pushline_connections_active";
    pub const DISCONNECTS_TOTAL: &str = "pushline_disconnects_total";
    pub const FRAMES_TOTAL: &str = "pushline_frames_total";
    pub const FRAMES_DROPPED: &str = "pushline_frames_dropped_total";
    pub const DELIVERIES_TOTAL: &str = "pushline_deliveries_total";
    pub const DELIVERY_FAILURES: &str = "pushline_delivery_failures_total";
    pub const ERRORS_TOTAL: &str = "pushline_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    // Describe metrics
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(
        names::DISCONNECTS_TOTAL,
        "Connections closed, by close reason"
    );
    metrics::describe_counter!(names::FRAMES_TOTAL, "Text frames processed, by direction");
    metrics::describe_counter!(
        names::FRAMES_DROPPED,
        "Inbound frames discarded, by reason"
    );
    metrics::describe_counter!(
        names::DELIVERIES_TOTAL,
        "Envelope copies handed to recipient connections"
    );
    metrics::describe_counter!(
        names::DELIVERY_FAILURES,
        "Envelope copies that could not be written"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record text frames.
pub fn record_frames(count: u64, direction: &'static str) {
    counter!(names::FRAMES_TOTAL, "direction" => direction).increment(count);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Records routing and close events reported by the hub.
pub struct MetricsObserver;

impl HubObserver for MetricsObserver {
    fn on_route(&self, outcome: &RouteOutcome) {
        record_frames(1, "inbound");

        match outcome {
            RouteOutcome::Delivered { delivery, .. } => {
                counter!(names::DELIVERIES_TOTAL).increment(delivery.delivered as u64);
                if delivery.failed() > 0 {
                    counter!(names::DELIVERY_FAILURES).increment(delivery.failed() as u64);
                }
            }
            RouteOutcome::NoTarget(_) | RouteOutcome::Malformed | RouteOutcome::UnknownAction(_) => {
                counter!(names::FRAMES_DROPPED, "reason" => outcome.label()).increment(1);
            }
        }
    }

    fn on_close(&self, summary: &SessionSummary) {
        record_frames(summary.frames_out, "outbound");
        counter!(names::DISCONNECTS_TOTAL, "reason" => summary.reason.as_str()).increment(1);

        match summary.reason {
            CloseReason::TransportError => record_error("transport"),
            CloseReason::WriteFailed => record_error("write"),
            CloseReason::PeerClosed | CloseReason::HeartbeatTimeout => {}
        }
    }
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
