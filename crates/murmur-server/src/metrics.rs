//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render the `/metrics` endpoint. Fails if a
/// global recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connection duration seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Response cycles started total (counter).
pub const CYCLES_TOTAL: &str = "cycles_total";
/// Response cycles abandoned mid-stream (counter).
pub const CYCLES_FAILED_TOTAL: &str = "cycles_failed_total";
/// Rejected inbound frames (counter, labels: reason).
pub const FRAMES_REJECTED_TOTAL: &str = "frames_rejected_total";
/// Events dropped because the connection had closed (counter).
pub const EVENTS_DROPPED_TOTAL: &str = "events_dropped_total";
