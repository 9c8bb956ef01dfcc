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

/// Events accepted by the router (counter, labels: type).
pub const HUB_EVENTS_TOTAL: &str = "hub_events_total";
/// Messages queued to connections (counter).
pub const HUB_DELIVERIES_TOTAL: &str = "hub_deliveries_total";
/// Connections dropped because their outbound queue was full or closed (counter).
pub const HUB_OVERFLOW_DISCONNECTS_TOTAL: &str = "hub_overflow_disconnects_total";
/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Registered connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Rejected upgrade requests (counter, labels: reason).
pub const WS_UPGRADE_REJECTIONS_TOTAL: &str = "ws_upgrade_rejections_total";
