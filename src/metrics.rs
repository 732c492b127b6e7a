//! Prometheus Metrics
//!
//! Renders registry statistics in the Prometheus text exposition format.
//! Gauges are registered on a fresh registry per scrape so nothing leaks
//! into the process-global default registry.

use crate::error::{Error, Result};
use crate::tracker::RegistryStatsSnapshot;
use prometheus::{Encoder, IntGauge, Registry, TextEncoder};

/// Content type of the rendered page
pub fn content_type() -> String {
    TextEncoder::new().format_type().to_string()
}

/// Render a statistics snapshot as a Prometheus text page
pub fn render(stats: &RegistryStatsSnapshot) -> Result<String> {
    let registry = Registry::new();

    let gauges = [
        ("volume_tracker_volumes", "Number of tracked volumes", stats.volumes),
        ("volume_tracker_peers", "Number of attached peers", stats.peers),
        ("volume_tracker_hosts", "Number of hosts with registered peers", stats.hosts),
        ("volume_tracker_attachments_total", "Peers attached since start", stats.attachments),
        ("volume_tracker_detachments_total", "Peers removed since start", stats.detachments),
        ("volume_tracker_pruned_total", "Peers torn down with a pending ancestor", stats.pruned),
        ("volume_tracker_confirmations_total", "Metadata confirmations since start", stats.confirmations),
    ];

    for (name, help, value) in gauges {
        let gauge = IntGauge::new(name, help).map_err(metrics_error)?;
        gauge.set(i64::try_from(value).unwrap_or(i64::MAX));
        registry
            .register(Box::new(gauge))
            .map_err(metrics_error)?;
    }

    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .map_err(metrics_error)?;

    String::from_utf8(buffer).map_err(|e| Error::Internal(format!("metrics are not UTF-8: {}", e)))
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics error: {}", e))
}
