use anyhow::{Context, Result};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use proposal_worker::{LAG_BUCKETS_MS, LAG_METRIC};
use std::net::SocketAddr;
use tracing::info;

/// Install the global recorder and serve `/metrics` on `addr`.
///
/// Must run inside the tokio runtime; the listener is spawned onto it.
pub fn install_prometheus_exporter(addr: SocketAddr) -> Result<()> {
    let lag_buckets: Vec<f64> = LAG_BUCKETS_MS.iter().map(|bound| *bound as f64).collect();

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(Matcher::Full(LAG_METRIC.to_string()), &lag_buckets)
        .context("invalid lag histogram buckets")?
        .install()
        .context("failed to install Prometheus exporter")?;

    info!(%addr, "metrics exporter listening");
    Ok(())
}
