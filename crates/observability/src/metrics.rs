//! Prometheus metrics endpoint.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to install prometheus exporter on {addr}: {source}")]
    Install {
        addr: SocketAddr,
        #[source]
        source: BuildError,
    },
}

/// Install the global metrics recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a tokio runtime. Fails if a recorder is already
/// installed.
pub fn install_prometheus(addr: SocketAddr) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|source| MetricsError::Install { addr, source })?;
    tracing::info!(%addr, "prometheus exporter listening");
    Ok(())
}
