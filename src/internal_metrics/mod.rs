//! # Internal Metrics Module
//!
//! Installs the Prometheus recorder behind the `metrics` counters emitted by
//! `TracingObserver` and serves them on `/metrics`.
//!
//! - **`MetricsBuilder`**: installs the recorder, registers metric
//!   descriptions and binds the server's listener.
//! - **`MetricsServer`**: (Defined in `server.rs`) the `axum` server
//!   answering Prometheus scrapes.

use crate::config::MetricsConfig;
use crate::internal_metrics::server::MetricsServer;
use crate::observability::describe_metrics;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

pub mod server;

/// Builder for the metrics system.
pub struct MetricsBuilder {
    config: MetricsConfig,
}

impl MetricsBuilder {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Installs the global Prometheus recorder and prepares the server.
    ///
    /// Returns `None` when metrics are disabled or cannot be set up; the
    /// counters then fall back to the no-op recorder and the service keeps
    /// running.
    pub fn build(self, shutdown_rx: watch::Receiver<bool>) -> Option<(MetricsServer, SocketAddr)> {
        if !self.config.enabled {
            return None;
        }

        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        // Bind before installing so a busy port leaves the process recorder-free.
        let listener = match bind(self.config.listen_address) {
            Ok(listener) => listener,
            Err(e) => {
                error!(
                    "Failed to bind metrics server to {}: {}",
                    self.config.listen_address, e
                );
                return None;
            }
        };
        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                error!("Failed to get local address for metrics server: {}", e);
                return None;
            }
        };

        if let Err(e) = metrics::set_global_recorder(recorder) {
            error!("Failed to install Prometheus recorder: {}", e);
            return None;
        }
        describe_metrics();
        info!(%addr, "Serving Prometheus metrics on /metrics");

        Some((MetricsServer::new(listener, handle, shutdown_rx), addr))
    }
}

fn bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let listener = std::net::TcpListener::bind(addr)?;
    // Required before handing a std listener to Tokio.
    listener.set_nonblocking(true)?;
    TcpListener::from_std(listener)
}
