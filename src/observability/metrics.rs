//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define the counters and timers the proxy reports
//! - Provide a no-op sink so callers never hold an optional recorder
//! - Install the Prometheus exporter when enabled
//!
//! # Metrics
//! - `requests_web`, `requests_ws` (counter): proxied requests by kind
//! - `requests_proxy{status}` (counter): error substitutions by status
//! - `requests_api{status}` (counter): control API responses by status
//! - `api_route_get`, `api_route_add`, `api_route_delete` (counter)
//! - `find_target_for_req`, `last_activity_updating` (histogram, seconds)

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Sink for proxy metrics.
pub trait MetricsSink: Send + Sync + std::fmt::Debug {
    fn request_web(&self);
    fn request_ws(&self);
    fn request_proxy(&self, status: u16);
    fn request_api(&self, status: u16);
    fn api_route_get(&self);
    fn api_route_add(&self);
    fn api_route_delete(&self);
    fn find_target(&self, elapsed: Duration);
    fn last_activity_updating(&self, elapsed: Duration);
}

/// Discards everything. Used when metrics are disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn request_web(&self) {}
    fn request_ws(&self) {}
    fn request_proxy(&self, _status: u16) {}
    fn request_api(&self, _status: u16) {}
    fn api_route_get(&self) {}
    fn api_route_add(&self) {}
    fn api_route_delete(&self) {}
    fn find_target(&self, _elapsed: Duration) {}
    fn last_activity_updating(&self, _elapsed: Duration) {}
}

/// Reports through the global `metrics` recorder.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecorderMetrics;

impl MetricsSink for RecorderMetrics {
    fn request_web(&self) {
        metrics::counter!("requests_web").increment(1);
    }

    fn request_ws(&self) {
        metrics::counter!("requests_ws").increment(1);
    }

    fn request_proxy(&self, status: u16) {
        metrics::counter!("requests_proxy", "status" => status.to_string()).increment(1);
    }

    fn request_api(&self, status: u16) {
        metrics::counter!("requests_api", "status" => status.to_string()).increment(1);
    }

    fn api_route_get(&self) {
        metrics::counter!("api_route_get").increment(1);
    }

    fn api_route_add(&self) {
        metrics::counter!("api_route_add").increment(1);
    }

    fn api_route_delete(&self) {
        metrics::counter!("api_route_delete").increment(1);
    }

    fn find_target(&self, elapsed: Duration) {
        metrics::histogram!("find_target_for_req").record(elapsed.as_secs_f64());
    }

    fn last_activity_updating(&self, elapsed: Duration) {
        metrics::histogram!("last_activity_updating").record(elapsed.as_secs_f64());
    }
}

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}
