//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured fields: route, target, status, request_id)
//!     → metrics.rs (counters, histograms through a MetricsSink)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Callers always hold a valid `MetricsSink`; disabled means `NoopMetrics`
//! - Request ID flows from the inbound request to the backend and back

pub mod logging;
pub mod metrics;

pub use metrics::{MetricsSink, NoopMetrics, RecorderMetrics};
