//! Per-route activity tracking.
//!
//! External idle-reaping reads `last_activity` through the control API
//! (`?inactive_since=`). Only successful traffic may move it forward.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::observability::metrics::MetricsSink;
use crate::routing::route::RoutePatch;
use crate::routing::store::RouteStore;

/// Records successful traffic against a route prefix.
#[derive(Debug, Clone)]
pub struct ActivityTracker {
    store: Arc<dyn RouteStore>,
    metrics: Arc<dyn MetricsSink>,
}

impl ActivityTracker {
    pub fn new(store: Arc<dyn RouteStore>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self { store, metrics }
    }

    /// Set `last_activity = now` on `prefix`.
    ///
    /// A route deleted while its connections are still open is left deleted;
    /// store failures are logged and swallowed.
    pub async fn touch(&self, prefix: &str) {
        let start = Instant::now();
        if let Err(e) = self.store.update(prefix, RoutePatch::touch(Utc::now())).await {
            tracing::warn!(prefix = %prefix, error = %e, "Failed to record route activity");
        }
        self.metrics.last_activity_updating(start.elapsed());
    }
}
