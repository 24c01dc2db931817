//! Target resolution for inbound requests.
//!
//! # Responsibilities
//! - Build the lookup key (decoded path, optionally host-prefixed)
//! - Ask the store for the longest matching prefix
//! - Return the matched prefix and target, or an explicit no-match
//!
//! # Design Decisions
//! - Paths are percent-decoded before lookup; prefixes are stored decoded
//! - Host routing is a key transformation (`/<host><path>`), not a stored field

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::http::{header, Request};
use percent_encoding::percent_decode_str;

use crate::error::ProxyError;
use crate::observability::metrics::MetricsSink;
use crate::routing::store::RouteStore;

/// A resolved proxy target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Matched route prefix (host-prefixed under host routing).
    pub prefix: String,
    /// Backend base URL, held by value for the lifetime of the request.
    pub target: String,
}

/// Maps requests to route targets.
#[derive(Debug, Clone)]
pub struct TargetResolver {
    store: Arc<dyn RouteStore>,
    metrics: Arc<dyn MetricsSink>,
    host_routing: bool,
}

impl TargetResolver {
    pub fn new(store: Arc<dyn RouteStore>, metrics: Arc<dyn MetricsSink>, host_routing: bool) -> Self {
        Self {
            store,
            metrics,
            host_routing,
        }
    }

    pub fn host_routing(&self) -> bool {
        self.host_routing
    }

    /// Resolve the target for an inbound request.
    ///
    /// Only the host and path are read, before the first await, so the
    /// returned future does not borrow the request.
    pub fn resolve<B>(&self, request: &Request<B>) -> impl Future<Output = Result<Resolved, ProxyError>> + Send + 'static {
        let host = request_host(request);
        let path = request.uri().path().to_owned();
        let resolver = self.clone();
        async move { resolver.resolve_path(host.as_deref(), &path).await }
    }

    /// Resolve a raw (still-escaped) path, with the request host when known.
    pub async fn resolve_path(&self, host: Option<&str>, raw_path: &str) -> Result<Resolved, ProxyError> {
        let key = match self.lookup_key(host, raw_path) {
            Some(key) => key,
            None => return Err(ProxyError::NoRoute(raw_path.to_string())),
        };

        let start = Instant::now();
        let found = self.store.get_target(&key).await;
        self.metrics.find_target(start.elapsed());

        match found? {
            Some(matched) => Ok(Resolved {
                prefix: matched.prefix,
                target: matched.route.target,
            }),
            None => Err(ProxyError::NoRoute(key)),
        }
    }

    /// Lookup key for a request; `None` when host routing has no host to use.
    pub fn lookup_key(&self, host: Option<&str>, raw_path: &str) -> Option<String> {
        let path = percent_decode_str(raw_path).decode_utf8_lossy();
        if self.host_routing {
            let host = host.filter(|h| !h.is_empty())?;
            Some(format!("/{host}{path}"))
        } else {
            Some(path.into_owned())
        }
    }
}

/// Host of the request without its port.
///
/// Falls back to the URI authority for HTTP/2 requests that carry no
/// `Host` header.
pub fn request_host<B>(request: &Request<B>) -> Option<String> {
    let raw = request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.as_str().to_string()))?;
    Some(strip_port(&raw).to_string())
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal, keep the brackets.
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    host.split(':').next().unwrap_or(host)
}
