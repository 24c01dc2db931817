//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate unique request IDs (UUID v4)
//! - Compute the upstream URI for a resolved route
//! - Strip hop-by-hop headers and add `X-Forwarded-*`
//!
//! # Design Decisions
//! - Resolution works on the decoded path; the forwarded path keeps the
//!   client's original escaping
//! - Prefix stripping removes whole segments, so `/` strips nothing

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Uri};
use percent_encoding::percent_decode_str;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::routing::trie::split_path;
use crate::routing::Resolved;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_FORWARDED_PORT: HeaderName = HeaderName::from_static("x-forwarded-port");

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Generates `x-request-id` values for requests that arrive without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Request ID of a request, or `"unknown"`.
pub fn request_id<B>(request: &Request<B>) -> String {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Settings that shape the forwarded request.
#[derive(Debug, Clone)]
pub struct ForwardOptions {
    pub include_prefix: bool,
    pub prepend_path: bool,
    pub x_forward: bool,
    pub host_routing: bool,
    /// Whether the proxy listener itself terminates TLS.
    pub secure: bool,
    pub custom_headers: HeaderMap,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl ForwardOptions {
    pub fn from_config(config: &ProxyConfig) -> Self {
        let mut custom_headers = HeaderMap::new();
        for (name, value) in &config.routing.custom_headers {
            match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
                (Ok(name), Ok(value)) => {
                    custom_headers.insert(name, value);
                }
                _ => tracing::warn!(header = %name, "Ignoring invalid custom header"),
            }
        }

        Self {
            include_prefix: config.routing.include_prefix,
            prepend_path: config.routing.prepend_path,
            x_forward: config.routing.x_forward,
            host_routing: config.routing.host_routing,
            secure: config.listener.tls.is_some(),
            custom_headers,
            connect_timeout: Duration::from_secs(config.timeouts.connect_secs),
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
        }
    }
}

impl Default for ForwardOptions {
    fn default() -> Self {
        Self::from_config(&ProxyConfig::default())
    }
}

/// Build the URI a request is forwarded to.
pub fn upstream_uri(resolved: &Resolved, uri: &Uri, opts: &ForwardOptions) -> Result<Uri, ProxyError> {
    let target: Uri = resolved
        .target
        .parse()
        .map_err(|e| ProxyError::HandlerFault(format!("invalid target {:?}: {e}", resolved.target)))?;
    let (Some(scheme), Some(authority)) = (target.scheme_str(), target.authority()) else {
        return Err(ProxyError::HandlerFault(format!(
            "target {:?} has no scheme or host",
            resolved.target
        )));
    };

    let path = forwarded_path(&resolved.prefix, target.path(), uri.path(), opts);
    let mut upstream = format!("{scheme}://{authority}{path}");
    if let Some(query) = uri.query() {
        upstream.push('?');
        upstream.push_str(query);
    }

    upstream
        .parse()
        .map_err(|e| ProxyError::HandlerFault(format!("invalid upstream uri {upstream:?}: {e}")))
}

/// Path sent upstream: optional target path, then the (optionally stripped) raw path.
pub fn forwarded_path(prefix: &str, target_path: &str, raw_path: &str, opts: &ForwardOptions) -> String {
    let rest = if opts.include_prefix {
        raw_path
    } else {
        let mut segments = split_path(prefix);
        if opts.host_routing && !segments.is_empty() {
            // The first prefix segment is the host, which is not part of the path.
            segments.remove(0);
        }
        strip_prefix_segments(raw_path, &segments)
    };

    let base = if opts.prepend_path {
        target_path.trim_end_matches('/')
    } else {
        ""
    };

    let joined = format!("{base}{rest}");
    if joined.is_empty() {
        "/".to_string()
    } else {
        joined
    }
}

/// Strip the raw segments whose decoded text spells `prefix`.
///
/// A raw segment may decode to several prefix segments (`a%2Fb` is `a/b`),
/// so segments are consumed until the decoded text matches, not counted.
/// Returns `raw_path` unchanged when it does not start with the prefix.
fn strip_prefix_segments<'a>(raw_path: &'a str, prefix: &[&str]) -> &'a str {
    if prefix.is_empty() {
        return raw_path;
    }
    let wanted = format!("/{}", prefix.join("/"));

    let mut decoded = String::new();
    let mut rest = raw_path;
    loop {
        if rest.is_empty() {
            return raw_path;
        }
        let trimmed = rest.strip_prefix('/').unwrap_or(rest);
        let (segment, remainder) = match trimmed.find('/') {
            Some(end) => (&trimmed[..end], &trimmed[end..]),
            None => (trimmed, ""),
        };
        decoded.push('/');
        decoded.push_str(&percent_decode_str(segment).decode_utf8_lossy());
        rest = remainder;

        if decoded == wanted {
            return rest;
        }
        if decoded.len() >= wanted.len() {
            return raw_path;
        }
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::try_from(name.trim()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Add the configured static headers, replacing client-sent values.
pub fn apply_custom_headers(headers: &mut HeaderMap, custom: &HeaderMap) {
    for (name, value) in custom {
        headers.insert(name.clone(), value.clone());
    }
}

/// Add `X-Forwarded-For/Proto/Host/Port`.
pub fn add_forwarded_headers(headers: &mut HeaderMap, client: Option<SocketAddr>, proto: &str) {
    if let Some(client) = client {
        let ip = client.ip().to_string();
        let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) => format!("{existing}, {ip}"),
            None => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    if !headers.contains_key(&X_FORWARDED_PROTO) {
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static(static_proto(proto)));
    }

    if let Some(host) = headers.get(header::HOST).cloned() {
        let port = host
            .to_str()
            .ok()
            .and_then(|h| h.rsplit_once(':'))
            .filter(|(_, port)| port.chars().all(|c| c.is_ascii_digit()))
            .map(|(_, port)| port.to_string())
            .unwrap_or_else(|| default_port(proto).to_string());
        if !headers.contains_key(&X_FORWARDED_HOST) {
            headers.insert(X_FORWARDED_HOST, host);
        }
        if !headers.contains_key(&X_FORWARDED_PORT) {
            if let Ok(port) = HeaderValue::from_str(&port) {
                headers.insert(X_FORWARDED_PORT, port);
            }
        }
    }
}

fn static_proto(proto: &str) -> &'static str {
    match proto {
        "https" => "https",
        "ws" => "ws",
        "wss" => "wss",
        _ => "http",
    }
}

fn default_port(proto: &str) -> &'static str {
    match proto {
        "https" | "wss" => "443",
        _ => "80",
    }
}

/// True when the request asks to be upgraded to a WebSocket.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let upgrade = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    let connection = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    upgrade && connection
}
