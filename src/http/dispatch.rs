//! Proxy dispatch.
//!
//! ```text
//! RESOLVING ─┬─ no match ──────────────────────→ ERROR(404)
//!            └─ matched → FORWARDING ─┬─ ok ───→ DONE (activity if < 300)
//!                                     ├─ transport failure → ERROR(503)
//!                                     └─ handler fault ────→ ERROR(500)
//! ```
//!
//! Every ERROR goes through the [`ErrorReporter`], including panics raised
//! while forwarding (hooks included). The `CatchPanicLayer` installed in
//! `server.rs` only sees panics outside of that.

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;

use axum::body::Body;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::{header, HeaderValue, Request, Version};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::FutureExt;
use serde_json::json;

use crate::error::{BackendError, ProxyError};
use crate::http::error_page::RequestContext;
use crate::http::request::{
    add_forwarded_headers, apply_custom_headers, is_websocket_upgrade, request_id, strip_hop_by_hop,
    upstream_uri,
};
use crate::http::server::AppState;
use crate::http::websocket;
use crate::routing::Resolved;

/// Liveness path answered before routing.
pub const HEALTH_PATH: &str = "/_chp_healthz";

/// Kind of proxied traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    Web,
    Ws,
}

impl DispatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchKind::Web => "web",
            DispatchKind::Ws => "ws",
        }
    }
}

/// Observes and may rewrite a request after resolution, before any byte is
/// forwarded.
pub trait RequestHook: Send + Sync {
    fn on_request(&self, kind: DispatchKind, request: &mut Request<Body>);
}

impl<F> RequestHook for F
where
    F: Fn(DispatchKind, &mut Request<Body>) + Send + Sync,
{
    fn on_request(&self, kind: DispatchKind, request: &mut Request<Body>) {
        self(kind, request)
    }
}

/// `GET /_chp_healthz`.
pub async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "OK" }))
}

/// Fallback handler of the proxy router.
pub async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let kind = if is_websocket_upgrade(request.headers()) {
        state.metrics.request_ws();
        DispatchKind::Ws
    } else {
        state.metrics.request_web();
        DispatchKind::Web
    };

    let context = RequestContext::of(&request);
    let request_id = request_id(&request);

    let resolved = match state.resolver.resolve(&request).await {
        Ok(resolved) => resolved,
        Err(e) => return state.errors.report(e.status(), &context, Some(&e)).await,
    };

    tracing::debug!(
        request_id = %request_id,
        kind = kind.as_str(),
        uri = %context.uri,
        prefix = %resolved.prefix,
        target = %resolved.target,
        "Proxying request"
    );

    let forwarding = async {
        match kind {
            DispatchKind::Web => forward_web(&state, request, &resolved).await,
            DispatchKind::Ws => forward_ws(&state, request, &resolved).await,
        }
    };
    let result = match AssertUnwindSafe(forwarding).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(ProxyError::HandlerFault(panic_message(panic.as_ref()).to_string())),
    };

    match result {
        Ok(response) => response,
        Err(e) => state.errors.report(e.status(), &context, Some(&e)).await,
    }
}

/// Text of a panic payload, for logging.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
}

/// Header changes applied to every forwarded request, then the hooks.
fn prepare(state: &AppState, kind: DispatchKind, request: &mut Request<Body>) {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    // HTTP/2 requests carry the host in the URI only.
    if !request.headers().contains_key(header::HOST) {
        if let Some(authority) = request.uri().authority() {
            if let Ok(host) = HeaderValue::from_str(authority.as_str()) {
                request.headers_mut().insert(header::HOST, host);
            }
        }
    }

    apply_custom_headers(request.headers_mut(), &state.forward.custom_headers);

    if state.forward.x_forward {
        let proto = match (kind, state.forward.secure) {
            (DispatchKind::Web, false) => "http",
            (DispatchKind::Web, true) => "https",
            (DispatchKind::Ws, false) => "ws",
            (DispatchKind::Ws, true) => "wss",
        };
        add_forwarded_headers(request.headers_mut(), client, proto);
    }

    for hook in state.hooks.iter() {
        hook.on_request(kind, request);
    }
}

async fn forward_web(state: &AppState, mut request: Request<Body>, resolved: &Resolved) -> Result<Response, ProxyError> {
    prepare(state, DispatchKind::Web, &mut request);

    let uri = upstream_uri(resolved, request.uri(), &state.forward)?;
    let (mut parts, body) = request.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    parts.uri = uri;
    parts.version = Version::HTTP_11;
    let upstream_request = Request::from_parts(parts, body);

    let timeout = state.forward.request_timeout;
    let response = tokio::time::timeout(timeout, state.client.request(upstream_request))
        .await
        .map_err(|_| ProxyError::backend(&resolved.target, BackendError::Timeout(timeout)))?
        .map_err(|e| ProxyError::backend(&resolved.target, e))?;

    if response.status().as_u16() < 300 {
        state.activity.touch(&resolved.prefix).await;
    }

    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Ok(Response::from_parts(parts, Body::new(body)))
}

async fn forward_ws(state: &AppState, mut request: Request<Body>, resolved: &Resolved) -> Result<Response, ProxyError> {
    prepare(state, DispatchKind::Ws, &mut request);

    let uri = upstream_uri(resolved, request.uri(), &state.forward)?;
    let (mut parts, _body) = request.into_parts();
    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let upstream = websocket::connect(&uri, &parts.headers, state.forward.connect_timeout)
        .await
        .map_err(|e| ProxyError::backend(&resolved.target, e))?;

    let upgrade = match upstream.protocol {
        Some(protocol) => upgrade.protocols([protocol]),
        None => upgrade,
    };

    let prefix = resolved.prefix.clone();
    let activity = state.activity.clone();
    let socket = upstream.socket;
    Ok(upgrade
        .on_failed_upgrade(|e| tracing::warn!(error = %e, "Client WebSocket upgrade failed"))
        .on_upgrade(move |client| websocket::relay(client, socket, prefix, activity)))
}
