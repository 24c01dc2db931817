//! Error substitution for failed proxy requests.
//!
//! Strategies, first match wins:
//! 1. `error_target`: `GET <error_target>/<code>?url=<original url>`, body streamed back
//! 2. `error_path`: `<code>.html`, then `error.html`
//! 3. bare status with its reason phrase
//!
//! A failing strategy falls back to the bare response; the client always
//! receives the original status code.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use url::Url;

use crate::config::ErrorPageConfig;
use crate::error::ProxyError;
use crate::observability::metrics::MetricsSink;

/// Request line of the request that failed.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
}

impl RequestContext {
    pub fn of<B>(request: &Request<B>) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
        }
    }
}

/// Produces the response for a request that could not be proxied.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    client: Client<HttpConnector, Body>,
    error_target: Option<Url>,
    error_path: Option<PathBuf>,
    timeout: Duration,
    metrics: Arc<dyn MetricsSink>,
}

impl ErrorReporter {
    pub fn new(
        config: &ErrorPageConfig,
        client: Client<HttpConnector, Body>,
        timeout: Duration,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let error_target = config.error_target.as_deref().and_then(|target| match Url::parse(target) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(error_target = %target, error = %e, "Ignoring invalid error target");
                None
            }
        });

        Self {
            client,
            error_target,
            error_path: config.error_path.clone(),
            timeout,
            metrics,
        }
    }

    /// Log the failure and build the substitute response.
    pub async fn report(&self, status: StatusCode, request: &RequestContext, error: Option<&ProxyError>) -> Response {
        match error {
            Some(e @ ProxyError::NoRoute(_)) => {
                tracing::info!(status = status.as_u16(), method = %request.method, uri = %request.uri, error = %e, "No route");
            }
            Some(e) if e.is_transient() => {
                tracing::warn!(status = status.as_u16(), method = %request.method, uri = %request.uri, error = %e, "Proxy error");
            }
            Some(e) => {
                tracing::error!(status = status.as_u16(), method = %request.method, uri = %request.uri, error = ?e, "Proxy error");
            }
            None => {
                tracing::error!(status = status.as_u16(), method = %request.method, uri = %request.uri, "Proxy error");
            }
        }
        self.metrics.request_proxy(status.as_u16());

        if let Some(target) = &self.error_target {
            return match self.fetch_error_page(target, status, &request.uri).await {
                Ok(response) => response,
                Err(reason) => {
                    tracing::error!(error_target = %target, error = %reason, "Failed to get custom error page");
                    default_response(status)
                }
            };
        }

        if let Some(dir) = &self.error_path {
            return match read_error_file(dir, status).await {
                Some(html) => (
                    status,
                    [(header::CONTENT_TYPE, HeaderValue::from_static("text/html"))],
                    html,
                )
                    .into_response(),
                None => default_response(status),
            };
        }

        default_response(status)
    }

    async fn fetch_error_page(&self, target: &Url, status: StatusCode, original: &Uri) -> Result<Response, String> {
        let url = error_page_url(target, status, original);
        let uri: Uri = url.as_str().parse().map_err(|e| format!("{e}"))?;
        let request = Request::get(uri).body(Body::empty()).map_err(|e| e.to_string())?;

        let upstream = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| format!("timed out after {:?}", self.timeout))?
            .map_err(|e| e.to_string())?;

        let (parts, body) = upstream.into_parts();
        let mut response = Response::new(Body::new(body));
        *response.status_mut() = status;
        for name in [header::CONTENT_TYPE, header::CONTENT_ENCODING] {
            if let Some(value) = parts.headers.get(&name) {
                response.headers_mut().insert(name, value.clone());
            }
        }
        Ok(response)
    }
}

/// `<target>/<code>?url=<original url>`, escaping the original URL as a query value.
pub fn error_page_url(target: &Url, status: StatusCode, original: &Uri) -> Url {
    let mut url = target.clone();
    let path = format!("{}/{}", target.path().trim_end_matches('/'), status.as_u16());
    url.set_path(&path);
    let original = original
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    url.query_pairs_mut().clear().append_pair("url", original);
    url
}

async fn read_error_file(dir: &Path, status: StatusCode) -> Option<Vec<u8>> {
    let specific = dir.join(format!("{}.html", status.as_u16()));
    match tokio::fs::read(&specific).await {
        Ok(html) => return Some(html),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(file = %specific.display(), "No error file");
        }
        Err(e) => {
            tracing::error!(file = %specific.display(), error = %e, "Error reading error file");
            return None;
        }
    }

    let generic = dir.join("error.html");
    match tokio::fs::read(&generic).await {
        Ok(html) => Some(html),
        Err(e) => {
            tracing::error!(file = %generic.display(), error = %e, "No error file");
            None
        }
    }
}

/// Bare status with its standard reason phrase as the body.
pub fn default_response(status: StatusCode) -> Response {
    (status, status.canonical_reason().unwrap_or_default()).into_response()
}
