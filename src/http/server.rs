//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the proxy router (health check + dispatch fallback)
//! - Build the control API router
//! - Wire up middleware (request ID, tracing, panic boundary)
//! - Serve both listeners until shutdown

use std::any::Any;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderName, StatusCode};
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::admin::{self, ApiState};
use crate::config::{ProxyConfig, TlsConfig};
use crate::http::dispatch::{healthz, panic_message, proxy_handler, RequestHook, HEALTH_PATH};
use crate::http::error_page::{default_response, ErrorReporter};
use crate::http::request::{ForwardOptions, MakeRequestUuid, X_REQUEST_ID};
use crate::lifecycle::Shutdown;
use crate::net::{self, tls::load_tls_config};
use crate::observability::metrics::{MetricsSink, NoopMetrics};
use crate::routing::{ActivityTracker, RouteData, RouteStore, StoreError, TargetResolver};

/// Application state injected into proxy handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: TargetResolver,
    pub activity: ActivityTracker,
    pub errors: ErrorReporter,
    pub client: Client<HttpConnector, Body>,
    pub hooks: Arc<[Arc<dyn RequestHook>]>,
    pub forward: Arc<ForwardOptions>,
    pub metrics: Arc<dyn MetricsSink>,
}

/// The proxy and its control API.
pub struct HttpServer {
    config: ProxyConfig,
    store: Arc<dyn RouteStore>,
    metrics: Arc<dyn MetricsSink>,
    hooks: Vec<Arc<dyn RequestHook>>,
}

impl HttpServer {
    /// Create a server with the store selected by `config.storage`.
    pub fn new(config: ProxyConfig) -> Self {
        let store = config.storage.backend.build();
        Self {
            config,
            store,
            metrics: Arc::new(NoopMetrics),
            hooks: Vec::new(),
        }
    }

    /// Use an externally constructed route store.
    pub fn with_store(mut self, store: Arc<dyn RouteStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Register a hook run on every matched request before forwarding.
    pub fn with_hook(mut self, hook: impl RequestHook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn store(&self) -> Arc<dyn RouteStore> {
        self.store.clone()
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Register `routing.default_target` at `/`, if configured.
    pub async fn install_default_route(&self) -> Result<(), StoreError> {
        if let Some(target) = &self.config.routing.default_target {
            tracing::info!(target = %target, "Setting default route");
            self.store.add("/", RouteData::new(target.clone())).await?;
        }
        Ok(())
    }

    /// Router for the public proxy listener.
    pub fn proxy_router(&self) -> Router {
        let timeouts = &self.config.timeouts;

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let errors = ErrorReporter::new(
            &self.config.errors,
            client.clone(),
            Duration::from_secs(timeouts.request_secs),
            self.metrics.clone(),
        );

        let state = AppState {
            resolver: TargetResolver::new(
                self.store.clone(),
                self.metrics.clone(),
                self.config.routing.host_routing,
            ),
            activity: ActivityTracker::new(self.store.clone(), self.metrics.clone()),
            errors,
            client,
            hooks: self.hooks.clone().into(),
            forward: Arc::new(ForwardOptions::from_config(&self.config)),
            metrics: self.metrics.clone(),
        };

        with_common_layers(
            Router::new()
                .route(HEALTH_PATH, any(healthz))
                .fallback(proxy_handler)
                .with_state(state),
        )
    }

    /// Router for the control API listener.
    pub fn api_router(&self) -> Router {
        let state = ApiState {
            store: self.store.clone(),
            metrics: self.metrics.clone(),
            auth_token: self.config.api.auth_token.as_deref().map(Arc::from),
        };
        with_common_layers(admin::api_router(state, Duration::from_secs(self.config.timeouts.request_secs)))
    }

    /// Serve the proxy and API listeners until `shutdown` fires.
    pub async fn run(self, proxy: TcpListener, api: TcpListener, shutdown: &Shutdown) -> io::Result<()> {
        self.install_default_route()
            .await
            .map_err(io::Error::other)?;

        let proxy_tls = load_optional_tls(self.config.listener.tls.as_ref()).await?;
        let api_tls = load_optional_tls(self.config.api.tls.as_ref()).await?;

        tracing::info!(address = %proxy.local_addr()?, tls = proxy_tls.is_some(), "Proxy listening");
        tracing::info!(address = %api.local_addr()?, tls = api_tls.is_some(), "Control API listening");

        let proxy_server = net::serve(proxy, proxy_tls, self.proxy_router(), shutdown.wait());
        let api_server = net::serve(api, api_tls, self.api_router(), shutdown.wait());
        tokio::try_join!(proxy_server, api_server)?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn load_optional_tls(tls: Option<&TlsConfig>) -> io::Result<Option<axum_server::tls_rustls::RustlsConfig>> {
    match tls {
        Some(tls) => Ok(Some(load_tls_config(tls.cert_path.as_ref(), tls.key_path.as_ref()).await?)),
        None => Ok(None),
    }
}

/// Request ID, tracing and the panic boundary, shared by both listeners.
fn with_common_layers(router: Router) -> Router {
    let x_request_id = HeaderName::from_static(X_REQUEST_ID);
    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!(panic = %panic_message(panic.as_ref()), "Handler fault");
    default_response(StatusCode::INTERNAL_SERVER_ERROR)
}
