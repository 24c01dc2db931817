//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use switchyard::http::request::is_websocket_upgrade;
use switchyard::routing::{RouteData, RouteStore};
use switchyard::{HttpServer, ProxyConfig, Shutdown};

/// A running proxy plus the backends spawned for it.
///
/// Everything is torn down by [`TestHarness::stop`].
pub struct TestHarness {
    pub proxy_addr: SocketAddr,
    pub api_addr: SocketAddr,
    pub store: Arc<dyn RouteStore>,
    pub client: reqwest::Client,
    shutdown: Shutdown,
    server: JoinHandle<()>,
    backends: Vec<JoinHandle<()>>,
}

impl TestHarness {
    pub async fn start(config: ProxyConfig) -> Self {
        Self::start_server(HttpServer::new(config)).await
    }

    pub async fn start_server(server: HttpServer) -> Self {
        let proxy = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let api = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_addr = proxy.local_addr().unwrap();
        let api_addr = api.local_addr().unwrap();
        let store = server.store();

        // Installed here so the default route exists as soon as `start` returns.
        server.install_default_route().await.unwrap();

        let shutdown = Shutdown::new();
        let server_shutdown = shutdown.clone();
        let server = tokio::spawn(async move {
            server.run(proxy, api, &server_shutdown).await.unwrap();
        });

        let client = reqwest::Client::builder()
            .no_proxy()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        Self {
            proxy_addr,
            api_addr,
            store,
            client,
            shutdown,
            server,
            backends: Vec::new(),
        }
    }

    pub fn proxy_url(&self, path: &str) -> String {
        format!("http://{}{}", self.proxy_addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.proxy_addr, path)
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("http://{}{}", self.api_addr, path)
    }

    /// Spawn an echo backend and route `prefix` to it. Returns its target URL.
    pub async fn add_backend(&mut self, prefix: &str) -> String {
        let (target, handle) = spawn_echo_backend().await;
        self.backends.push(handle);
        self.add_route(prefix, &target).await;
        target
    }

    /// Spawn an echo backend without routing anything to it.
    pub async fn spawn_backend(&mut self) -> String {
        let (target, handle) = spawn_echo_backend().await;
        self.backends.push(handle);
        target
    }

    pub async fn add_route(&self, prefix: &str, target: &str) {
        self.store.add(prefix, RouteData::new(target)).await.unwrap();
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        for backend in self.backends {
            backend.abort();
        }
        let _ = self.server.await;
    }
}

/// An address nothing is listening on.
pub fn unreachable_target() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Backend answering HTTP with a JSON echo of the request and WebSockets
/// with `"connected"` followed by a JSON echo per text message.
///
/// `?status=NNN` makes the HTTP echo answer with that status.
async fn spawn_echo_backend() -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = format!("http://{}", listener.local_addr().unwrap());
    let router = Router::new().fallback(echo).with_state(target.clone());
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    (target, handle)
}

async fn echo(State(target): State<String>, request: Request<Body>) -> Response {
    let (mut parts, _body) = request.into_parts();
    let path = parts.uri.path().to_string();

    if is_websocket_upgrade(&parts.headers) {
        let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(upgrade) => upgrade,
            Err(rejection) => return rejection.into_response(),
        };
        return upgrade
            .protocols(["echo-protocol"])
            .on_upgrade(move |socket| echo_socket(socket, path));
    }

    let status = parts
        .uri
        .query()
        .and_then(|q| q.split('&').find_map(|pair| pair.strip_prefix("status=")))
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::OK);

    let headers: BTreeMap<String, String> = parts
        .headers
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_str().unwrap_or_default().to_string()))
        .collect();

    (
        status,
        Json(json!({
            "path": path,
            "url": parts.uri.to_string(),
            "headers": headers,
            "target": target,
        })),
    )
        .into_response()
}

async fn echo_socket(mut socket: WebSocket, path: String) {
    if socket.send(Message::Text("connected".into())).await.is_err() {
        return;
    }
    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Text(text) => {
                let reply = json!({ "path": path, "message": text.as_str() }).to_string();
                if socket.send(Message::Text(reply.into())).await.is_err() {
                    return;
                }
            }
            Message::Close(_) => return,
            _ => {}
        }
    }
}
