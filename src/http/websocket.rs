//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Establish the WebSocket connection to the backend before the client
//!   upgrade is accepted
//! - Relay messages in both directions until either side closes
//! - Record route activity per data or close message
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Proxy ←──── WebSocket frames ────→ Backend
//! ```
//!
//! # Design Decisions
//! - Message-level forwarding (tungstenite reassembles fragments)
//! - Close frames propagated in both directions
//! - Ping/pong answered by each leg on its own, not relayed

use std::time::Duration;

use axum::extract::ws::{self, WebSocket};
use axum::http::{header, HeaderMap, HeaderName, Uri};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::BackendError;
use crate::http::request::strip_hop_by_hop;
use crate::routing::ActivityTracker;

pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Handshake headers tungstenite generates itself.
const HANDSHAKE_HEADERS: [HeaderName; 3] = [
    header::SEC_WEBSOCKET_KEY,
    header::SEC_WEBSOCKET_VERSION,
    header::SEC_WEBSOCKET_EXTENSIONS,
];

/// An established backend connection and the subprotocol it selected.
pub struct Upstream {
    pub socket: UpstreamSocket,
    pub protocol: Option<String>,
}

/// `http(s)://` upstream URI to its `ws(s)://` form.
pub fn websocket_uri(uri: &Uri) -> String {
    let uri = uri.to_string();
    if let Some(rest) = uri.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = uri.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        uri
    }
}

/// Open the backend WebSocket, forwarding the client's end-to-end headers.
pub async fn connect(uri: &Uri, headers: &HeaderMap, timeout: Duration) -> Result<Upstream, BackendError> {
    let mut request = websocket_uri(uri).into_client_request()?;

    let mut forwarded = headers.clone();
    strip_hop_by_hop(&mut forwarded);
    for name in &HANDSHAKE_HEADERS {
        forwarded.remove(name);
    }
    for (name, value) in &forwarded {
        if name == header::HOST {
            request.headers_mut().insert(header::HOST, value.clone());
        } else {
            request.headers_mut().append(name, value.clone());
        }
    }

    let (socket, response) = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(request))
        .await
        .map_err(|_| BackendError::Timeout(timeout))??;

    let protocol = response
        .headers()
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    Ok(Upstream { socket, protocol })
}

/// Relay messages until either side closes or fails.
pub async fn relay(client: WebSocket, upstream: UpstreamSocket, prefix: String, activity: ActivityTracker) {
    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let client_to_upstream = async {
        while let Some(Ok(message)) = client_rx.next().await {
            let Some(message) = to_upstream(message) else {
                continue;
            };
            let closing = message.is_close();
            if upstream_tx.send(message).await.is_err() {
                return;
            }
            activity.touch(&prefix).await;
            if closing {
                return;
            }
        }
        let _ = upstream_tx.send(Message::Close(None)).await;
    };

    let upstream_to_client = async {
        while let Some(Ok(message)) = upstream_rx.next().await {
            let Some(message) = to_client(message) else {
                continue;
            };
            let closing = matches!(message, ws::Message::Close(_));
            if client_tx.send(message).await.is_err() {
                return;
            }
            activity.touch(&prefix).await;
            if closing {
                return;
            }
        }
        let _ = client_tx.send(ws::Message::Close(None)).await;
    };

    tokio::select! {
        _ = client_to_upstream => {},
        _ = upstream_to_client => {},
    }

    tracing::debug!(prefix = %prefix, "WebSocket connection closed");
}

fn to_upstream(message: ws::Message) -> Option<Message> {
    match message {
        ws::Message::Text(text) => Some(Message::Text(text.to_string().into())),
        ws::Message::Binary(data) => Some(Message::Binary(data)),
        ws::Message::Close(frame) => Some(Message::Close(frame.map(|f| CloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.to_string().into(),
        }))),
        ws::Message::Ping(_) | ws::Message::Pong(_) => None,
    }
}

fn to_client(message: Message) -> Option<ws::Message> {
    match message {
        Message::Text(text) => Some(ws::Message::Text(text.to_string().into())),
        Message::Binary(data) => Some(ws::Message::Binary(data)),
        Message::Close(frame) => Some(ws::Message::Close(frame.map(|f| ws::CloseFrame {
            code: u16::from(f.code),
            reason: f.reason.to_string().into(),
        }))),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
    }
}
