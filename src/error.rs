//! Error taxonomy.
//!
//! Every error here is converted into an HTTP response at the boundary
//! where it is detected; none of them is allowed to take the process down.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::routing::route::InvalidRoute;
use crate::routing::store::StoreError;

/// Failures on the proxy (dispatch) side.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// No route matches the request.
    #[error("no route for {0}")]
    NoRoute(String),

    /// The resolved backend could not be reached or failed mid-request.
    #[error("backend {target} unavailable: {source}")]
    BackendUnavailable {
        target: String,
        #[source]
        source: BackendError,
    },

    /// A fault inside request handling itself.
    #[error("handler fault: {0}")]
    HandlerFault(String),
}

impl ProxyError {
    pub fn backend(target: impl Into<String>, source: impl Into<BackendError>) -> Self {
        ProxyError::BackendUnavailable {
            target: target.into(),
            source: source.into(),
        }
    }

    /// Status code substituted for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::NoRoute(_) => StatusCode::NOT_FOUND,
            ProxyError::BackendUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::HandlerFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for transport failures that say nothing about our own health.
    pub fn is_transient(&self) -> bool {
        match self {
            ProxyError::BackendUnavailable { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

impl From<StoreError> for ProxyError {
    fn from(e: StoreError) -> Self {
        ProxyError::HandlerFault(e.to_string())
    }
}

/// Transport-level failure talking to a backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Client(#[from] hyper_util::client::legacy::Error),

    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl BackendError {
    /// Connection refused/reset, unreachable hosts and timeouts.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Timeout(_) => true,
            BackendError::Client(e) => e.is_connect() || chain_has_transient_io(e),
            BackendError::WebSocket(tokio_tungstenite::tungstenite::Error::Io(e)) => {
                is_transient_io(e)
            }
            BackendError::WebSocket(e) => chain_has_transient_io(e),
        }
    }
}

fn chain_has_transient_io(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if is_transient_io(io) {
                return true;
            }
        }
        current = e.source();
    }
    false
}

fn is_transient_io(e: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(
        e.kind(),
        ConnectionRefused
            | ConnectionReset
            | ConnectionAborted
            | HostUnreachable
            | NetworkUnreachable
            | TimedOut
    )
}

/// Failures on the control API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed input; the message is echoed to the caller.
    #[error("{0}")]
    Validation(String),

    /// Missing or wrong token.
    #[error("forbidden")]
    Auth,

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<InvalidRoute> for ApiError {
    fn from(e: InvalidRoute) -> Self {
        ApiError::Validation(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(msg) => {
                tracing::warn!(error = %msg, "Rejected API request");
                (StatusCode::BAD_REQUEST, msg).into_response()
            }
            ApiError::Auth => StatusCode::FORBIDDEN.into_response(),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not Found").into_response(),
            ApiError::Store(e) => {
                tracing::error!(error = ?e, "Route store failure");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
        }
    }
}
