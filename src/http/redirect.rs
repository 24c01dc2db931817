//! Plain-HTTP listener that sends every request to the HTTPS proxy.

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::routing::resolver::request_host;

/// Router answering everything with `301` to `https://<host>:<port><uri>`.
pub fn redirect_router(https_port: u16) -> Router {
    Router::new().fallback(redirect).with_state(https_port)
}

async fn redirect(State(https_port): State<u16>, request: Request) -> Response {
    let Some(host) = request_host(&request) else {
        return (StatusCode::BAD_REQUEST, "Missing Host header").into_response();
    };
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let location = format!("https://{host}:{https_port}{path}");
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
}
