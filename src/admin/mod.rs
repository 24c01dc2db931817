//! Control API: runtime CRUD over the routing table.
//!
//! ```text
//! GET    /api/routes[?inactive_since=<ISO8601>]
//! GET    /api/routes/<path>
//! POST   /api/routes[/<path>]   {"target": "<url>", ...}
//! DELETE /api/routes/<path>
//! ```
//!
//! An empty `<path>` (`/api/routes/`) addresses the root route `/`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tower_http::timeout::TimeoutLayer;

use crate::error::ApiError;
use crate::observability::metrics::MetricsSink;
use crate::routing::RouteStore;

use self::auth::require_token;
use self::handlers::{
    create_root_route, create_route, delete_root_route, delete_route, get_route, list_routes,
};

/// State shared by control API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn RouteStore>,
    pub metrics: Arc<dyn MetricsSink>,
    /// Expected `Authorization: token <secret>`; `None` leaves the API open.
    pub auth_token: Option<Arc<str>>,
}

/// Build the control API router.
#[allow(deprecated)]
pub fn api_router(state: ApiState, timeout: Duration) -> Router {
    Router::new()
        .route("/api/routes", get(list_routes).post(create_root_route))
        .route(
            "/api/routes/",
            get(list_routes).post(create_root_route).delete(delete_root_route),
        )
        .route(
            "/api/routes/{*path}",
            get(get_route).post(create_route).delete(delete_route),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token))
        .fallback(|| async { ApiError::NotFound })
        .layer(middleware::from_fn_with_state(state.clone(), record_status))
        .layer(TimeoutLayer::new(timeout))
        .with_state(state)
}

async fn record_status(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    state.metrics.request_api(response.status().as_u16());
    response
}
