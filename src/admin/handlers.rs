use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::admin::ApiState;
use crate::error::ApiError;
use crate::routing::route::parse_timestamp;
use crate::routing::{Route, RouteData};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub inactive_since: Option<String>,
}

/// `GET /api/routes`
pub async fn list_routes(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> Result<Json<BTreeMap<String, Route>>, ApiError> {
    state.metrics.api_route_get();

    let cutoff = match params.inactive_since.as_deref() {
        Some(raw) => Some(parse_timestamp(raw).ok_or_else(|| {
            ApiError::Validation(format!("Invalid datestamp '{raw}' must be ISO8601."))
        })?),
        None => None,
    };

    let mut routes = state.store.get_all().await?;
    if let Some(cutoff) = cutoff {
        routes.retain(|_, route| route.last_activity < cutoff);
    }

    Ok(Json(routes))
}

/// `GET /api/routes/<path>`
pub async fn get_route(State(state): State<ApiState>, Path(path): Path<String>) -> Result<Json<Route>, ApiError> {
    state.metrics.api_route_get();
    state
        .store
        .get(&prefix_of(&path))
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// `POST /api/routes`
pub async fn create_root_route(State(state): State<ApiState>, body: Bytes) -> Result<StatusCode, ApiError> {
    add_route(&state, "/", &body).await
}

/// `POST /api/routes/<path>`
pub async fn create_route(
    State(state): State<ApiState>,
    Path(path): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    add_route(&state, &prefix_of(&path), &body).await
}

async fn add_route(state: &ApiState, prefix: &str, body: &[u8]) -> Result<StatusCode, ApiError> {
    state.metrics.api_route_add();

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::Validation(format!("Body not valid JSON: {e}")))?;
    let data = RouteData::from_json(value)?;

    tracing::info!(prefix = %prefix, target = %data.target, "Adding route");
    state.store.add(prefix, data).await?;
    Ok(StatusCode::CREATED)
}

/// `DELETE /api/routes/<path>`
pub async fn delete_route(State(state): State<ApiState>, Path(path): Path<String>) -> Result<StatusCode, ApiError> {
    remove_route(&state, &prefix_of(&path)).await
}

/// `DELETE /api/routes/`
pub async fn delete_root_route(State(state): State<ApiState>) -> Result<StatusCode, ApiError> {
    remove_route(&state, "/").await
}

async fn remove_route(state: &ApiState, prefix: &str) -> Result<StatusCode, ApiError> {
    state.metrics.api_route_delete();

    match state.store.remove(prefix).await? {
        Some(_) => {
            tracing::info!(prefix = %prefix, "Removed route");
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(ApiError::NotFound),
    }
}

/// Wildcard captures come without the leading slash, already percent-decoded.
fn prefix_of(path: &str) -> String {
    format!("/{path}")
}
