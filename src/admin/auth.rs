use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::admin::ApiState;
use crate::error::ApiError;

/// Reject requests without the configured `Authorization: token <secret>`.
pub async fn require_token(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = &state.auth_token {
        let provided = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(parse_token);

        if provided != Some(expected.as_ref()) {
            return Err(ApiError::Auth);
        }
    }

    Ok(next.run(request).await)
}

/// The secret from a `token <secret>` header value.
fn parse_token(header: &str) -> Option<&str> {
    let rest = header.trim_start().strip_prefix("token")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    rest.split_whitespace().next()
}
