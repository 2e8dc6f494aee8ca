//! Bearer-token authentication middleware.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::AppState;

/// Validates JWT access tokens and stores claims in request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            unauthorized("Missing authorization header", "MISSING_AUTH_HEADER")
        })?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("Invalid authorization header format", "INVALID_AUTH_FORMAT"))?;

    let claims = state
        .jwt_config
        .verify_access_token(token)
        .map_err(|_| unauthorized("Invalid or expired token", "INVALID_TOKEN"))?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

fn unauthorized(error: &str, code: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"success": false, "error": error, "code": code})),
    )
        .into_response()
}
