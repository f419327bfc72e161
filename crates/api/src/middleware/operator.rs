use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::{
    error::{ApiError, AppError},
    middleware::request_id,
    state::AppState,
};

/// Bearer check for the operator routes. Without a configured token the
/// operator surface is closed.
pub async fn operator_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let request_id = request_id::current(&req);
    let Some(expected) = state.settings.operator_token.as_deref() else {
        return Err(AppError::Unauthorized.with_request_id(&request_id));
    };

    let supplied = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(parse_bearer)
        .ok_or_else(|| AppError::Unauthorized.with_request_id(&request_id))?;

    if !bool::from(supplied.as_bytes().ct_eq(expected.as_bytes())) {
        warn!(%request_id, "operator token mismatch");
        return Err(AppError::Unauthorized.with_request_id(&request_id));
    }

    Ok(next.run(req).await)
}

fn parse_bearer(value: &HeaderValue) -> Option<&str> {
    let value = value.to_str().ok()?;
    let mut parts = value.splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default();
    if scheme != "Bearer" || token.is_empty() {
        return None;
    }
    Some(token)
}
