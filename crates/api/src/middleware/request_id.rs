use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use nanoid::nanoid;

use crate::state::RequestId;

const HEADER: &str = "X-Request-Id";
const MAX_INBOUND_LEN: usize = 64;

/// Tags every request with an id, reusing one set by the fronting proxy
/// when it looks sane, and echoes it on the response.
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let id = inbound(req.headers()).unwrap_or_else(|| format!("req_{}", nanoid!(16)));
    req.extensions_mut().insert(RequestId(id.clone()));

    let mut resp = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        resp.headers_mut().insert(HEADER, value);
    }
    resp
}

fn inbound(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(HEADER)?.to_str().ok()?.trim();
    let sane = !raw.is_empty()
        && raw.len() <= MAX_INBOUND_LEN
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    sane.then(|| raw.to_string())
}

/// Request id of the current request, or `unknown` outside the layer.
pub fn current(req: &Request<Body>) -> String {
    req.extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_else(|| "unknown".to_string())
}
