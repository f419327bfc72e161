//! Update receiver, mounted under a path secret.

use axum::{
    extract::{Path, State},
    routing::post,
    Extension, Json, Router,
};
use serde_json::{json, Value};
use subtle::ConstantTimeEq;
use tracing::{error, warn};

use crate::{
    error::{ApiResult, AppError},
    state::{AppState, RequestId},
    updates::{dispatch, Update},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook/{secret}", post(receive))
        .with_state(state)
}

pub async fn receive(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(secret): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let expected = state.settings.webhook_secret.as_bytes();
    if !bool::from(secret.as_bytes().ct_eq(expected)) {
        return Err(AppError::NotFound("no such route".to_string()).with_request_id(&request_id.0));
    }

    // Acknowledged even when handling fails.
    match serde_json::from_value::<Update>(body) {
        Ok(update) => {
            let update_id = update.update_id;
            if let Err(err) = dispatch(&state, update).await {
                error!(update_id, error = %format!("{:#}", err), "update handling failed");
            }
        }
        Err(err) => warn!(error = %err, "undecodable update"),
    }
    Ok(Json(json!({ "ok": true })))
}
