use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tracing::error;

use giveaway_core::error::{AuthError, StoreError, ValidationError};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub reason: String,
    pub message: String,
    pub request_id: String,
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Invalid(ValidationError),
    /// Mini-app payload rejected; the reason code is returned verbatim.
    Unauthenticated(AuthError),
    Unauthorized,
    NotFound(String),
    Unavailable,
    Conflict(String),
    Internal,
}

#[derive(Debug)]
pub struct ApiError {
    pub error: AppError,
    pub request_id: String,
}

impl AppError {
    pub fn with_request_id(self, request_id: &str) -> ApiError {
        ApiError {
            error: self,
            request_id: request_id.to_string(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => AppError::NotFound(format!("campaign {}", id)),
            StoreError::Backend(source) => {
                error!(error = %source, "store failure");
                AppError::Internal
            }
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Invalid(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, reason, message) = match self.error {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_params", msg),
            AppError::Invalid(err) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid", err.to_string()),
            AppError::Unauthenticated(err) => {
                (StatusCode::UNAUTHORIZED, err.reason(), err.to_string())
            }
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Invalid operator token".to_string(),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::Unavailable => (
                StatusCode::NOT_FOUND,
                "unavailable",
                "Campaign is not open for this kind of participation".to_string(),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Unexpected error".to_string(),
            ),
        };

        (
            status,
            Json(ErrorResponse {
                ok: false,
                reason: reason.to_string(),
                message,
                request_id: self.request_id,
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[test]
    fn test_with_request_id() {
        let err = AppError::Internal.with_request_id("req_123");
        assert_eq!(err.request_id, "req_123");
    }

    #[test]
    fn test_bad_request_response() {
        rt().block_on(async {
            let err = AppError::BadRequest("missing field".to_string()).with_request_id("req_001");
            let (status, json) = body_json(err).await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(json["ok"], false);
            assert_eq!(json["reason"], "bad_params");
            assert_eq!(json["message"], "missing field");
            assert_eq!(json["request_id"], "req_001");
        });
    }

    #[test]
    fn test_auth_failures_carry_reason_codes() {
        rt().block_on(async {
            for (err, reason) in [
                (AuthError::MissingSignature, "no_signature"),
                (AuthError::BadSignature, "bad_signature"),
                (AuthError::Stale, "stale"),
                (AuthError::MalformedIdentity, "malformed_identity"),
            ] {
                let (status, json) =
                    body_json(AppError::Unauthenticated(err).with_request_id("req_002")).await;
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(json["reason"], reason, "reason for {:?}", err);
            }
        });
    }

    #[test]
    fn test_unavailable_response() {
        rt().block_on(async {
            let (status, json) = body_json(AppError::Unavailable.with_request_id("req_003")).await;

            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(json["reason"], "unavailable");
        });
    }

    #[test]
    fn test_validation_response() {
        rt().block_on(async {
            let err = AppError::from(ValidationError::EndBeforeStart).with_request_id("req_004");
            let (status, json) = body_json(err).await;

            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(json["reason"], "invalid");
            assert_eq!(json["message"], "end must be after start");
        });
    }

    #[test]
    fn test_store_not_found_maps_to_404() {
        rt().block_on(async {
            let err = AppError::from(StoreError::NotFound(9)).with_request_id("req_005");
            let (status, json) = body_json(err).await;

            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(json["message"], "campaign 9");
        });
    }

    #[test]
    fn test_internal_error_response() {
        rt().block_on(async {
            let (status, json) = body_json(AppError::Internal.with_request_id("req_006")).await;

            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(json["reason"], "internal_error");
            assert_eq!(json["message"], "Unexpected error");
        });
    }
}
