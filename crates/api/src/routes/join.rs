//! Mini-app join endpoint.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    error::{ApiResult, AppError},
    state::{AppState, RequestId},
};
use giveaway_core::auth::validate_init_data;
use giveaway_core::participation::JoinOutcome;
use giveaway_core::types::{CampaignId, CampaignType};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/join", post(join).options(preflight))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    #[serde(alias = "gid")]
    pub campaign_id: CampaignId,
    #[serde(alias = "init")]
    pub signed_payload: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct JoinResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_entries: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_requirements: Vec<String>,
}

impl JoinResponse {
    fn entered(total: i64) -> Self {
        Self {
            ok: true,
            total_entries: Some(total),
            reason: None,
            missing_requirements: vec![],
        }
    }

    fn refused(reason: &'static str, missing_requirements: Vec<String>) -> Self {
        Self {
            ok: false,
            total_entries: None,
            reason: Some(reason),
            missing_requirements,
        }
    }
}

// Answered by the CORS layer before it reaches here.
async fn preflight() {}

pub async fn join(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<JoinRequest>, JsonRejection>,
) -> ApiResult<Json<JoinResponse>> {
    handle_join(&state, payload)
        .await
        .map(Json)
        .map_err(|err| err.with_request_id(&request_id.0))
}

async fn handle_join(
    state: &AppState,
    payload: Result<Json<JoinRequest>, JsonRejection>,
) -> Result<JoinResponse, AppError> {
    let Json(req) = payload.map_err(|err| AppError::BadRequest(err.body_text()))?;
    if req.campaign_id <= 0 || req.signed_payload.is_empty() {
        return Err(AppError::BadRequest("campaign_id and signed_payload are required".to_string()));
    }

    let user = validate_init_data(
        &req.signed_payload,
        &state.settings.bot_token,
        Utc::now(),
        state.settings.auth_max_age(),
    )
    .map_err(|err| {
        warn!(
            campaign_id = req.campaign_id,
            reason = err.reason(),
            payload_len = req.signed_payload.len(),
            "join rejected"
        );
        AppError::Unauthenticated(err)
    })?;

    let outcome = state
        .participation
        .join(req.campaign_id, CampaignType::DirectOptIn, &user.participant())
        .await?;

    let response = match outcome {
        JoinOutcome::Joined { total } => {
            info!(campaign_id = req.campaign_id, user_id = user.user_id, total, "joined");
            JoinResponse::entered(total)
        }
        JoinOutcome::AlreadyJoined { total } => JoinResponse::entered(total),
        JoinOutcome::MissingRequirements(missing) => JoinResponse::refused("requirements", missing),
        JoinOutcome::NotBoosted => JoinResponse::refused("not_boosted", vec![]),
        JoinOutcome::Unavailable => return Err(AppError::Unavailable),
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{fixture, BOT_TOKEN};
    use giveaway_core::auth::sign_init_data;
    use giveaway_core::error::AuthError;
    use giveaway_core::store::CampaignStore;
    use giveaway_core::testing::sample_campaign;

    fn signed_for(user_id: i64) -> String {
        let auth_date = Utc::now().timestamp().to_string();
        let user = format!(r#"{{"id":{},"first_name":"Ann","username":"ann"}}"#, user_id);
        sign_init_data(
            BOT_TOKEN,
            &[("auth_date", auth_date.as_str()), ("query_id", "AAE"), ("user", user.as_str())],
        )
    }

    fn request(campaign_id: CampaignId, signed_payload: String) -> Result<Json<JoinRequest>, JsonRejection> {
        Ok(Json(JoinRequest {
            campaign_id,
            signed_payload,
        }))
    }

    #[tokio::test]
    async fn test_join_is_idempotent() {
        let fx = fixture();
        let campaign = fx
            .store
            .create_campaign(&sample_campaign(CampaignType::DirectOptIn, 3600))
            .await
            .unwrap();

        let first = handle_join(&fx.state, request(campaign.id, signed_for(7))).await.unwrap();
        let second = handle_join(&fx.state, request(campaign.id, signed_for(7))).await.unwrap();

        assert_eq!(first, JoinResponse::entered(1));
        assert_eq!(second, JoinResponse::entered(1));
        assert_eq!(fx.store.count_entries(campaign.id).await.unwrap(), 1);
        let entry = &fx.store.list_entries(campaign.id).await.unwrap()[0];
        assert_eq!(entry.username.as_deref(), Some("ann"));
    }

    #[tokio::test]
    async fn test_join_with_tampered_signature() {
        let fx = fixture();
        let campaign = fx
            .store
            .create_campaign(&sample_campaign(CampaignType::DirectOptIn, 3600))
            .await
            .unwrap();
        let tampered = signed_for(7).replace("Ann", "Bob");

        let err = handle_join(&fx.state, request(campaign.id, tampered))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Unauthenticated(AuthError::BadSignature)));
        assert_eq!(fx.store.count_entries(campaign.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_join_reports_missing_requirements() {
        let fx = fixture();
        let mut new = sample_campaign(CampaignType::DirectOptIn, 3600);
        new.required_channels = vec!["@news".to_string()];
        let campaign = fx.store.create_campaign(&new).await.unwrap();
        fx.gate.set_missing(7, &["@news"]);

        let resp = handle_join(&fx.state, request(campaign.id, signed_for(7))).await.unwrap();

        assert!(!resp.ok);
        assert_eq!(resp.missing_requirements, vec!["@news".to_string()]);
    }

    #[tokio::test]
    async fn test_join_on_wrong_campaign_type_is_unavailable() {
        let fx = fixture();
        let campaign = fx
            .store
            .create_campaign(&sample_campaign(CampaignType::Referral, 3600))
            .await
            .unwrap();

        let err = handle_join(&fx.state, request(campaign.id, signed_for(7)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unavailable));
    }

    #[tokio::test]
    async fn test_join_without_payload_is_bad_request() {
        let fx = fixture();
        let err = handle_join(&fx.state, request(1, String::new())).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_request_accepts_legacy_field_names() {
        let req: JoinRequest = serde_json::from_str(r#"{"gid":5,"init":"a=b"}"#).unwrap();
        assert_eq!(req.campaign_id, 5);
        assert_eq!(req.signed_payload, "a=b");
    }
}
