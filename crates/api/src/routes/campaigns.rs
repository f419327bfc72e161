//! Operator surface: create, list, inspect, force-draw and cancel campaigns.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{
    error::{ApiResult, AppError},
    state::{AppState, RequestId},
};
use giveaway_core::draw::{CancelOutcome, DrawOutcome, DrawTrigger};
use giveaway_core::error::DrawError;
use giveaway_core::render::{post_buttons, render_post};
use giveaway_core::types::{
    Campaign, CampaignId, CampaignType, MessageRef, NewCampaign, PostRef, UserId, Winner,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/campaigns", post(create_campaign).get(list_campaigns))
        .route("/api/campaigns/{id}", get(get_campaign))
        .route("/api/campaigns/{id}/draw", post(force_draw))
        .route("/api/campaigns/{id}/cancel", post(cancel_campaign))
        .route("/api/campaigns/{id}/post", put(set_post))
        .route("/api/campaigns/{id}/winners", get(list_winners))
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignListResponse {
    pub items: Vec<Campaign>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignDetail {
    #[serde(flatten)]
    pub campaign: Campaign,
    pub total_entries: i64,
    pub winners: Vec<Winner>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DrawResponse {
    pub outcome: &'static str,
    pub winners: Vec<UserId>,
    pub announced_here: bool,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub outcome: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPostRequest {
    pub post_chat_id: i64,
    pub post_message_id: i64,
    pub discussion_chat_id: Option<i64>,
    pub thread_message_id: Option<i64>,
}

pub async fn create_campaign(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(payload): Json<NewCampaign>,
) -> ApiResult<(StatusCode, Json<Campaign>)> {
    handle_create(&state, payload)
        .await
        .map(|campaign| (StatusCode::CREATED, Json(campaign)))
        .map_err(|err| err.with_request_id(&request_id.0))
}

async fn handle_create(state: &AppState, mut payload: NewCampaign) -> Result<Campaign, AppError> {
    payload.validate(Utc::now())?;
    let campaign = state.store.create_campaign(&payload).await?;
    info!(campaign_id = campaign.id, kind = campaign.kind.as_str(), end_at = %campaign.end_at, "campaign created");

    // Publishing is best-effort; the campaign exists either way.
    let buttons = post_buttons(&campaign, &state.bot, &state.settings.mini_app_short_name);
    match state
        .messenger
        .send_with_buttons(&campaign.target_chat, &render_post(&campaign), &buttons)
        .await
    {
        Ok(sent) => {
            let post = post_ref_for(campaign.kind, sent);
            state.store.set_post_ref(campaign.id, post).await?;
        }
        Err(err) => warn!(campaign_id = campaign.id, error = %err, "campaign post failed"),
    }

    state
        .store
        .get_campaign(campaign.id)
        .await?
        .ok_or(AppError::Internal)
}

/// Single-comment campaigns collect replies to the post itself until an
/// operator points them at a linked discussion thread.
fn post_ref_for(kind: CampaignType, sent: MessageRef) -> PostRef {
    PostRef {
        post: sent,
        discussion: (kind == CampaignType::SingleComment).then_some(sent),
    }
}

pub async fn list_campaigns(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> ApiResult<Json<CampaignListResponse>> {
    let items = state
        .store
        .list_open()
        .await
        .map_err(|err| AppError::from(err).with_request_id(&request_id.0))?;
    Ok(Json(CampaignListResponse { items }))
}

pub async fn get_campaign(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<CampaignId>,
) -> ApiResult<Json<CampaignDetail>> {
    handle_get(&state, id)
        .await
        .map(Json)
        .map_err(|err| err.with_request_id(&request_id.0))
}

async fn handle_get(state: &AppState, id: CampaignId) -> Result<CampaignDetail, AppError> {
    let campaign = state
        .store
        .get_campaign(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("campaign {}", id)))?;
    let total_entries = state.store.count_entries(id).await?;
    let winners = state.store.get_winners(id).await?;
    Ok(CampaignDetail {
        campaign,
        total_entries,
        winners,
    })
}

pub async fn force_draw(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<CampaignId>,
) -> ApiResult<Json<DrawResponse>> {
    handle_draw(&state, id)
        .await
        .map(Json)
        .map_err(|err| err.with_request_id(&request_id.0))
}

async fn handle_draw(state: &AppState, id: CampaignId) -> Result<DrawResponse, AppError> {
    // A dropped request must not cancel a claimed draw.
    let engine = state.engine.clone();
    let outcome = tokio::spawn(async move { engine.attempt_draw(id, DrawTrigger::Operator).await })
        .await
        .map_err(|err| {
            error!(campaign_id = id, error = %err, "operator draw task failed");
            AppError::Internal
        })?
        .map_err(|err| match err {
            DrawError::Store(err) => AppError::from(err),
        })?;
    info!(campaign_id = id, ?outcome, "operator draw");

    match outcome {
        DrawOutcome::Completed {
            winners,
            announced_here,
        } => Ok(DrawResponse {
            outcome: "completed",
            winners,
            announced_here,
        }),
        DrawOutcome::AlreadyFinished => {
            let winners = state
                .store
                .get_winners(id)
                .await?
                .into_iter()
                .map(|w| w.user_id)
                .collect();
            Ok(DrawResponse {
                outcome: "already_finished",
                winners,
                announced_here: false,
            })
        }
        DrawOutcome::NotFound => Err(AppError::NotFound(format!("campaign {}", id))),
        DrawOutcome::Canceled => Err(AppError::Conflict("campaign was canceled".to_string())),
        DrawOutcome::ClaimLost | DrawOutcome::HeldElsewhere => {
            Err(AppError::Conflict("draw is being run by another instance".to_string()))
        }
        DrawOutcome::NotDue => Err(AppError::Conflict("campaign is not due".to_string())),
    }
}

pub async fn cancel_campaign(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<CampaignId>,
) -> ApiResult<Json<CancelResponse>> {
    let outcome = state
        .engine
        .cancel(id)
        .await
        .map_err(|err| AppError::from(err).with_request_id(&request_id.0))?;

    let result = match outcome {
        CancelOutcome::Canceled => Ok("canceled"),
        CancelOutcome::AlreadyCanceled => Ok("already_canceled"),
        CancelOutcome::DrawInProgress => Err(AppError::Conflict("draw already in progress".to_string())),
        CancelOutcome::AlreadyFinished => Err(AppError::Conflict("campaign already finished".to_string())),
        CancelOutcome::NotFound => Err(AppError::NotFound(format!("campaign {}", id))),
    };
    result
        .map(|outcome| Json(CancelResponse { outcome }))
        .map_err(|err| err.with_request_id(&request_id.0))
}

pub async fn list_winners(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<CampaignId>,
) -> ApiResult<Json<Vec<Winner>>> {
    let lookup = async {
        if state.store.get_campaign(id).await?.is_none() {
            return Err(AppError::NotFound(format!("campaign {}", id)));
        }
        Ok(state.store.get_winners(id).await?)
    };
    lookup
        .await
        .map(Json)
        .map_err(|err| err.with_request_id(&request_id.0))
}

pub async fn set_post(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<CampaignId>,
    Json(payload): Json<SetPostRequest>,
) -> ApiResult<StatusCode> {
    let discussion = match (payload.discussion_chat_id, payload.thread_message_id) {
        (Some(chat_id), Some(message_id)) => Some(MessageRef { chat_id, message_id }),
        (None, None) => None,
        _ => {
            return Err(AppError::BadRequest(
                "discussionChatId and threadMessageId go together".to_string(),
            )
            .with_request_id(&request_id.0))
        }
    };
    let post = PostRef {
        post: MessageRef {
            chat_id: payload.post_chat_id,
            message_id: payload.post_message_id,
        },
        discussion,
    };
    let updated = state
        .store
        .set_post_ref(id, post)
        .await
        .map_err(|err| AppError::from(err).with_request_id(&request_id.0))?;
    if !updated {
        return Err(AppError::NotFound(format!("campaign {}", id)).with_request_id(&request_id.0));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{fixture, fixture_with_messenger};
    use giveaway_core::lifecycle::{CampaignStatus, Transition};
    use giveaway_core::store::CampaignStore;
    use giveaway_core::testing::{sample_campaign, RecordingMessenger};
    use giveaway_core::types::Participant;
    use std::time::Duration;

    fn rid() -> Extension<RequestId> {
        Extension(RequestId("req_test".to_string()))
    }

    #[tokio::test]
    async fn test_create_publishes_post_and_stores_reference() {
        let fx = fixture();
        let mut new = sample_campaign(CampaignType::DirectOptIn, 3600);
        new.target_chat = "-100777".to_string();

        let (status, Json(campaign)) = create_campaign(State(fx.state.clone()), rid(), Json(new))
            .await
            .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        let post = campaign.post.expect("post reference stored");
        assert_eq!(post.post.chat_id, -100777);
        assert!(post.discussion.is_none());
        let sent = fx.messenger.messages_to("-100777");
        assert_eq!(sent.len(), 1);
        assert!(!sent[0].buttons.is_empty());
    }

    #[tokio::test]
    async fn test_create_comment_campaign_threads_on_post() {
        let fx = fixture();
        let mut new = sample_campaign(CampaignType::SingleComment, 3600);
        new.target_chat = "-100778".to_string();

        let campaign = handle_create(&fx.state, new).await.unwrap();

        let post = campaign.post.unwrap();
        assert_eq!(post.discussion, Some(post.post));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_window() {
        let fx = fixture();
        let mut new = sample_campaign(CampaignType::DirectOptIn, 3600);
        new.start_at = new.end_at;

        let err = handle_create(&fx.state, new).await.unwrap_err();

        assert!(matches!(err, AppError::Invalid(_)));
        assert!(fx.store.list_open().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_force_draw_before_deadline() {
        let fx = fixture();
        let campaign = fx
            .store
            .create_campaign(&sample_campaign(CampaignType::DirectOptIn, 3600))
            .await
            .unwrap();
        fx.store
            .add_entry(campaign.id, &Participant::anonymous(5))
            .await
            .unwrap();

        let first = handle_draw(&fx.state, campaign.id).await.unwrap();
        let second = handle_draw(&fx.state, campaign.id).await.unwrap();

        assert_eq!(first.outcome, "completed");
        assert_eq!(first.winners, vec![5]);
        assert!(first.announced_here);
        assert_eq!(second.outcome, "already_finished");
        assert_eq!(second.winners, vec![5]);
        let stored = fx.store.get_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CampaignStatus::Finished);
    }

    #[tokio::test]
    async fn test_dropped_draw_request_still_announces() {
        let fx = fixture_with_messenger(RecordingMessenger::slow(Duration::from_millis(300)));
        let campaign = fx
            .store
            .create_campaign(&sample_campaign(CampaignType::DirectOptIn, -5))
            .await
            .unwrap();

        let request = force_draw(State(fx.state.clone()), rid(), Path(campaign.id));
        assert!(tokio::time::timeout(Duration::from_millis(50), request)
            .await
            .is_err());

        tokio::time::sleep(Duration::from_millis(700)).await;
        let stored = fx.store.get_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CampaignStatus::Finished);
        assert_eq!(fx.messenger.messages_to(&campaign.target_chat).len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_conflicts_while_drawing() {
        let fx = fixture();
        let campaign = fx
            .store
            .create_campaign(&sample_campaign(CampaignType::DirectOptIn, -5))
            .await
            .unwrap();
        fx.store
            .transition(campaign.id, Transition::Claim, "elsewhere")
            .await
            .unwrap();

        let err = cancel_campaign(State(fx.state.clone()), rid(), Path(campaign.id))
            .await
            .unwrap_err();
        assert!(matches!(err.error, AppError::Conflict(_)));

        let err = cancel_campaign(State(fx.state), rid(), Path(999)).await.unwrap_err();
        assert!(matches!(err.error, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_detail_includes_counts() {
        let fx = fixture();
        let campaign = fx
            .store
            .create_campaign(&sample_campaign(CampaignType::DirectOptIn, 3600))
            .await
            .unwrap();
        for user in [1, 2] {
            fx.store
                .add_entry(campaign.id, &Participant::anonymous(user))
                .await
                .unwrap();
        }

        let detail = handle_get(&fx.state, campaign.id).await.unwrap();
        assert_eq!(detail.total_entries, 2);
        assert!(detail.winners.is_empty());
        assert!(matches!(
            handle_get(&fx.state, 404).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }
}
