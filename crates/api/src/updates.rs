//! Inbound platform updates: deep links, comment replies, post buttons and
//! mini-app `web_app_data`.

use anyhow::Context;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::state::AppState;
use giveaway_core::participation::JoinOutcome;
use giveaway_core::render::{render_rules, CallbackAction};
use giveaway_core::types::{CampaignId, CampaignType, Participant, ReferralInsert};

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
    pub reply_to_message: Option<Box<Message>>,
    pub web_app_data: Option<WebAppData>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

impl User {
    fn participant(&self) -> Participant {
        Participant {
            user_id: self.id,
            username: self.username.clone(),
            first_name: self.first_name.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WebAppData {
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MiniAppData {
    action: Option<String>,
    gid: Option<serde_json::Value>,
}

/// Deep-link payloads understood by `/start`.
#[derive(Debug, PartialEq, Eq)]
enum StartPayload {
    Referral { campaign_id: CampaignId, referrer_id: i64 },
    ReferralLink { campaign_id: CampaignId },
    Plain,
}

fn parse_start(text: &str) -> Option<StartPayload> {
    let rest = text.strip_prefix("/start")?;
    // `/start@bot_name args` in groups
    let rest = match rest.strip_prefix('@') {
        Some(addressed) => addressed.split_once(' ').map(|(_, args)| args).unwrap_or(""),
        None if rest.is_empty() || rest.starts_with(' ') => rest,
        None => return None,
    };
    let args = rest.trim();

    if let Some(ids) = args.strip_prefix("ref-") {
        if let Some((campaign, referrer)) = ids.split_once('-') {
            if let (Ok(campaign_id), Ok(referrer_id)) = (campaign.parse(), referrer.parse()) {
                return Some(StartPayload::Referral {
                    campaign_id,
                    referrer_id,
                });
            }
        }
    }
    if let Some(id) = args.strip_prefix("getreflink-") {
        if let Ok(campaign_id) = id.parse() {
            return Some(StartPayload::ReferralLink { campaign_id });
        }
    }
    Some(StartPayload::Plain)
}

pub async fn dispatch(state: &AppState, update: Update) -> anyhow::Result<()> {
    if let Some(query) = update.callback_query {
        return handle_callback(state, query).await;
    }
    let Some(message) = update.message else {
        debug!(update_id = update.update_id, "ignored update");
        return Ok(());
    };
    let Some(from) = message.from.clone().filter(|u| !u.is_bot) else {
        return Ok(());
    };

    if let Some(data) = message.web_app_data.as_ref() {
        return handle_web_app_data(state, &message, &from, &data.data).await;
    }
    if let Some(payload) = message.text.as_deref().and_then(parse_start) {
        return handle_start(state, &message, &from, payload).await;
    }
    if let Some(parent) = message.reply_to_message.as_deref() {
        return handle_comment(state, &message, parent.message_id, &from).await;
    }
    Ok(())
}

async fn reply(state: &AppState, message: &Message, text: &str) {
    if let Err(err) = state
        .messenger
        .send_message(&message.chat.id.to_string(), text, None)
        .await
    {
        warn!(chat_id = message.chat.id, error = %err, "reply failed");
    }
}

async fn handle_start(
    state: &AppState,
    message: &Message,
    from: &User,
    payload: StartPayload,
) -> anyhow::Result<()> {
    match payload {
        StartPayload::Referral {
            campaign_id,
            referrer_id,
        } => {
            let outcome = state
                .participation
                .record_referral(campaign_id, referrer_id, from.id)
                .await
                .context("recording referral")?;
            if outcome == ReferralInsert::Recorded {
                info!(campaign_id, referrer_id, referred_id = from.id, "referral recorded");
                reply(state, message, "Welcome! Your friend's invitation was counted.").await;
                return Ok(());
            }
            debug!(campaign_id, referrer_id, ?outcome, "referral not recorded");
        }
        StartPayload::ReferralLink { campaign_id } => {
            let campaign = state
                .store
                .get_campaign(campaign_id)
                .await
                .context("loading campaign")?;
            let text = match campaign {
                Some(c) if c.kind == CampaignType::Referral && !c.status.is_terminal() => format!(
                    "Your referral link:\n{}",
                    state.bot.referral_link(campaign_id, from.id)
                ),
                _ => "This giveaway is not available.".to_string(),
            };
            reply(state, message, &text).await;
            return Ok(());
        }
        StartPayload::Plain => {}
    }
    reply(
        state,
        message,
        "Hi! I run giveaways. Use the buttons under a giveaway post to take part.",
    )
    .await;
    Ok(())
}

fn mini_app_campaign(raw: &str) -> Option<CampaignId> {
    let data: MiniAppData = serde_json::from_str(raw).ok()?;
    if data.action.as_deref() != Some("join") {
        return None;
    }
    match data.gid? {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .filter(|id| *id > 0)
}

async fn handle_web_app_data(
    state: &AppState,
    message: &Message,
    from: &User,
    raw: &str,
) -> anyhow::Result<()> {
    let Some(campaign_id) = mini_app_campaign(raw) else {
        reply(state, message, "Invalid mini-app data.").await;
        return Ok(());
    };
    let outcome = state
        .participation
        .join(campaign_id, CampaignType::DirectOptIn, &from.participant())
        .await
        .context("joining from web_app_data")?;
    reply(state, message, &join_text(&outcome)).await;
    Ok(())
}

async fn handle_comment(
    state: &AppState,
    message: &Message,
    thread_message_id: i64,
    from: &User,
) -> anyhow::Result<()> {
    let chat_id = message.chat.id;
    let Some((campaign, outcome)) = state
        .participation
        .join_by_comment(chat_id, thread_message_id, &from.participant())
        .await
        .context("joining from comment")?
    else {
        return Ok(());
    };

    match outcome {
        JoinOutcome::Joined { total } => {
            debug!(campaign_id = campaign.id, user_id = from.id, total, "comment entry recorded");
        }
        JoinOutcome::AlreadyJoined { .. }
        | JoinOutcome::MissingRequirements(_)
        | JoinOutcome::NotBoosted => {
            if let Err(err) = state.messenger.delete_message(chat_id, message.message_id).await {
                warn!(campaign_id = campaign.id, chat_id, error = %err, "comment removal failed");
            }
        }
        JoinOutcome::Unavailable => {}
    }
    Ok(())
}

const CALLBACK_FAILED: &str = "Something went wrong, please try again later.";

async fn handle_callback(state: &AppState, query: CallbackQuery) -> anyhow::Result<()> {
    let Some(action) = query.data.as_deref().and_then(CallbackAction::parse) else {
        return Ok(());
    };

    // The button spins until answered, so failures are answered too.
    let result = callback_text(state, &query, action).await;
    let text = match &result {
        Ok(text) => text.as_str(),
        Err(_) => CALLBACK_FAILED,
    };
    if let Err(err) = state.messenger.answer_callback(&query.id, text).await {
        warn!(callback_id = %query.id, error = %err, "callback answer failed");
    }
    result.map(|_| ())
}

async fn callback_text(
    state: &AppState,
    query: &CallbackQuery,
    action: CallbackAction,
) -> anyhow::Result<String> {
    let text = match action {
        CallbackAction::Count(id) => {
            let total = state.participation.entry_count(id).await?;
            format!("Participants now: {}", total)
        }
        CallbackAction::Rules(id) => match state.store.get_campaign(id).await? {
            Some(campaign) => render_rules(&campaign),
            None => "Not found".to_string(),
        },
        CallbackAction::ReferralCount(id) => {
            let invited = state.participation.referral_count(id, query.from.id).await?;
            format!("Invited: {}", invited)
        }
        CallbackAction::Boost(id) => {
            let outcome = state
                .participation
                .join(id, CampaignType::BoostGated, &query.from.participant())
                .await
                .context("joining from boost check")?;
            join_text(&outcome)
        }
    };
    Ok(text)
}

fn join_text(outcome: &JoinOutcome) -> String {
    match outcome {
        JoinOutcome::Joined { total } => format!("Done! You are in. Participants: {}", total),
        JoinOutcome::AlreadyJoined { .. } => "You are already taking part.".to_string(),
        JoinOutcome::MissingRequirements(missing) => {
            let list: Vec<String> = missing.iter().map(|c| format!("• {}", c)).collect();
            format!("Please subscribe first:\n{}", list.join("\n"))
        }
        JoinOutcome::NotBoosted => {
            "No active boost for this chat since the giveaway started.".to_string()
        }
        JoinOutcome::Unavailable => "This giveaway is not available.".to_string(),
    }
}
