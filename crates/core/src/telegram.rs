//! Bot API client. Implements both outbound seams ([`Messenger`] and
//! [`EligibilityGate`]) over plain HTTPS calls with a per-request timeout and
//! a capped number of retries.

use std::time::Duration;

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::ExternalError;
use crate::gateway::{EligibilityGate, InlineButton, Messenger};
use crate::types::{BotIdentity, MessageRef, UserId};

const MEMBER_STATUSES: [&str; 3] = ["member", "administrator", "creator"];

#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
    chat: ChatInfo,
}

#[derive(Debug, Deserialize)]
struct ChatInfo {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct ChatMember {
    status: String,
}

#[derive(Debug, Deserialize)]
struct UserChatBoosts {
    #[serde(default)]
    boosts: Vec<ChatBoost>,
}

#[derive(Debug, Deserialize)]
struct ChatBoost {
    add_date: i64,
    expiration_date: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Me {
    id: i64,
    username: Option<String>,
}

impl TelegramClient {
    pub fn new(
        api_url: &str,
        bot_token: &str,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, ExternalError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ExternalError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), bot_token),
            max_retries,
        })
    }

    /// Fetches the bot identity. Called once at startup.
    pub async fn get_me(&self) -> Result<BotIdentity, ExternalError> {
        let me: Me = self.call("getMe", json!({})).await?;
        Ok(BotIdentity {
            id: me.id,
            username: me.username.unwrap_or_default(),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> Result<T, ExternalError> {
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(250),
            max_interval: Duration::from_secs(5),
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let mut attempt = 0;

        loop {
            match self.call_once(method, &body).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let Some(delay) = backoff.next_backoff() else {
                        return Err(err);
                    };
                    attempt += 1;
                    debug!(method, attempt, ?delay, error = %err, "retrying platform call");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn call_once<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
    ) -> Result<T, ExternalError> {
        let resp = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(body)
            .send()
            .await
            .map_err(|err| ExternalError::Transport(err.without_url().to_string()))?;

        let status = resp.status();
        let parsed: ApiResponse<T> = resp
            .json()
            .await
            .map_err(|_| ExternalError::Decode(method.to_string()))?;

        if parsed.ok {
            return parsed
                .result
                .ok_or_else(|| ExternalError::Decode(method.to_string()));
        }

        let description = parsed
            .description
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        let code = parsed.error_code.unwrap_or(status.as_u16());
        if code == 429 || code >= 500 {
            return Err(ExternalError::Transport(description));
        }
        Err(ExternalError::Rejected {
            method: method.to_string(),
            description,
        })
    }
}

/// Accepts numeric chat ids and `@username` references alike.
fn chat_param(chat: &str) -> Value {
    match chat.parse::<i64>() {
        Ok(id) => json!(id),
        Err(_) => json!(chat),
    }
}

fn inline_keyboard(buttons: &[InlineButton]) -> Value {
    let rows: Vec<Value> = buttons
        .iter()
        .map(|button| match button {
            InlineButton::Url { text, url } => json!([{ "text": text, "url": url }]),
            InlineButton::Callback { text, data } => json!([{ "text": text, "callback_data": data }]),
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

pub(crate) fn boost_is_valid(
    add_date: i64,
    expiration_date: Option<i64>,
    since: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    let Some(added) = Utc.timestamp_opt(add_date, 0).single() else {
        return false;
    };
    let active = match expiration_date.and_then(|ts| Utc.timestamp_opt(ts, 0).single()) {
        Some(expires) => expires > now,
        None => true,
    };
    added >= since && active
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_message(
        &self,
        chat: &str,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<MessageRef, ExternalError> {
        let mut body = json!({
            "chat_id": chat_param(chat),
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        if let Some(message_id) = reply_to {
            body["reply_parameters"] = json!({
                "message_id": message_id,
                "allow_sending_without_reply": true,
            });
        }
        let sent: SentMessage = self.call("sendMessage", body).await?;
        Ok(MessageRef {
            chat_id: sent.chat.id,
            message_id: sent.message_id,
        })
    }

    async fn send_with_buttons(
        &self,
        chat: &str,
        text: &str,
        buttons: &[InlineButton],
    ) -> Result<MessageRef, ExternalError> {
        let mut body = json!({
            "chat_id": chat_param(chat),
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        if !buttons.is_empty() {
            body["reply_markup"] = inline_keyboard(buttons);
        }
        let sent: SentMessage = self.call("sendMessage", body).await?;
        Ok(MessageRef {
            chat_id: sent.chat.id,
            message_id: sent.message_id,
        })
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), ExternalError> {
        let _: bool = self
            .call(
                "deleteMessage",
                json!({ "chat_id": chat_id, "message_id": message_id }),
            )
            .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<(), ExternalError> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                json!({ "callback_query_id": callback_id, "text": text, "show_alert": true }),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl EligibilityGate for TelegramClient {
    async fn missing_requirements(&self, user_id: UserId, required: &[String]) -> Vec<String> {
        let mut missing = Vec::new();
        for channel in required {
            let member: Result<ChatMember, _> = self
                .call(
                    "getChatMember",
                    json!({ "chat_id": chat_param(channel), "user_id": user_id }),
                )
                .await;
            match member {
                Ok(member) if MEMBER_STATUSES.contains(&member.status.as_str()) => {}
                Ok(_) => missing.push(channel.clone()),
                Err(err) => {
                    warn!(%channel, user_id, error = %err, "membership check failed");
                    missing.push(channel.clone());
                }
            }
        }
        missing
    }

    async fn has_valid_boost(
        &self,
        chat: &str,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<bool, ExternalError> {
        let boosts: UserChatBoosts = self
            .call(
                "getUserChatBoosts",
                json!({ "chat_id": chat_param(chat), "user_id": user_id }),
            )
            .await?;
        let now = Utc::now();
        Ok(boosts
            .boosts
            .iter()
            .any(|b| boost_is_valid(b.add_date, b.expiration_date, since, now)))
    }
}
