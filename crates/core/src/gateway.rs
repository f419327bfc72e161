use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ExternalError;
use crate::types::{MessageRef, UserId};

/// External membership and loyalty-grant checks.
#[async_trait]
pub trait EligibilityGate: Send + Sync {
    /// Channels from `required` the user is not a member of. A lookup that
    /// fails counts as unmet.
    async fn missing_requirements(&self, user_id: UserId, required: &[String]) -> Vec<String>;

    /// Whether the user holds an active grant for `chat` issued at or after
    /// `since`.
    async fn has_valid_boost(
        &self,
        chat: &str,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<bool, ExternalError>;
}

/// Inline keyboard button attached to a published post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineButton {
    Url { text: String, url: String },
    Callback { text: String, data: String },
}

/// Outbound side effects on the messaging platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(
        &self,
        chat: &str,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<MessageRef, ExternalError>;

    /// Sends `text` with one button per row.
    async fn send_with_buttons(
        &self,
        chat: &str,
        text: &str,
        buttons: &[InlineButton],
    ) -> Result<MessageRef, ExternalError>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), ExternalError>;

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<(), ExternalError>;
}
