use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use giveaway_core::lifecycle::CampaignStatus;
use giveaway_core::types::{Campaign, CampaignType, Entry, MessageRef, PostRef, Winner};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "campaign_status", rename_all = "lowercase")]
pub enum StatusColumn {
    Scheduled,
    Drawing,
    Finished,
    Canceled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "campaign_type", rename_all = "snake_case")]
pub enum KindColumn {
    DirectOptIn,
    Referral,
    SingleComment,
    BoostGated,
}

impl From<CampaignStatus> for StatusColumn {
    fn from(status: CampaignStatus) -> Self {
        match status {
            CampaignStatus::Scheduled => StatusColumn::Scheduled,
            CampaignStatus::Drawing => StatusColumn::Drawing,
            CampaignStatus::Finished => StatusColumn::Finished,
            CampaignStatus::Canceled => StatusColumn::Canceled,
        }
    }
}

impl From<StatusColumn> for CampaignStatus {
    fn from(status: StatusColumn) -> Self {
        match status {
            StatusColumn::Scheduled => CampaignStatus::Scheduled,
            StatusColumn::Drawing => CampaignStatus::Drawing,
            StatusColumn::Finished => CampaignStatus::Finished,
            StatusColumn::Canceled => CampaignStatus::Canceled,
        }
    }
}

impl From<CampaignType> for KindColumn {
    fn from(kind: CampaignType) -> Self {
        match kind {
            CampaignType::DirectOptIn => KindColumn::DirectOptIn,
            CampaignType::Referral => KindColumn::Referral,
            CampaignType::SingleComment => KindColumn::SingleComment,
            CampaignType::BoostGated => KindColumn::BoostGated,
        }
    }
}

impl From<KindColumn> for CampaignType {
    fn from(kind: KindColumn) -> Self {
        match kind {
            KindColumn::DirectOptIn => CampaignType::DirectOptIn,
            KindColumn::Referral => CampaignType::Referral,
            KindColumn::SingleComment => CampaignType::SingleComment,
            KindColumn::BoostGated => CampaignType::BoostGated,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CampaignRow {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub kind: KindColumn,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub required_channels: Vec<String>,
    pub winners_count: i32,
    pub target_chat: String,
    pub post_chat_id: Option<i64>,
    pub post_message_id: Option<i64>,
    pub discussion_chat_id: Option<i64>,
    pub thread_message_id: Option<i64>,
    pub status: StatusColumn,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub image_ref: Option<String>,
    pub lock_owner: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub drawn_at: Option<DateTime<Utc>>,
    pub announced: bool,
}

impl From<CampaignRow> for Campaign {
    fn from(row: CampaignRow) -> Self {
        let post = match (row.post_chat_id, row.post_message_id) {
            (Some(chat_id), Some(message_id)) => Some(PostRef {
                post: MessageRef { chat_id, message_id },
                discussion: match (row.discussion_chat_id, row.thread_message_id) {
                    (Some(chat_id), Some(message_id)) => Some(MessageRef { chat_id, message_id }),
                    _ => None,
                },
            }),
            _ => None,
        };
        Campaign {
            id: row.id,
            title: row.title,
            description: row.description,
            kind: row.kind.into(),
            start_at: row.start_at,
            end_at: row.end_at,
            required_channels: row.required_channels,
            winners_count: row.winners_count,
            target_chat: row.target_chat,
            post,
            status: row.status.into(),
            created_by: row.created_by,
            created_at: row.created_at,
            image_ref: row.image_ref,
            lock_owner: row.lock_owner,
            claimed_at: row.claimed_at,
            drawn_at: row.drawn_at,
            announced: row.announced,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct EntryRow {
    pub campaign_id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub joined_at: DateTime<Utc>,
}

impl From<EntryRow> for Entry {
    fn from(row: EntryRow) -> Self {
        Entry {
            campaign_id: row.campaign_id,
            user_id: row.user_id,
            username: row.username,
            first_name: row.first_name,
            joined_at: row.joined_at,
        }
    }
}

#[derive(Debug, Clone, Copy, FromRow)]
pub struct WinnerRow {
    pub user_id: i64,
    pub place: i32,
}

impl From<WinnerRow> for Winner {
    fn from(row: WinnerRow) -> Self {
        Winner {
            user_id: row.user_id,
            place: row.place,
        }
    }
}

#[derive(Debug, Clone, Copy, FromRow)]
pub struct ReferralCountRow {
    pub referrer_id: i64,
    pub referred: i64,
}
