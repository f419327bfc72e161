use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::lifecycle::CampaignStatus;

pub type CampaignId = i64;
pub type UserId = i64;

pub const MAX_TITLE_LEN: usize = 256;
pub const MAX_DESCRIPTION_LEN: usize = 4000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CampaignType {
    DirectOptIn,
    Referral,
    SingleComment,
    BoostGated,
}

impl CampaignType {
    pub const ALL: [CampaignType; 4] = [
        CampaignType::DirectOptIn,
        CampaignType::Referral,
        CampaignType::SingleComment,
        CampaignType::BoostGated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignType::DirectOptIn => "direct_opt_in",
            CampaignType::Referral => "referral",
            CampaignType::SingleComment => "single_comment",
            CampaignType::BoostGated => "boost_gated",
        }
    }
}

/// Location of a published message in the messaging platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PostRef {
    pub post: MessageRef,
    pub discussion: Option<MessageRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: CampaignId,
    pub title: String,
    pub description: Option<String>,
    pub kind: CampaignType,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub required_channels: Vec<String>,
    pub winners_count: i32,
    pub target_chat: String,
    pub post: Option<PostRef>,
    pub status: CampaignStatus,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub image_ref: Option<String>,
    pub lock_owner: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub drawn_at: Option<DateTime<Utc>>,
    pub announced: bool,
}

impl Campaign {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.end_at <= now
    }

    /// Entries are only collected while nobody has claimed the draw and the
    /// deadline has not passed.
    pub fn accepts_entries(&self, now: DateTime<Utc>) -> bool {
        self.status == CampaignStatus::Scheduled && !self.is_due(now)
    }

    pub fn winners_persisted(&self) -> bool {
        self.drawn_at.is_some()
    }

    /// Chat whose loyalty grants gate a `BoostGated` campaign.
    pub fn boost_chat(&self) -> String {
        match self.post {
            Some(post) => post.post.chat_id.to_string(),
            None => self.target_chat.clone(),
        }
    }
}

/// Campaign fields as collected by the creation wizard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCampaign {
    pub title: String,
    pub description: Option<String>,
    pub kind: CampaignType,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default)]
    pub required_channels: Vec<String>,
    pub winners_count: i32,
    pub target_chat: String,
    pub created_by: UserId,
    pub image_ref: Option<String>,
}

impl NewCampaign {
    /// Checks the invariants a campaign must satisfy at creation and
    /// normalises the channel list in place.
    pub fn validate(&mut self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        self.title = self.title.trim().to_string();
        if self.title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(ValidationError::TooLong("title"));
        }
        if let Some(description) = self.description.as_ref() {
            if description.chars().count() > MAX_DESCRIPTION_LEN {
                return Err(ValidationError::TooLong("description"));
            }
        }
        if self.winners_count < 1 {
            return Err(ValidationError::WinnersCount(self.winners_count));
        }
        if self.end_at <= self.start_at {
            return Err(ValidationError::EndBeforeStart);
        }
        if self.end_at <= now {
            return Err(ValidationError::DeadlinePassed);
        }
        self.target_chat = self.target_chat.trim().to_string();
        if self.target_chat.is_empty() {
            return Err(ValidationError::MissingTarget);
        }
        self.required_channels = normalize_channels(&self.required_channels);
        Ok(())
    }
}

/// Trims, drops blanks and `-` placeholders, and removes duplicates while
/// keeping the first-seen order.
pub fn normalize_channels(raw: &[String]) -> Vec<String> {
    let mut channels: Vec<String> = Vec::new();
    for item in raw.iter().flat_map(|value| value.split(',')) {
        let item = item.trim();
        if item.is_empty() || item == "-" {
            continue;
        }
        if !channels.iter().any(|existing| existing == item) {
            channels.push(item.to_string());
        }
    }
    channels
}

/// Username and display name captured when a user joins.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub user_id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

impl Participant {
    pub fn anonymous(user_id: UserId) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub campaign_id: CampaignId,
    pub user_id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Referral {
    pub campaign_id: CampaignId,
    pub referrer_id: UserId,
    pub referred_id: UserId,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Winner {
    pub user_id: UserId,
    pub place: i32,
}

/// Result of a conditional entry insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryInsert {
    Inserted,
    Duplicate,
    /// The campaign is no longer Scheduled.
    Closed,
}

/// Result of a referral insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferralInsert {
    Recorded,
    AlreadyReferred,
    SelfReferral,
    Closed,
}

/// Identity of the bot account, fetched once at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: i64,
    pub username: String,
}

impl BotIdentity {
    pub fn start_link(&self, payload: &str) -> String {
        format!("https://t.me/{}?start={}", self.username, payload)
    }

    pub fn referral_link(&self, campaign_id: CampaignId, referrer: UserId) -> String {
        self.start_link(&format!("ref-{}-{}", campaign_id, referrer))
    }

    pub fn mini_app_link(&self, app_short_name: &str, campaign_id: CampaignId) -> String {
        format!(
            "https://t.me/{}/{}?startapp=gid-{}",
            self.username, app_short_name, campaign_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_campaign(now: DateTime<Utc>) -> NewCampaign {
        NewCampaign {
            title: "  Spring giveaway ".to_string(),
            description: Some("three prizes".to_string()),
            kind: CampaignType::DirectOptIn,
            start_at: now,
            end_at: now + Duration::hours(1),
            required_channels: vec!["@news, @chat".to_string(), "@news".to_string(), "-".to_string()],
            winners_count: 3,
            target_chat: "@news".to_string(),
            created_by: 42,
            image_ref: None,
        }
    }

    #[test]
    fn test_validate_normalises_fields() {
        let now = Utc::now();
        let mut campaign = new_campaign(now);
        campaign.validate(now).unwrap();

        assert_eq!(campaign.title, "Spring giveaway");
        assert_eq!(campaign.required_channels, vec!["@news", "@chat"]);
    }

    #[test]
    fn test_validate_rejects_end_before_start() {
        let now = Utc::now();
        let mut campaign = new_campaign(now);
        campaign.end_at = campaign.start_at;

        assert_eq!(campaign.validate(now), Err(ValidationError::EndBeforeStart));
    }

    #[test]
    fn test_validate_rejects_zero_winners() {
        let now = Utc::now();
        let mut campaign = new_campaign(now);
        campaign.winners_count = 0;

        assert_eq!(campaign.validate(now), Err(ValidationError::WinnersCount(0)));
    }

    #[test]
    fn test_validate_rejects_past_deadline() {
        let now = Utc::now();
        let mut campaign = new_campaign(now - Duration::hours(2));

        assert_eq!(campaign.validate(now), Err(ValidationError::DeadlinePassed));
    }

    #[test]
    fn test_validate_rejects_blank_title() {
        let now = Utc::now();
        let mut campaign = new_campaign(now);
        campaign.title = "   ".to_string();

        assert_eq!(campaign.validate(now), Err(ValidationError::EmptyTitle));
    }

    #[test]
    fn test_campaign_type_serializes_snake_case() {
        for kind in CampaignType::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_referral_link_format() {
        let bot = BotIdentity {
            id: 1,
            username: "prize_bot".to_string(),
        };
        assert_eq!(
            bot.referral_link(7, 99),
            "https://t.me/prize_bot?start=ref-7-99"
        );
        assert_eq!(
            bot.mini_app_link("join", 7),
            "https://t.me/prize_bot/join?startapp=gid-7"
        );
    }
}
