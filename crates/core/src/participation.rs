//! Entry and referral recording for every participation path.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::gateway::EligibilityGate;
use crate::store::CampaignStore;
use crate::types::{Campaign, CampaignId, CampaignType, EntryInsert, Participant, ReferralInsert, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined { total: i64 },
    AlreadyJoined { total: i64 },
    MissingRequirements(Vec<String>),
    NotBoosted,
    /// Unknown campaign, wrong participation type, or no longer open.
    Unavailable,
}

impl JoinOutcome {
    pub fn is_entered(&self) -> bool {
        matches!(self, JoinOutcome::Joined { .. } | JoinOutcome::AlreadyJoined { .. })
    }
}

#[derive(Clone)]
pub struct Participation {
    store: Arc<dyn CampaignStore>,
    gate: Arc<dyn EligibilityGate>,
}

impl Participation {
    pub fn new(store: Arc<dyn CampaignStore>, gate: Arc<dyn EligibilityGate>) -> Self {
        Self { store, gate }
    }

    /// Enters `participant` into campaign `id`, which must be an open
    /// campaign of type `expected`. Re-joining is a no-op that reports the
    /// current total.
    pub async fn join(
        &self,
        id: CampaignId,
        expected: CampaignType,
        participant: &Participant,
    ) -> Result<JoinOutcome, StoreError> {
        match self.store.get_campaign(id).await? {
            Some(campaign) if campaign.kind == expected => self.enter(&campaign, participant).await,
            _ => Ok(JoinOutcome::Unavailable),
        }
    }

    /// Handles a reply in a discussion thread. `None` when the thread does
    /// not belong to an open single-comment campaign.
    pub async fn join_by_comment(
        &self,
        chat_id: i64,
        thread_message_id: i64,
        participant: &Participant,
    ) -> Result<Option<(Campaign, JoinOutcome)>, StoreError> {
        let Some(campaign) = self
            .store
            .find_comment_campaign(chat_id, thread_message_id)
            .await?
        else {
            return Ok(None);
        };
        let outcome = self.enter(&campaign, participant).await?;
        Ok(Some((campaign, outcome)))
    }

    async fn enter(
        &self,
        campaign: &Campaign,
        participant: &Participant,
    ) -> Result<JoinOutcome, StoreError> {
        let user_id = participant.user_id;
        if !campaign.accepts_entries(Utc::now()) {
            return Ok(JoinOutcome::Unavailable);
        }
        if self.store.has_entry(campaign.id, user_id).await? {
            let total = self.store.count_entries(campaign.id).await?;
            return Ok(JoinOutcome::AlreadyJoined { total });
        }

        let missing = self
            .gate
            .missing_requirements(user_id, &campaign.required_channels)
            .await;
        if !missing.is_empty() {
            debug!(campaign_id = campaign.id, user_id, ?missing, "requirements not met");
            return Ok(JoinOutcome::MissingRequirements(missing));
        }

        if campaign.kind == CampaignType::BoostGated {
            let boosted = match self
                .gate
                .has_valid_boost(&campaign.boost_chat(), user_id, campaign.start_at)
                .await
            {
                Ok(boosted) => boosted,
                Err(err) => {
                    warn!(campaign_id = campaign.id, user_id, error = %err, "boost lookup failed");
                    false
                }
            };
            if !boosted {
                return Ok(JoinOutcome::NotBoosted);
            }
        }

        let outcome = match self.store.add_entry(campaign.id, participant).await? {
            EntryInsert::Inserted => JoinOutcome::Joined {
                total: self.store.count_entries(campaign.id).await?,
            },
            EntryInsert::Duplicate => JoinOutcome::AlreadyJoined {
                total: self.store.count_entries(campaign.id).await?,
            },
            EntryInsert::Closed => JoinOutcome::Unavailable,
        };
        Ok(outcome)
    }

    /// Credits `referrer_id` with `referred_id`. `Closed` also covers
    /// unknown campaigns and campaigns of another type.
    pub async fn record_referral(
        &self,
        id: CampaignId,
        referrer_id: UserId,
        referred_id: UserId,
    ) -> Result<ReferralInsert, StoreError> {
        let open = match self.store.get_campaign(id).await? {
            Some(c) => c.kind == CampaignType::Referral && c.accepts_entries(Utc::now()),
            None => false,
        };
        if !open {
            return Ok(ReferralInsert::Closed);
        }
        self.store.add_referral(id, referrer_id, referred_id).await
    }

    pub async fn entry_count(&self, id: CampaignId) -> Result<i64, StoreError> {
        self.store.count_entries(id).await
    }

    pub async fn referral_count(&self, id: CampaignId, referrer_id: UserId) -> Result<i64, StoreError> {
        self.store.referral_count(id, referrer_id).await
    }
}
