//! Postgres implementation of the campaign store port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::StatusColumn;
use crate::queries;
use giveaway_core::error::StoreError;
use giveaway_core::lifecycle::Transition;
use giveaway_core::store::{CampaignStore, StoreResult};
use giveaway_core::types::{
    Campaign, CampaignId, Entry, EntryInsert, NewCampaign, Participant, PostRef, ReferralInsert,
    UserId, Winner,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CampaignStore for PgStore {
    async fn create_campaign(&self, campaign: &NewCampaign) -> StoreResult<Campaign> {
        let row = queries::campaigns::create(&self.pool, campaign)
            .await
            .map_err(StoreError::backend)?;
        Ok(row.into())
    }

    async fn get_campaign(&self, id: CampaignId) -> StoreResult<Option<Campaign>> {
        let row = queries::campaigns::get_by_id(&self.pool, id)
            .await
            .map_err(StoreError::backend)?;
        Ok(row.map(Into::into))
    }

    async fn list_open(&self) -> StoreResult<Vec<Campaign>> {
        let rows = queries::campaigns::list_open(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_comment_campaign(
        &self,
        chat_id: i64,
        thread_message_id: i64,
    ) -> StoreResult<Option<Campaign>> {
        let row = queries::campaigns::find_by_thread(&self.pool, chat_id, thread_message_id)
            .await
            .map_err(StoreError::backend)?;
        Ok(row.map(Into::into))
    }

    async fn set_post_ref(&self, id: CampaignId, post: PostRef) -> StoreResult<bool> {
        queries::campaigns::set_post_ref(
            &self.pool,
            id,
            post.post.chat_id,
            post.post.message_id,
            post.discussion.map(|d| d.chat_id),
            post.discussion.map(|d| d.message_id),
        )
        .await
        .map_err(StoreError::backend)
    }

    async fn transition(
        &self,
        id: CampaignId,
        transition: Transition,
        owner: &str,
    ) -> StoreResult<bool> {
        queries::campaigns::transition(
            &self.pool,
            id,
            StatusColumn::from(transition.from()),
            StatusColumn::from(transition.to()),
            transition.sets_lock_owner().then_some(owner),
            transition.requires_announced(),
        )
        .await
        .map_err(StoreError::backend)
    }

    async fn take_over_claim(
        &self,
        id: CampaignId,
        stale_before: DateTime<Utc>,
        owner: &str,
    ) -> StoreResult<bool> {
        queries::campaigns::take_over_claim(&self.pool, id, stale_before, owner)
            .await
            .map_err(StoreError::backend)
    }

    async fn add_entry(&self, id: CampaignId, participant: &Participant) -> StoreResult<EntryInsert> {
        let inserted = queries::entries::insert_if_open(
            &self.pool,
            id,
            participant.user_id,
            participant.username.as_deref(),
            participant.first_name.as_deref(),
        )
        .await
        .map_err(StoreError::backend)?;
        if inserted {
            return Ok(EntryInsert::Inserted);
        }
        if self.has_entry(id, participant.user_id).await? {
            Ok(EntryInsert::Duplicate)
        } else {
            Ok(EntryInsert::Closed)
        }
    }

    async fn has_entry(&self, id: CampaignId, user_id: UserId) -> StoreResult<bool> {
        queries::entries::exists(&self.pool, id, user_id)
            .await
            .map_err(StoreError::backend)
    }

    async fn count_entries(&self, id: CampaignId) -> StoreResult<i64> {
        queries::entries::count(&self.pool, id)
            .await
            .map_err(StoreError::backend)
    }

    async fn list_entries(&self, id: CampaignId) -> StoreResult<Vec<Entry>> {
        let rows = queries::entries::list(&self.pool, id)
            .await
            .map_err(StoreError::backend)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn add_referral(
        &self,
        id: CampaignId,
        referrer_id: UserId,
        referred_id: UserId,
    ) -> StoreResult<ReferralInsert> {
        if referrer_id == referred_id {
            return Ok(ReferralInsert::SelfReferral);
        }
        let recorded = queries::referrals::insert_if_open(&self.pool, id, referrer_id, referred_id)
            .await
            .map_err(StoreError::backend)?;
        if recorded {
            return Ok(ReferralInsert::Recorded);
        }
        let referred = queries::referrals::is_referred(&self.pool, id, referred_id)
            .await
            .map_err(StoreError::backend)?;
        if referred {
            Ok(ReferralInsert::AlreadyReferred)
        } else {
            Ok(ReferralInsert::Closed)
        }
    }

    async fn referral_count(&self, id: CampaignId, referrer_id: UserId) -> StoreResult<i64> {
        queries::referrals::count_for_referrer(&self.pool, id, referrer_id)
            .await
            .map_err(StoreError::backend)
    }

    async fn referral_counts(&self, id: CampaignId) -> StoreResult<Vec<(UserId, i64)>> {
        let rows = queries::referrals::counts(&self.pool, id)
            .await
            .map_err(StoreError::backend)?;
        Ok(rows.into_iter().map(|r| (r.referrer_id, r.referred)).collect())
    }

    async fn persist_winners(&self, id: CampaignId, winners: &[UserId]) -> StoreResult<bool> {
        queries::winners::persist_once(&self.pool, id, winners)
            .await
            .map_err(StoreError::backend)
    }

    async fn get_winners(&self, id: CampaignId) -> StoreResult<Vec<Winner>> {
        let rows = queries::winners::list(&self.pool, id)
            .await
            .map_err(StoreError::backend)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_announced(&self, id: CampaignId) -> StoreResult<bool> {
        let won = queries::campaigns::mark_announced(&self.pool, id)
            .await
            .map_err(StoreError::backend)?;
        if !won {
            let exists = queries::campaigns::exists(&self.pool, id)
                .await
                .map_err(StoreError::backend)?;
            if !exists {
                return Err(StoreError::NotFound(id));
            }
        }
        Ok(won)
    }
}
