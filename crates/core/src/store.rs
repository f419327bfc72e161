//! Campaign store port.
//!
//! Every mutation is a single conditional statement (or one transaction for
//! the winners list) so that concurrent processes sharing the database
//! coordinate through row-level compare-and-set only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::lifecycle::Transition;
use crate::types::{
    Campaign, CampaignId, Entry, EntryInsert, NewCampaign, Participant, PostRef, ReferralInsert,
    UserId, Winner,
};

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn create_campaign(&self, campaign: &NewCampaign) -> StoreResult<Campaign>;

    async fn get_campaign(&self, id: CampaignId) -> StoreResult<Option<Campaign>>;

    /// Non-terminal campaigns (Scheduled or Drawing), earliest deadline first.
    async fn list_open(&self) -> StoreResult<Vec<Campaign>>;

    /// The Scheduled single-comment campaign whose discussion thread is
    /// `(chat_id, thread_message_id)`.
    async fn find_comment_campaign(
        &self,
        chat_id: i64,
        thread_message_id: i64,
    ) -> StoreResult<Option<Campaign>>;

    async fn set_post_ref(&self, id: CampaignId, post: PostRef) -> StoreResult<bool>;

    /// Applies `transition` iff the campaign is currently in
    /// `transition.from()`. Returns whether this call performed it.
    async fn transition(
        &self,
        id: CampaignId,
        transition: Transition,
        owner: &str,
    ) -> StoreResult<bool>;

    /// Re-assigns a Drawing claim to `owner` when it is already held by
    /// `owner` or was taken before `stale_before`.
    async fn take_over_claim(
        &self,
        id: CampaignId,
        stale_before: DateTime<Utc>,
        owner: &str,
    ) -> StoreResult<bool>;

    /// Inserts an entry only while the campaign is Scheduled.
    async fn add_entry(&self, id: CampaignId, participant: &Participant)
        -> StoreResult<EntryInsert>;

    async fn has_entry(&self, id: CampaignId, user_id: UserId) -> StoreResult<bool>;

    async fn count_entries(&self, id: CampaignId) -> StoreResult<i64>;

    async fn list_entries(&self, id: CampaignId) -> StoreResult<Vec<Entry>>;

    /// Records a referral only while the campaign is Scheduled. A referred
    /// user credits at most one referrer.
    async fn add_referral(
        &self,
        id: CampaignId,
        referrer_id: UserId,
        referred_id: UserId,
    ) -> StoreResult<ReferralInsert>;

    async fn referral_count(&self, id: CampaignId, referrer_id: UserId) -> StoreResult<i64>;

    /// Referred-user count per referrer, highest first.
    async fn referral_counts(&self, id: CampaignId) -> StoreResult<Vec<(UserId, i64)>>;

    /// Replaces the winners list and stamps `drawn_at`, once. Returns false
    /// when the list was already persisted or the campaign is not Drawing.
    async fn persist_winners(&self, id: CampaignId, winners: &[UserId]) -> StoreResult<bool>;

    /// Winners ordered by place.
    async fn get_winners(&self, id: CampaignId) -> StoreResult<Vec<Winner>>;

    /// Flips `announced` from false to true. Returns whether this call won.
    async fn mark_announced(&self, id: CampaignId) -> StoreResult<bool>;
}
