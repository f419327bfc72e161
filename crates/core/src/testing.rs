//! In-memory doubles for the store and platform seams, shared by the unit
//! tests of this crate and the api/worker crates (`testing` feature).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::error::{ExternalError, StoreError};
use crate::gateway::{EligibilityGate, InlineButton, Messenger};
use crate::lifecycle::{CampaignStatus, Transition};
use crate::store::{CampaignStore, StoreResult};
use crate::types::{
    Campaign, CampaignId, CampaignType, Entry, EntryInsert, MessageRef, NewCampaign, Participant,
    PostRef, ReferralInsert, UserId, Winner,
};

/// Campaign fields with sane defaults; `end_offset_secs` is relative to now
/// and may be negative for an already-due campaign.
pub fn sample_campaign(kind: CampaignType, end_offset_secs: i64) -> NewCampaign {
    let now = Utc::now();
    let end_at = now + Duration::seconds(end_offset_secs);
    NewCampaign {
        title: format!("{} giveaway", kind.as_str()),
        description: Some("test prize".to_string()),
        kind,
        start_at: end_at.min(now) - Duration::hours(1),
        end_at,
        required_channels: vec![],
        winners_count: 1,
        target_chat: "@giveaways".to_string(),
        created_by: 1,
        image_ref: None,
    }
}

#[derive(Default)]
struct Inner {
    next_id: CampaignId,
    campaigns: BTreeMap<CampaignId, Campaign>,
    entries: BTreeMap<(CampaignId, UserId), Entry>,
    referrals: BTreeMap<(CampaignId, UserId), UserId>,
    winners: HashMap<CampaignId, Vec<Winner>>,
}

/// Store with the same conditional semantics as the Postgres adapter; the
/// single lock plays the role of row-level atomicity.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    failing_counts: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes entry and referral counts fail with a backend error.
    pub fn fail_counts(&self, fail: bool) {
        self.failing_counts.store(fail, Ordering::SeqCst);
    }

    fn check_counts(&self) -> StoreResult<()> {
        if self.failing_counts.load(Ordering::SeqCst) {
            return Err(StoreError::backend(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            )));
        }
        Ok(())
    }

    /// Moves a claim timestamp into the past to simulate a dead owner.
    pub async fn backdate_claim(&self, id: CampaignId, claimed_at: DateTime<Utc>) {
        let mut inner = self.inner.lock().await;
        if let Some(campaign) = inner.campaigns.get_mut(&id) {
            campaign.claimed_at = Some(claimed_at);
        }
    }

    /// Overwrites the deadline, bypassing creation-time validation.
    pub async fn set_deadline(&self, id: CampaignId, end_at: DateTime<Utc>) {
        let mut inner = self.inner.lock().await;
        if let Some(campaign) = inner.campaigns.get_mut(&id) {
            campaign.end_at = end_at;
        }
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn create_campaign(&self, new: &NewCampaign) -> StoreResult<Campaign> {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let campaign = Campaign {
            id: inner.next_id,
            title: new.title.clone(),
            description: new.description.clone(),
            kind: new.kind,
            start_at: new.start_at,
            end_at: new.end_at,
            required_channels: new.required_channels.clone(),
            winners_count: new.winners_count,
            target_chat: new.target_chat.clone(),
            post: None,
            status: CampaignStatus::Scheduled,
            created_by: new.created_by,
            created_at: Utc::now(),
            image_ref: new.image_ref.clone(),
            lock_owner: None,
            claimed_at: None,
            drawn_at: None,
            announced: false,
        };
        inner.campaigns.insert(campaign.id, campaign.clone());
        Ok(campaign)
    }

    async fn get_campaign(&self, id: CampaignId) -> StoreResult<Option<Campaign>> {
        Ok(self.inner.lock().await.campaigns.get(&id).cloned())
    }

    async fn list_open(&self) -> StoreResult<Vec<Campaign>> {
        let inner = self.inner.lock().await;
        let mut open: Vec<Campaign> = inner
            .campaigns
            .values()
            .filter(|c| !c.status.is_terminal())
            .cloned()
            .collect();
        open.sort_by_key(|c| (c.end_at, c.id));
        Ok(open)
    }

    async fn find_comment_campaign(
        &self,
        chat_id: i64,
        thread_message_id: i64,
    ) -> StoreResult<Option<Campaign>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .campaigns
            .values()
            .find(|c| {
                c.kind == CampaignType::SingleComment
                    && c.status == CampaignStatus::Scheduled
                    && c.post.and_then(|p| p.discussion)
                        == Some(MessageRef {
                            chat_id,
                            message_id: thread_message_id,
                        })
            })
            .cloned())
    }

    async fn set_post_ref(&self, id: CampaignId, post: PostRef) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        match inner.campaigns.get_mut(&id) {
            Some(campaign) => {
                campaign.post = Some(post);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn transition(
        &self,
        id: CampaignId,
        transition: Transition,
        owner: &str,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let Some(campaign) = inner.campaigns.get_mut(&id) else {
            return Ok(false);
        };
        if campaign.status != transition.from() {
            return Ok(false);
        }
        if transition.requires_announced() && !campaign.announced {
            return Ok(false);
        }
        campaign.status = transition.to();
        if transition.sets_lock_owner() {
            campaign.lock_owner = Some(owner.to_string());
            campaign.claimed_at = Some(Utc::now());
        }
        Ok(true)
    }

    async fn take_over_claim(
        &self,
        id: CampaignId,
        stale_before: DateTime<Utc>,
        owner: &str,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let Some(campaign) = inner.campaigns.get_mut(&id) else {
            return Ok(false);
        };
        let takeable = campaign.status == CampaignStatus::Drawing
            && (campaign.lock_owner.as_deref() == Some(owner)
                || campaign.claimed_at.map_or(true, |at| at < stale_before));
        if takeable {
            campaign.lock_owner = Some(owner.to_string());
            campaign.claimed_at = Some(Utc::now());
        }
        Ok(takeable)
    }

    async fn add_entry(&self, id: CampaignId, participant: &Participant) -> StoreResult<EntryInsert> {
        let mut inner = self.inner.lock().await;
        let open = inner
            .campaigns
            .get(&id)
            .map_or(false, |c| c.status == CampaignStatus::Scheduled);
        if !open {
            return Ok(EntryInsert::Closed);
        }
        let key = (id, participant.user_id);
        if inner.entries.contains_key(&key) {
            return Ok(EntryInsert::Duplicate);
        }
        inner.entries.insert(
            key,
            Entry {
                campaign_id: id,
                user_id: participant.user_id,
                username: participant.username.clone(),
                first_name: participant.first_name.clone(),
                joined_at: Utc::now(),
            },
        );
        Ok(EntryInsert::Inserted)
    }

    async fn has_entry(&self, id: CampaignId, user_id: UserId) -> StoreResult<bool> {
        Ok(self.inner.lock().await.entries.contains_key(&(id, user_id)))
    }

    async fn count_entries(&self, id: CampaignId) -> StoreResult<i64> {
        self.check_counts()?;
        let inner = self.inner.lock().await;
        Ok(inner.entries.keys().filter(|(cid, _)| *cid == id).count() as i64)
    }

    async fn list_entries(&self, id: CampaignId) -> StoreResult<Vec<Entry>> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<Entry> = inner
            .entries
            .values()
            .filter(|e| e.campaign_id == id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.joined_at, e.user_id));
        Ok(entries)
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
        let mut inner = self.inner.lock().await;
        let open = inner
            .campaigns
            .get(&id)
            .map_or(false, |c| c.status == CampaignStatus::Scheduled);
        if !open {
            return Ok(ReferralInsert::Closed);
        }
        if inner.referrals.contains_key(&(id, referred_id)) {
            return Ok(ReferralInsert::AlreadyReferred);
        }
        inner.referrals.insert((id, referred_id), referrer_id);
        Ok(ReferralInsert::Recorded)
    }

    async fn referral_count(&self, id: CampaignId, referrer_id: UserId) -> StoreResult<i64> {
        self.check_counts()?;
        let inner = self.inner.lock().await;
        Ok(inner
            .referrals
            .iter()
            .filter(|((cid, _), referrer)| *cid == id && **referrer == referrer_id)
            .count() as i64)
    }

    async fn referral_counts(&self, id: CampaignId) -> StoreResult<Vec<(UserId, i64)>> {
        let inner = self.inner.lock().await;
        let mut counts: BTreeMap<UserId, i64> = BTreeMap::new();
        for ((cid, _), referrer) in inner.referrals.iter() {
            if *cid == id {
                *counts.entry(*referrer).or_default() += 1;
            }
        }
        let mut counts: Vec<(UserId, i64)> = counts.into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(counts)
    }

    async fn persist_winners(&self, id: CampaignId, winners: &[UserId]) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let Some(campaign) = inner.campaigns.get_mut(&id) else {
            return Ok(false);
        };
        if campaign.status != CampaignStatus::Drawing || campaign.drawn_at.is_some() {
            return Ok(false);
        }
        campaign.drawn_at = Some(Utc::now());
        let rows = winners
            .iter()
            .enumerate()
            .map(|(i, user_id)| Winner {
                user_id: *user_id,
                place: i as i32 + 1,
            })
            .collect();
        inner.winners.insert(id, rows);
        Ok(true)
    }

    async fn get_winners(&self, id: CampaignId) -> StoreResult<Vec<Winner>> {
        let inner = self.inner.lock().await;
        Ok(inner.winners.get(&id).cloned().unwrap_or_default())
    }

    async fn mark_announced(&self, id: CampaignId) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        match inner.campaigns.get_mut(&id) {
            Some(campaign) if !campaign.announced => {
                campaign.announced = true;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(id)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub chat: String,
    pub text: String,
    pub reply_to: Option<i64>,
    pub buttons: Vec<InlineButton>,
}

/// Records successful sends; `failing()` rejects every call instead and
/// `slow()` holds every send for a fixed delay before recording it.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: StdMutex<Vec<Sent>>,
    deleted: StdMutex<Vec<MessageRef>>,
    callbacks: StdMutex<Vec<(String, String)>>,
    next_message_id: AtomicI64,
    fail: bool,
    send_delay: Option<std::time::Duration>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn slow(send_delay: std::time::Duration) -> Self {
        Self {
            send_delay: Some(send_delay),
            ..Self::default()
        }
    }

    async fn in_flight(&self) {
        if let Some(delay) = self.send_delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn messages_to(&self, chat: &str) -> Vec<Sent> {
        self.sent().into_iter().filter(|s| s.chat == chat).collect()
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        self.deleted.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn callback_answers(&self) -> Vec<(String, String)> {
        self.callbacks.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn rejected(method: &str) -> ExternalError {
        ExternalError::Rejected {
            method: method.to_string(),
            description: "Forbidden: bot was blocked by the user".to_string(),
        }
    }
}

impl RecordingMessenger {
    fn record(&self, sent: Sent) -> Result<MessageRef, ExternalError> {
        if self.fail {
            return Err(Self::rejected("sendMessage"));
        }
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1;
        let chat_id = sent.chat.parse().unwrap_or(0);
        if let Ok(mut log) = self.sent.lock() {
            log.push(sent);
        }
        Ok(MessageRef { chat_id, message_id })
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_message(
        &self,
        chat: &str,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<MessageRef, ExternalError> {
        self.in_flight().await;
        self.record(Sent {
            chat: chat.to_string(),
            text: text.to_string(),
            reply_to,
            buttons: vec![],
        })
    }

    async fn send_with_buttons(
        &self,
        chat: &str,
        text: &str,
        buttons: &[InlineButton],
    ) -> Result<MessageRef, ExternalError> {
        self.in_flight().await;
        self.record(Sent {
            chat: chat.to_string(),
            text: text.to_string(),
            reply_to: None,
            buttons: buttons.to_vec(),
        })
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), ExternalError> {
        if self.fail {
            return Err(Self::rejected("deleteMessage"));
        }
        if let Ok(mut deleted) = self.deleted.lock() {
            deleted.push(MessageRef { chat_id, message_id });
        }
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<(), ExternalError> {
        if self.fail {
            return Err(Self::rejected("answerCallbackQuery"));
        }
        if let Ok(mut callbacks) = self.callbacks.lock() {
            callbacks.push((callback_id.to_string(), text.to_string()));
        }
        Ok(())
    }
}

/// Eligibility answers configured up front.
#[derive(Default)]
pub struct StaticGate {
    boosters: StdMutex<HashSet<UserId>>,
    missing: StdMutex<HashMap<UserId, Vec<String>>>,
    failing_boosts: StdMutex<HashSet<UserId>>,
    boost_checks: AtomicUsize,
}

impl StaticGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_boosters(&self, users: impl IntoIterator<Item = UserId>) {
        if let Ok(mut boosters) = self.boosters.lock() {
            *boosters = users.into_iter().collect();
        }
    }

    /// Makes `user_id` appear to lack the given channels.
    pub fn set_missing(&self, user_id: UserId, channels: &[&str]) {
        if let Ok(mut missing) = self.missing.lock() {
            missing.insert(user_id, channels.iter().map(|c| c.to_string()).collect());
        }
    }

    /// Makes the boost lookup for `user_id` fail with a transport error.
    pub fn fail_boost_for(&self, user_id: UserId) {
        if let Ok(mut failing) = self.failing_boosts.lock() {
            failing.insert(user_id);
        }
    }

    pub fn boost_checks(&self) -> usize {
        self.boost_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EligibilityGate for StaticGate {
    async fn missing_requirements(&self, user_id: UserId, required: &[String]) -> Vec<String> {
        let missing = self
            .missing
            .lock()
            .map(|m| m.get(&user_id).cloned().unwrap_or_default())
            .unwrap_or_default();
        required
            .iter()
            .filter(|channel| missing.contains(channel))
            .cloned()
            .collect()
    }

    async fn has_valid_boost(
        &self,
        _chat: &str,
        user_id: UserId,
        _since: DateTime<Utc>,
    ) -> Result<bool, ExternalError> {
        self.boost_checks.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_boosts
            .lock()
            .map(|f| f.contains(&user_id))
            .unwrap_or(false);
        if failing {
            return Err(ExternalError::Transport("connection reset".to_string()));
        }
        Ok(self
            .boosters
            .lock()
            .map(|b| b.contains(&user_id))
            .unwrap_or(false))
    }
}
