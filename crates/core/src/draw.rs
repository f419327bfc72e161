//! Deadline-triggered draw engine.
//!
//! [`DrawEngine::attempt_draw`] is the single entry point for timers,
//! recovery scans and operators. It is safe to call any number of times,
//! from any number of processes: the Scheduled -> Drawing claim admits one
//! owner, winners are persisted once, and the announcement gate admits one
//! publisher.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::announce::{AnnounceOutcome, AnnouncementPublisher};
use crate::error::{DrawError, StoreError};
use crate::gateway::{EligibilityGate, Messenger};
use crate::lifecycle::{CampaignStatus, Transition};
use crate::selection::{select_winners, DrawPool};
use crate::store::CampaignStore;
use crate::types::{Campaign, CampaignId, CampaignType, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawTrigger {
    Timer,
    Recovery,
    /// Manual draw; may run before the deadline and resumes stuck claims
    /// without waiting for them to go stale.
    Operator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawOutcome {
    Completed {
        winners: Vec<UserId>,
        announced_here: bool,
    },
    NotDue,
    /// Another caller claimed the draw first.
    ClaimLost,
    /// Drawing under a fresh claim of another instance.
    HeldElsewhere,
    AlreadyFinished,
    Canceled,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Canceled,
    AlreadyCanceled,
    DrawInProgress,
    AlreadyFinished,
    NotFound,
}

#[derive(Clone)]
pub struct DrawEngine {
    store: Arc<dyn CampaignStore>,
    gate: Arc<dyn EligibilityGate>,
    publisher: AnnouncementPublisher,
    instance_id: String,
    stale_claim: Duration,
}

impl DrawEngine {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        gate: Arc<dyn EligibilityGate>,
        messenger: Arc<dyn Messenger>,
        instance_id: impl Into<String>,
        stale_claim: Duration,
    ) -> Self {
        Self {
            publisher: AnnouncementPublisher::new(store.clone(), messenger),
            store,
            gate,
            instance_id: instance_id.into(),
            stale_claim,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn store(&self) -> &Arc<dyn CampaignStore> {
        &self.store
    }

    pub async fn attempt_draw(
        &self,
        id: CampaignId,
        trigger: DrawTrigger,
    ) -> Result<DrawOutcome, DrawError> {
        let Some(campaign) = self.store.get_campaign(id).await? else {
            return Ok(DrawOutcome::NotFound);
        };
        let now = Utc::now();

        let campaign = match campaign.status {
            CampaignStatus::Finished => return Ok(DrawOutcome::AlreadyFinished),
            CampaignStatus::Canceled => return Ok(DrawOutcome::Canceled),
            CampaignStatus::Scheduled => {
                if trigger != DrawTrigger::Operator && !campaign.is_due(now) {
                    return Ok(DrawOutcome::NotDue);
                }
                if !self
                    .store
                    .transition(id, Transition::Claim, &self.instance_id)
                    .await?
                {
                    debug!(campaign_id = id, ?trigger, "draw already claimed");
                    return Ok(DrawOutcome::ClaimLost);
                }
                info!(campaign_id = id, instance = %self.instance_id, ?trigger, "draw claimed");
                self.reload(id).await?
            }
            CampaignStatus::Drawing => {
                if campaign.lock_owner.as_deref() != Some(self.instance_id.as_str()) {
                    // Operators resume any claim; the cutoff lies past every claim time.
                    let stale_before = match trigger {
                        DrawTrigger::Operator => now + Duration::minutes(1),
                        _ => now - self.stale_claim,
                    };
                    if !self
                        .store
                        .take_over_claim(id, stale_before, &self.instance_id)
                        .await?
                    {
                        debug!(campaign_id = id, owner = ?campaign.lock_owner, "draw held elsewhere");
                        return Ok(DrawOutcome::HeldElsewhere);
                    }
                    warn!(
                        campaign_id = id,
                        previous_owner = ?campaign.lock_owner,
                        instance = %self.instance_id,
                        "took over interrupted draw"
                    );
                    self.reload(id).await?
                } else {
                    info!(campaign_id = id, "resuming interrupted draw");
                    campaign
                }
            }
        };

        self.complete(campaign).await
    }

    /// Drives a claimed campaign to Finished. Every step is conditional, so
    /// re-entering after a crash continues where the previous attempt
    /// stopped.
    async fn complete(&self, campaign: Campaign) -> Result<DrawOutcome, DrawError> {
        let id = campaign.id;

        if !campaign.winners_persisted() {
            let pool = self.build_pool(&campaign).await?;
            let winners = select_winners(
                campaign.kind,
                &pool,
                campaign.winners_count.max(0) as usize,
                &mut rand::thread_rng(),
            );
            if self.store.persist_winners(id, &winners).await? {
                info!(campaign_id = id, pool = pool.len(), winners = winners.len(), "winners persisted");
            } else {
                debug!(campaign_id = id, "winners were persisted by another attempt");
            }
        }

        // Always announce what is stored, never the local sample.
        let winners: Vec<UserId> = self
            .store
            .get_winners(id)
            .await?
            .into_iter()
            .map(|w| w.user_id)
            .collect();

        let announced_here = match self.publisher.publish_once(&campaign, &winners).await? {
            AnnounceOutcome::Published => true,
            AnnounceOutcome::AlreadyAnnounced => false,
        };

        if self
            .store
            .transition(id, Transition::Finish, &self.instance_id)
            .await?
        {
            info!(campaign_id = id, winners = winners.len(), "draw finished");
        }

        Ok(DrawOutcome::Completed {
            winners,
            announced_here,
        })
    }

    async fn build_pool(&self, campaign: &Campaign) -> Result<DrawPool, StoreError> {
        match campaign.kind {
            CampaignType::DirectOptIn | CampaignType::SingleComment => {
                let entries = self.store.list_entries(campaign.id).await?;
                Ok(DrawPool::Entrants(entries.into_iter().map(|e| e.user_id).collect()))
            }
            CampaignType::Referral => Ok(DrawPool::ReferralCounts(
                self.store.referral_counts(campaign.id).await?,
            )),
            CampaignType::BoostGated => {
                let entries = self.store.list_entries(campaign.id).await?;
                let chat = campaign.boost_chat();
                let mut eligible = Vec::with_capacity(entries.len());
                for entry in entries {
                    match self
                        .gate
                        .has_valid_boost(&chat, entry.user_id, campaign.start_at)
                        .await
                    {
                        Ok(true) => eligible.push(entry.user_id),
                        Ok(false) => {}
                        Err(err) => warn!(
                            campaign_id = campaign.id,
                            user_id = entry.user_id,
                            error = %err,
                            "boost check failed, entrant skipped"
                        ),
                    }
                }
                Ok(DrawPool::Entrants(eligible))
            }
        }
    }

    async fn reload(&self, id: CampaignId) -> Result<Campaign, StoreError> {
        self.store
            .get_campaign(id)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    /// Scheduled -> Canceled. Rejected once a draw has been claimed.
    pub async fn cancel(&self, id: CampaignId) -> Result<CancelOutcome, StoreError> {
        if self
            .store
            .transition(id, Transition::Cancel, &self.instance_id)
            .await?
        {
            info!(campaign_id = id, "campaign canceled");
            return Ok(CancelOutcome::Canceled);
        }
        let outcome = match self.store.get_campaign(id).await? {
            None => CancelOutcome::NotFound,
            Some(c) => match c.status {
                CampaignStatus::Canceled => CancelOutcome::AlreadyCanceled,
                CampaignStatus::Finished => CancelOutcome::AlreadyFinished,
                // A Scheduled status here means a claim raced us between the
                // update and this read; report it as in progress.
                CampaignStatus::Drawing | CampaignStatus::Scheduled => CancelOutcome::DrawInProgress,
            },
        };
        Ok(outcome)
    }

    /// Whether a draw attempt for `campaign` could do anything at `now`.
    pub fn needs_attention(&self, campaign: &Campaign, now: DateTime<Utc>) -> bool {
        match campaign.status {
            CampaignStatus::Scheduled => campaign.is_due(now),
            CampaignStatus::Drawing => true,
            CampaignStatus::Finished | CampaignStatus::Canceled => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_campaign, MemoryStore, RecordingMessenger, StaticGate};
    use crate::types::Participant;

    struct Harness {
        store: Arc<MemoryStore>,
        gate: Arc<StaticGate>,
        messenger: Arc<RecordingMessenger>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                store: Arc::new(MemoryStore::new()),
                gate: Arc::new(StaticGate::new()),
                messenger: Arc::new(RecordingMessenger::new()),
            }
        }

        fn engine(&self, instance: &str) -> DrawEngine {
            DrawEngine::new(
                self.store.clone(),
                self.gate.clone(),
                self.messenger.clone(),
                instance,
                Duration::minutes(5),
            )
        }

        async fn campaign(&self, kind: CampaignType, end_offset_secs: i64) -> Campaign {
            self.store
                .create_campaign(&sample_campaign(kind, end_offset_secs))
                .await
                .unwrap()
        }

        async fn join(&self, id: CampaignId, users: impl IntoIterator<Item = UserId>) {
            for user in users {
                self.store
                    .add_entry(id, &Participant::anonymous(user))
                    .await
                    .unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_concurrent_attempts_claim_exactly_once() {
        let h = Harness::new();
        let campaign = h.campaign(CampaignType::DirectOptIn, -10).await;
        h.join(campaign.id, 1..=20).await;

        let mut handles = Vec::new();
        for i in 0..16 {
            let engine = h.engine(&format!("worker-{}", i));
            let id = campaign.id;
            handles.push(tokio::spawn(async move {
                engine.attempt_draw(id, DrawTrigger::Timer).await.unwrap()
            }));
        }

        let mut completed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                DrawOutcome::Completed { announced_here, .. } => {
                    assert!(announced_here);
                    completed += 1;
                }
                DrawOutcome::ClaimLost
                | DrawOutcome::HeldElsewhere
                | DrawOutcome::AlreadyFinished => {}
                other => panic!("unexpected outcome {:?}", other),
            }
        }

        assert_eq!(completed, 1);
        assert_eq!(h.messenger.messages_to(&campaign.target_chat).len(), 1);
        let stored = h.store.get_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CampaignStatus::Finished);
        assert!(stored.announced);
    }

    #[tokio::test]
    async fn test_concurrent_claim_calls_single_winner() {
        let h = Harness::new();
        let campaign = h.campaign(CampaignType::DirectOptIn, -10).await;

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = h.store.clone();
            let id = campaign.id;
            handles.push(tokio::spawn(async move {
                store
                    .transition(id, Transition::Claim, &format!("p{}", i))
                    .await
                    .unwrap()
            }));
        }
        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_empty_pool_announces_once() {
        let h = Harness::new();
        let campaign = h.campaign(CampaignType::DirectOptIn, -10).await;
        assert!(!campaign.announced);

        let first = h.engine("a").attempt_draw(campaign.id, DrawTrigger::Timer).await.unwrap();
        let second = h.engine("b").attempt_draw(campaign.id, DrawTrigger::Recovery).await.unwrap();

        assert_eq!(
            first,
            DrawOutcome::Completed {
                winners: vec![],
                announced_here: true
            }
        );
        assert_eq!(second, DrawOutcome::AlreadyFinished);
        let posts = h.messenger.messages_to(&campaign.target_chat);
        assert_eq!(posts.len(), 1);
        assert!(posts[0].text.contains("no participants"));
        let stored = h.store.get_campaign(campaign.id).await.unwrap().unwrap();
        assert!(stored.announced);
        assert!(stored.drawn_at.is_some());
    }

    #[tokio::test]
    async fn test_oversized_winner_count() {
        let h = Harness::new();
        let mut new = sample_campaign(CampaignType::DirectOptIn, -10);
        new.winners_count = 10;
        let campaign = h.store.create_campaign(&new).await.unwrap();
        h.join(campaign.id, [1, 2, 3, 4, 5]).await;

        let outcome = h.engine("a").attempt_draw(campaign.id, DrawTrigger::Timer).await.unwrap();
        let DrawOutcome::Completed { mut winners, .. } = outcome else {
            panic!("draw should complete");
        };
        winners.sort_unstable();
        assert_eq!(winners, vec![1, 2, 3, 4, 5]);

        let places: Vec<i32> = h
            .store
            .get_winners(campaign.id)
            .await
            .unwrap()
            .iter()
            .map(|w| w.place)
            .collect();
        assert_eq!(places, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_timer_before_deadline_is_not_due() {
        let h = Harness::new();
        let campaign = h.campaign(CampaignType::DirectOptIn, 3600).await;

        let outcome = h.engine("a").attempt_draw(campaign.id, DrawTrigger::Timer).await.unwrap();
        assert_eq!(outcome, DrawOutcome::NotDue);

        let forced = h.engine("a").attempt_draw(campaign.id, DrawTrigger::Operator).await.unwrap();
        assert!(matches!(forced, DrawOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn test_resume_after_crash_before_persist() {
        let h = Harness::new();
        let campaign = h.campaign(CampaignType::DirectOptIn, -10).await;
        h.join(campaign.id, [1, 2, 3]).await;

        // A previous process with the same identity claimed and died.
        assert!(h.store.transition(campaign.id, Transition::Claim, "a").await.unwrap());

        let outcome = h.engine("a").attempt_draw(campaign.id, DrawTrigger::Recovery).await.unwrap();
        let DrawOutcome::Completed { winners, announced_here } = outcome else {
            panic!("resume should complete");
        };
        assert!(announced_here);
        assert_eq!(winners.len(), 1);
        let stored: Vec<UserId> = h
            .store
            .get_winners(campaign.id)
            .await
            .unwrap()
            .into_iter()
            .map(|w| w.user_id)
            .collect();
        assert_eq!(stored, winners);
    }

    #[tokio::test]
    async fn test_resume_after_crash_between_persist_and_announce() {
        let h = Harness::new();
        let campaign = h.campaign(CampaignType::DirectOptIn, -10).await;
        h.join(campaign.id, [1, 2, 3]).await;
        assert!(h.store.transition(campaign.id, Transition::Claim, "a").await.unwrap());
        assert!(h.store.persist_winners(campaign.id, &[2]).await.unwrap());

        let outcome = h.engine("a").attempt_draw(campaign.id, DrawTrigger::Recovery).await.unwrap();

        assert_eq!(
            outcome,
            DrawOutcome::Completed {
                winners: vec![2],
                announced_here: true
            }
        );
        assert_eq!(h.messenger.messages_to("2").len(), 1);
    }

    #[tokio::test]
    async fn test_resume_after_crash_between_announce_and_finish() {
        let h = Harness::new();
        let campaign = h.campaign(CampaignType::DirectOptIn, -10).await;
        assert!(h.store.transition(campaign.id, Transition::Claim, "a").await.unwrap());
        assert!(h.store.persist_winners(campaign.id, &[]).await.unwrap());
        assert!(h.store.mark_announced(campaign.id).await.unwrap());

        let outcome = h.engine("a").attempt_draw(campaign.id, DrawTrigger::Recovery).await.unwrap();

        assert_eq!(
            outcome,
            DrawOutcome::Completed {
                winners: vec![],
                announced_here: false
            }
        );
        assert!(h.messenger.sent().is_empty());
        let stored = h.store.get_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CampaignStatus::Finished);
    }

    #[tokio::test]
    async fn test_fresh_claim_of_other_instance_is_left_alone() {
        let h = Harness::new();
        let campaign = h.campaign(CampaignType::DirectOptIn, -10).await;
        assert!(h.store.transition(campaign.id, Transition::Claim, "other").await.unwrap());

        let outcome = h.engine("me").attempt_draw(campaign.id, DrawTrigger::Recovery).await.unwrap();
        assert_eq!(outcome, DrawOutcome::HeldElsewhere);

        let forced = h.engine("me").attempt_draw(campaign.id, DrawTrigger::Operator).await.unwrap();
        assert!(matches!(forced, DrawOutcome::Completed { .. }));
        let stored = h.store.get_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(stored.lock_owner.as_deref(), Some("me"));
    }

    #[tokio::test]
    async fn test_stale_claim_is_taken_over() {
        let h = Harness::new();
        let campaign = h.campaign(CampaignType::DirectOptIn, -10).await;
        assert!(h.store.transition(campaign.id, Transition::Claim, "dead").await.unwrap());
        h.store
            .backdate_claim(campaign.id, Utc::now() - Duration::minutes(10))
            .await;

        let outcome = h.engine("me").attempt_draw(campaign.id, DrawTrigger::Recovery).await.unwrap();
        assert!(matches!(outcome, DrawOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn test_cancel_only_while_scheduled() {
        let h = Harness::new();
        let scheduled = h.campaign(CampaignType::DirectOptIn, 3600).await;
        let engine = h.engine("a");

        assert_eq!(engine.cancel(scheduled.id).await.unwrap(), CancelOutcome::Canceled);
        assert_eq!(engine.cancel(scheduled.id).await.unwrap(), CancelOutcome::AlreadyCanceled);
        assert_eq!(
            engine.attempt_draw(scheduled.id, DrawTrigger::Operator).await.unwrap(),
            DrawOutcome::Canceled
        );

        let drawing = h.campaign(CampaignType::DirectOptIn, -10).await;
        assert!(h.store.transition(drawing.id, Transition::Claim, "a").await.unwrap());
        assert_eq!(engine.cancel(drawing.id).await.unwrap(), CancelOutcome::DrawInProgress);

        let outcome = engine.attempt_draw(drawing.id, DrawTrigger::Recovery).await.unwrap();
        assert!(matches!(outcome, DrawOutcome::Completed { .. }));
        assert_eq!(engine.cancel(drawing.id).await.unwrap(), CancelOutcome::AlreadyFinished);
        assert_eq!(engine.cancel(9999).await.unwrap(), CancelOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_referral_draw_ranks_by_invites() {
        let h = Harness::new();
        let mut new = sample_campaign(CampaignType::Referral, 3600);
        new.winners_count = 2;
        let campaign = h.store.create_campaign(&new).await.unwrap();
        for referred in [10, 11, 12] {
            h.store.add_referral(campaign.id, 1, referred).await.unwrap();
        }
        for referred in [20, 21, 22] {
            h.store.add_referral(campaign.id, 2, referred).await.unwrap();
        }
        h.store.add_referral(campaign.id, 3, 30).await.unwrap();

        let outcome = h.engine("a").attempt_draw(campaign.id, DrawTrigger::Operator).await.unwrap();
        let DrawOutcome::Completed { mut winners, .. } = outcome else {
            panic!("draw should complete");
        };
        winners.sort_unstable();
        assert_eq!(winners, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_boost_eligibility_rechecked_at_draw() {
        let h = Harness::new();
        let mut new = sample_campaign(CampaignType::BoostGated, -10);
        new.winners_count = 5;
        let campaign = h.store.create_campaign(&new).await.unwrap();
        h.join(campaign.id, [1, 2, 3]).await;
        // Only user 2 still holds a grant at draw time.
        h.gate.set_boosters([2]);

        let outcome = h.engine("a").attempt_draw(campaign.id, DrawTrigger::Timer).await.unwrap();

        assert_eq!(
            outcome,
            DrawOutcome::Completed {
                winners: vec![2],
                announced_here: true
            }
        );
        assert_eq!(h.gate.boost_checks(), 3);
    }

    #[tokio::test]
    async fn test_entries_rejected_once_claimed() {
        let h = Harness::new();
        let campaign = h.campaign(CampaignType::DirectOptIn, -10).await;
        assert!(h.store.transition(campaign.id, Transition::Claim, "a").await.unwrap());

        let insert = h
            .store
            .add_entry(campaign.id, &Participant::anonymous(5))
            .await
            .unwrap();
        assert_eq!(insert, crate::types::EntryInsert::Closed);
    }
}
