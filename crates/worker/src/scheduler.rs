//! Deadline timers plus the periodic recovery scan.
//!
//! Timers are an in-process optimisation: every open campaign is revisited
//! by [`Scheduler::rescan`], so a lost timer only delays a draw until the
//! next scan.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use giveaway_core::draw::{DrawEngine, DrawOutcome, DrawTrigger};
use giveaway_core::error::DrawError;
use giveaway_core::lifecycle::CampaignStatus;
use giveaway_core::types::CampaignId;

struct Timer {
    deadline: DateTime<Utc>,
    handle: JoinHandle<()>,
    /// Set once the sleep is over and the draw has started. A firing timer
    /// is never aborted and owns the draw on this instance until it ends.
    firing: Arc<AtomicBool>,
}

impl Timer {
    fn is_firing(&self) -> bool {
        self.firing.load(Ordering::SeqCst)
    }

    /// Aborts a timer that is still sleeping. Returns false when it is firing.
    fn cancel_pending(&self) -> bool {
        if self.is_firing() {
            return false;
        }
        self.handle.abort();
        true
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub drawn: usize,
    pub armed: usize,
    pub held_elsewhere: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Scheduler {
    engine: DrawEngine,
    timers: Arc<Mutex<HashMap<CampaignId, Timer>>>,
}

impl Scheduler {
    pub fn new(engine: DrawEngine) -> Self {
        Self {
            engine,
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Draws everything overdue or interrupted, arms timers for the rest and
    /// drops timers of campaigns that are no longer open.
    pub async fn rescan(&self) -> Result<RecoveryReport, DrawError> {
        let open = self.engine.store().list_open().await?;
        let now = Utc::now();
        let mut report = RecoveryReport::default();

        let open_ids: Vec<CampaignId> = open.iter().map(|c| c.id).collect();
        self.disarm_except(&open_ids).await;

        for campaign in open {
            if self.is_firing(campaign.id).await {
                debug!(campaign_id = campaign.id, "timer draw in progress");
                continue;
            }
            if self.engine.needs_attention(&campaign, now) {
                self.disarm(campaign.id).await;
                match self.engine.attempt_draw(campaign.id, DrawTrigger::Recovery).await {
                    Ok(DrawOutcome::Completed { winners, .. }) => {
                        info!(campaign_id = campaign.id, winners = winners.len(), "recovered draw");
                        report.drawn += 1;
                    }
                    Ok(DrawOutcome::HeldElsewhere) | Ok(DrawOutcome::ClaimLost) => {
                        report.held_elsewhere += 1;
                    }
                    Ok(outcome) => debug!(campaign_id = campaign.id, ?outcome, "nothing to recover"),
                    Err(err) => {
                        error!(campaign_id = campaign.id, error = %err, "recovery draw failed");
                        report.failed += 1;
                    }
                }
            } else if campaign.status == CampaignStatus::Scheduled
                && self.arm(campaign.id, campaign.end_at).await
            {
                report.armed += 1;
            }
        }

        Ok(report)
    }

    /// Schedules a Timer draw at `deadline`. Returns false when an
    /// identical timer is already pending or a timer draw is running.
    pub async fn arm(&self, id: CampaignId, deadline: DateTime<Utc>) -> bool {
        let mut timers = self.timers.lock().await;
        if let Some(existing) = timers.get(&id) {
            if existing.is_firing() {
                return false;
            }
            if existing.deadline == deadline && !existing.handle.is_finished() {
                return false;
            }
        }
        if let Some(stale) = timers.remove(&id) {
            stale.cancel_pending();
        }

        let engine = self.engine.clone();
        let registry = self.timers.clone();
        let firing = Arc::new(AtomicBool::new(false));
        let flag = firing.clone();
        let handle = tokio::spawn(async move {
            let wait = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;
            flag.store(true, Ordering::SeqCst);

            // Detached so that nothing cancels a claimed draw halfway.
            let draw = tokio::spawn(async move { engine.attempt_draw(id, DrawTrigger::Timer).await });
            match draw.await {
                Ok(Ok(outcome)) => info!(campaign_id = id, ?outcome, "deadline reached"),
                Ok(Err(err)) => warn!(campaign_id = id, error = %err, "timer draw failed; rescan will retry"),
                Err(err) => error!(campaign_id = id, error = %err, "timer draw task failed"),
            }

            let mut timers = registry.lock().await;
            if timers.get(&id).is_some_and(|t| Arc::ptr_eq(&t.firing, &flag)) {
                timers.remove(&id);
            }
        });
        debug!(campaign_id = id, %deadline, "timer armed");
        timers.insert(
            id,
            Timer {
                deadline,
                handle,
                firing,
            },
        );
        true
    }

    /// Drops a pending timer. A timer whose draw has started is left alone.
    pub async fn disarm(&self, id: CampaignId) {
        let mut timers = self.timers.lock().await;
        if timers.get(&id).is_some_and(Timer::cancel_pending) {
            timers.remove(&id);
        }
    }

    async fn disarm_except(&self, keep: &[CampaignId]) {
        let mut timers = self.timers.lock().await;
        timers.retain(|id, timer| keep.contains(id) || !timer.cancel_pending());
    }

    async fn is_firing(&self, id: CampaignId) -> bool {
        self.timers
            .lock()
            .await
            .get(&id)
            .is_some_and(Timer::is_firing)
    }

    pub async fn armed(&self) -> Vec<CampaignId> {
        let mut ids: Vec<CampaignId> = self.timers.lock().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Runs [`Scheduler::rescan`] every `interval` until the task is dropped.
    pub async fn run(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.rescan().await {
                Ok(report) if report != RecoveryReport::default() => {
                    info!(
                        drawn = report.drawn,
                        armed = report.armed,
                        held_elsewhere = report.held_elsewhere,
                        failed = report.failed,
                        "rescan complete"
                    );
                }
                Ok(_) => {}
                Err(err) => error!(error = %err, "rescan failed"),
            }
        }
    }

    /// Stops pending timers. Draws already firing finish on their own
    /// task or are resumed by the next process's recovery.
    pub async fn shutdown(&self) {
        let mut timers = self.timers.lock().await;
        timers.retain(|_, timer| !timer.cancel_pending());
    }
}
