//! Publish-once gate around the public side effects of a draw.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::StoreError;
use crate::gateway::Messenger;
use crate::render::{render_results, render_winner_notice};
use crate::store::CampaignStore;
use crate::types::{Campaign, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceOutcome {
    /// This call flipped `announced` and performed the side effects.
    Published,
    AlreadyAnnounced,
}

#[derive(Clone)]
pub struct AnnouncementPublisher {
    store: Arc<dyn CampaignStore>,
    messenger: Arc<dyn Messenger>,
}

impl AnnouncementPublisher {
    pub fn new(store: Arc<dyn CampaignStore>, messenger: Arc<dyn Messenger>) -> Self {
        Self { store, messenger }
    }

    /// Posts the results and notifies winners, at most once per campaign.
    /// Platform failures are logged and never undo the announced flag.
    pub async fn publish_once(
        &self,
        campaign: &Campaign,
        winners: &[UserId],
    ) -> Result<AnnounceOutcome, StoreError> {
        if !self.store.mark_announced(campaign.id).await? {
            return Ok(AnnounceOutcome::AlreadyAnnounced);
        }

        let text = render_results(campaign, winners);
        let (chat, reply_to) = match campaign.post {
            Some(post) => (post.post.chat_id.to_string(), Some(post.post.message_id)),
            None => (campaign.target_chat.clone(), None),
        };
        if let Err(err) = self.messenger.send_message(&chat, &text, reply_to).await {
            warn!(campaign_id = campaign.id, error = %err, "results post failed");
        }

        let notice = render_winner_notice(campaign);
        let mut notified = 0;
        for user_id in winners {
            match self
                .messenger
                .send_message(&user_id.to_string(), &notice, None)
                .await
            {
                Ok(_) => notified += 1,
                Err(err) => warn!(campaign_id = campaign.id, user_id, error = %err, "winner notice failed"),
            }
        }

        info!(
            campaign_id = campaign.id,
            winners = winners.len(),
            notified,
            "results announced"
        );
        Ok(AnnounceOutcome::Published)
    }
}
