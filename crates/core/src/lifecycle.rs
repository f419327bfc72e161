//! Campaign draw lifecycle.
//!
//! Every status change goes through a [`Transition`]; the store turns a
//! transition into a single conditional update guarded by `from()`, so the
//! table below is the only place legal moves are defined.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Scheduled,
    Drawing,
    Finished,
    Canceled,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Scheduled => "scheduled",
            CampaignStatus::Drawing => "drawing",
            CampaignStatus::Finished => "finished",
            CampaignStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Finished | CampaignStatus::Canceled)
    }

    pub fn can_transition_to(&self, next: CampaignStatus) -> bool {
        LEGAL_TRANSITIONS
            .iter()
            .any(|t| t.from() == *self && t.to() == next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Scheduled -> Drawing, recording the claiming instance.
    Claim,
    /// Drawing -> Finished, only once the results were announced.
    Finish,
    /// Scheduled -> Canceled.
    Cancel,
}

pub const LEGAL_TRANSITIONS: [Transition; 3] =
    [Transition::Claim, Transition::Finish, Transition::Cancel];

impl Transition {
    pub const fn from(self) -> CampaignStatus {
        match self {
            Transition::Claim | Transition::Cancel => CampaignStatus::Scheduled,
            Transition::Finish => CampaignStatus::Drawing,
        }
    }

    pub const fn to(self) -> CampaignStatus {
        match self {
            Transition::Claim => CampaignStatus::Drawing,
            Transition::Finish => CampaignStatus::Finished,
            Transition::Cancel => CampaignStatus::Canceled,
        }
    }

    /// Whether the transition also requires `announced = true`.
    pub const fn requires_announced(self) -> bool {
        matches!(self, Transition::Finish)
    }

    /// Whether the transition records the caller as lock owner.
    pub const fn sets_lock_owner(self) -> bool {
        matches!(self, Transition::Claim)
    }
}
