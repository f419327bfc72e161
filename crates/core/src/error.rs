use thiserror::Error;

use crate::types::CampaignId;

/// Malformed operator input for campaign creation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("title must not be empty")]
    EmptyTitle,
    #[error("{0} is too long")]
    TooLong(&'static str),
    #[error("winners count must be at least 1, got {0}")]
    WinnersCount(i32),
    #[error("end must be after start")]
    EndBeforeStart,
    #[error("deadline is already in the past")]
    DeadlinePassed,
    #[error("target chat is required")]
    MissingTarget,
}

/// Rejection reasons for a signed mini-app payload.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("signature field is missing")]
    MissingSignature,
    #[error("signature does not match")]
    BadSignature,
    #[error("payload is older than the freshness window")]
    Stale,
    #[error("identity field is missing or unparsable")]
    MalformedIdentity,
}

impl AuthError {
    /// Machine-readable reason returned to the mini-app.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingSignature => "no_signature",
            AuthError::BadSignature => "bad_signature",
            AuthError::Stale => "stale",
            AuthError::MalformedIdentity => "malformed_identity",
        }
    }
}

/// Unexpected failure of the campaign store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("campaign {0} not found")]
    NotFound(CampaignId),
    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }
}

/// Failure of a call to the messaging platform or credential service.
#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("platform rejected {method}: {description}")]
    Rejected { method: String, description: String },
    #[error("unexpected response from {0}")]
    Decode(String),
}

impl ExternalError {
    /// Rejections are permanent; transport failures are worth another try.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExternalError::Transport(_))
    }
}

#[derive(Debug, Error)]
pub enum DrawError {
    #[error(transparent)]
    Store(#[from] StoreError),
}
