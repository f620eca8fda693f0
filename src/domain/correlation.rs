use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::notification::{NotificationResult, PaymentOutcome};
use super::payment::PaymentIntent;

/// Lifecycle of a tracked checkout request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CorrelationState {
    Pending,
    Resolved {
        #[serde(with = "time::serde::rfc3339")]
        resolved_at: OffsetDateTime,
        result: NotificationResult,
    },
    Expired {
        #[serde(with = "time::serde::rfc3339")]
        expired_at: OffsetDateTime,
    },
}

impl CorrelationState {
    /// Instant the entry left `Pending`, if it has.
    pub fn closed_at(&self) -> Option<OffsetDateTime> {
        match self {
            CorrelationState::Pending => None,
            CorrelationState::Resolved { resolved_at, .. } => Some(*resolved_at),
            CorrelationState::Expired { expired_at } => Some(*expired_at),
        }
    }
}

/// A checkout request accepted by the gateway and awaiting its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCorrelation {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub intent: PaymentIntent,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(flatten)]
    pub state: CorrelationState,
}

impl PendingCorrelation {
    pub fn new(
        merchant_request_id: String,
        checkout_request_id: String,
        intent: PaymentIntent,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            merchant_request_id,
            checkout_request_id,
            intent,
            created_at,
            state: CorrelationState::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, CorrelationState::Pending)
    }
}

/// Outcome handed downstream once a notification matches a pending entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutcome {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub intent: PaymentIntent,
    pub outcome: PaymentOutcome,
    pub result: NotificationResult,
    pub resolved_at: OffsetDateTime,
}

/// Result of feeding a notification to the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// First notification for a pending entry.
    Resolved(ResolvedOutcome),
    /// Repeat of an already resolved entry. The stored outcome is unchanged.
    Duplicate(ResolvedOutcome),
}

impl Resolution {
    pub fn outcome(&self) -> &ResolvedOutcome {
        match self {
            Resolution::Resolved(o) | Resolution::Duplicate(o) => o,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Resolution::Duplicate(_))
    }
}

/// Broadcast to anyone interested in correlation lifecycle changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelationEvent {
    Resolved(ResolvedOutcome),
    Expired(PendingCorrelation),
    /// A notification arrived that matched nothing live.
    Unmatched {
        checkout_request_id: String,
        reason: &'static str,
    },
}
