use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use crate::domain::correlation::{
    CorrelationEvent, CorrelationState, PendingCorrelation, Resolution, ResolvedOutcome,
};
use crate::domain::notification::NotificationResult;
use crate::domain::payment::PaymentIntent;
use crate::domain::ports::CorrelationError;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Expiry and retention windows for tracked requests.
#[derive(Debug, Clone)]
pub struct TrackerPolicy {
    /// How long an entry may stay pending before it expires.
    pub ttl: Duration,
    /// How long resolved and expired entries are kept for duplicate detection.
    pub retention: Duration,
}

impl Default for TrackerPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(180),
            retention: Duration::from_secs(3600),
        }
    }
}

/// Counts from one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub purged: usize,
}

/// In-memory registry of checkout requests awaiting their result callback.
///
/// Keyed by the gateway's checkout request id. Critical sections never await,
/// so the map-wide lock is held only for the lookup and swap.
#[derive(Debug, Clone)]
pub struct CorrelationTracker {
    entries: Arc<RwLock<HashMap<String, PendingCorrelation>>>,
    events: broadcast::Sender<CorrelationEvent>,
    policy: TrackerPolicy,
}

impl CorrelationTracker {
    pub fn new(policy: TrackerPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            events,
            policy,
        }
    }

    /// Receive lifecycle events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CorrelationEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: CorrelationEvent) {
        // No receivers is fine; events are advisory.
        let _ = self.events.send(event);
    }

    fn deadline(&self, created_at: OffsetDateTime) -> OffsetDateTime {
        created_at + self.policy.ttl
    }

    /// Register a pending entry for an accepted submission.
    pub async fn open(
        &self,
        merchant_request_id: impl Into<String>,
        checkout_request_id: impl Into<String>,
        intent: PaymentIntent,
    ) -> Result<(), CorrelationError> {
        self.open_at(
            merchant_request_id.into(),
            checkout_request_id.into(),
            intent,
            OffsetDateTime::now_utc(),
        )
        .await
    }

    pub async fn open_at(
        &self,
        merchant_request_id: String,
        checkout_request_id: String,
        intent: PaymentIntent,
        now: OffsetDateTime,
    ) -> Result<(), CorrelationError> {
        let mut entries = self.entries.write().await;

        if let Some(existing) = entries.get(&checkout_request_id)
            && existing.is_pending()
            && now < self.deadline(existing.created_at)
        {
            warn!(
                checkout_request_id = %checkout_request_id,
                "Refusing to open duplicate correlation"
            );
            return Err(CorrelationError::Duplicate {
                checkout_request_id,
            });
        }

        debug!(
            checkout_request_id = %checkout_request_id,
            merchant_request_id = %merchant_request_id,
            "Opening correlation"
        );

        let entry = PendingCorrelation::new(
            merchant_request_id,
            checkout_request_id.clone(),
            intent,
            now,
        );
        entries.insert(checkout_request_id, entry);
        Ok(())
    }

    /// Match a notification to its pending entry.
    pub async fn resolve(
        &self,
        result: NotificationResult,
    ) -> Result<Resolution, CorrelationError> {
        self.resolve_at(result, OffsetDateTime::now_utc()).await
    }

    pub async fn resolve_at(
        &self,
        result: NotificationResult,
        now: OffsetDateTime,
    ) -> Result<Resolution, CorrelationError> {
        let checkout_request_id = result.checkout_request_id.clone();

        let (outcome, expired) = {
            let mut entries = self.entries.write().await;
            let Some(entry) = entries.get_mut(&checkout_request_id) else {
                warn!(
                    checkout_request_id = %checkout_request_id,
                    result_code = result.result_code,
                    "Notification for unknown checkout request"
                );
                self.publish(CorrelationEvent::Unmatched {
                    checkout_request_id: checkout_request_id.clone(),
                    reason: "unknown",
                });
                return Err(CorrelationError::Unknown {
                    checkout_request_id,
                });
            };

            // Expire on access so a late notification never resolves.
            let mut expired = None;
            if entry.is_pending() && now >= self.deadline(entry.created_at) {
                entry.state = CorrelationState::Expired { expired_at: now };
                expired = Some(entry.clone());
            }

            let settled = match &entry.state {
                CorrelationState::Pending => None,
                CorrelationState::Resolved {
                    resolved_at,
                    result: stored,
                } => Some(Ok(Resolution::Duplicate(Self::outcome_of(
                    entry,
                    stored,
                    *resolved_at,
                )))),
                CorrelationState::Expired { expired_at } => Some(Err(CorrelationError::Expired {
                    checkout_request_id: checkout_request_id.clone(),
                    expired_at: *expired_at,
                })),
            };

            let outcome = match settled {
                Some(outcome) => outcome,
                None => {
                    entry.state = CorrelationState::Resolved {
                        resolved_at: now,
                        result: result.clone(),
                    };
                    Ok(Resolution::Resolved(Self::outcome_of(entry, &result, now)))
                }
            };
            (outcome, expired)
        };

        if let Some(entry) = expired {
            self.publish(CorrelationEvent::Expired(entry));
        }

        match &outcome {
            Ok(Resolution::Resolved(resolved)) => {
                info!(
                    checkout_request_id = %checkout_request_id,
                    outcome = resolved.outcome.as_str(),
                    result_code = resolved.result.result_code,
                    "Correlation resolved"
                );
                self.publish(CorrelationEvent::Resolved(resolved.clone()));
            }
            Ok(Resolution::Duplicate(_)) => {
                info!(
                    checkout_request_id = %checkout_request_id,
                    "Duplicate notification ignored"
                );
            }
            Err(err) => {
                warn!(checkout_request_id = %checkout_request_id, error = %err, "Late notification");
                self.publish(CorrelationEvent::Unmatched {
                    checkout_request_id: checkout_request_id.clone(),
                    reason: "expired",
                });
            }
        }

        outcome
    }

    fn outcome_of(
        entry: &PendingCorrelation,
        result: &NotificationResult,
        resolved_at: OffsetDateTime,
    ) -> ResolvedOutcome {
        ResolvedOutcome {
            merchant_request_id: entry.merchant_request_id.clone(),
            checkout_request_id: entry.checkout_request_id.clone(),
            intent: entry.intent.clone(),
            outcome: result.outcome,
            result: result.clone(),
            resolved_at,
        }
    }

    /// Snapshot of one entry, expiring it first if its window has passed.
    pub async fn get(&self, checkout_request_id: &str) -> Option<PendingCorrelation> {
        let now = OffsetDateTime::now_utc();
        let (snapshot, expired) = {
            let mut entries = self.entries.write().await;
            let entry = entries.get_mut(checkout_request_id)?;
            let mut expired = None;
            if entry.is_pending() && now >= self.deadline(entry.created_at) {
                entry.state = CorrelationState::Expired { expired_at: now };
                expired = Some(entry.clone());
            }
            (entry.clone(), expired)
        };

        if let Some(entry) = expired {
            self.publish(CorrelationEvent::Expired(entry));
        }
        Some(snapshot)
    }

    pub async fn pending_count(&self) -> usize {
        let entries = self.entries.read().await;
        entries.values().filter(|e| e.is_pending()).count()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(OffsetDateTime::now_utc()).await
    }

    /// Expire overdue pending entries and purge closed entries past retention.
    pub async fn sweep_at(&self, now: OffsetDateTime) -> SweepReport {
        let mut newly_expired = Vec::new();
        let mut purged = 0;

        {
            let mut entries = self.entries.write().await;

            for entry in entries.values_mut() {
                if entry.is_pending() && now >= self.deadline(entry.created_at) {
                    entry.state = CorrelationState::Expired { expired_at: now };
                    newly_expired.push(entry.clone());
                }
            }

            let retention = self.policy.retention;
            entries.retain(|_, entry| match entry.state.closed_at() {
                Some(closed_at) if now >= closed_at + retention && !is_newly(entry, now) => {
                    purged += 1;
                    false
                }
                _ => true,
            });
        }

        for entry in &newly_expired {
            info!(
                checkout_request_id = %entry.checkout_request_id,
                created_at = %entry.created_at,
                "Correlation expired without a notification"
            );
            self.publish(CorrelationEvent::Expired(entry.clone()));
        }

        let report = SweepReport {
            expired: newly_expired.len(),
            purged,
        };
        if report != SweepReport::default() {
            debug!(expired = report.expired, purged = report.purged, "Sweep finished");
        }
        report
    }
}

/// Entries expired in this very pass are reported before they can be purged.
fn is_newly(entry: &PendingCorrelation, now: OffsetDateTime) -> bool {
    matches!(entry.state, CorrelationState::Expired { expired_at } if expired_at == now)
}

impl Default for CorrelationTracker {
    fn default() -> Self {
        Self::new(TrackerPolicy::default())
    }
}
