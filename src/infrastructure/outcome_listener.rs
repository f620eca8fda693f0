use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::domain::correlation::CorrelationEvent;
use crate::domain::notification::PaymentOutcome;

/// Logs every correlation lifecycle event as a structured record.
///
/// This is the hook point for downstream consumers of payment outcomes; the
/// tracker itself never blocks on a slow listener.
pub struct OutcomeListener {
    events: broadcast::Receiver<CorrelationEvent>,
}

impl OutcomeListener {
    pub fn new(events: broadcast::Receiver<CorrelationEvent>) -> Self {
        Self { events }
    }

    /// Start consuming events. The task ends when the tracker is dropped.
    pub fn start(self) -> JoinHandle<()> {
        info!("Payment outcome listener starting");
        tokio::spawn(async move { self.run_loop().await })
    }

    async fn run_loop(mut self) {
        loop {
            match self.events.recv().await {
                Ok(event) => Self::handle(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Outcome listener lagged, events dropped");
                }
                Err(RecvError::Closed) => {
                    info!("Outcome channel closed, listener stopping");
                    return;
                }
            }
        }
    }

    fn handle(event: &CorrelationEvent) {
        match event {
            CorrelationEvent::Resolved(resolved) => {
                let receipt = resolved
                    .result
                    .settlement
                    .as_ref()
                    .and_then(|s| s.receipt_number.as_deref())
                    .unwrap_or("-");
                match resolved.outcome {
                    PaymentOutcome::Success => info!(
                        checkout_request_id = %resolved.checkout_request_id,
                        merchant_request_id = %resolved.merchant_request_id,
                        amount = resolved.intent.amount(),
                        receipt = %receipt,
                        "Payment succeeded"
                    ),
                    outcome => warn!(
                        checkout_request_id = %resolved.checkout_request_id,
                        outcome = outcome.as_str(),
                        result_code = resolved.result.result_code,
                        description = %resolved.result.result_description,
                        "Payment did not complete"
                    ),
                }
            }
            CorrelationEvent::Expired(entry) => warn!(
                checkout_request_id = %entry.checkout_request_id,
                created_at = %entry.created_at,
                "Payment outcome unknown: no notification before expiry"
            ),
            CorrelationEvent::Unmatched {
                checkout_request_id,
                reason,
            } => warn!(
                checkout_request_id = %checkout_request_id,
                reason = *reason,
                "Notification did not match a pending payment"
            ),
        }
    }
}
