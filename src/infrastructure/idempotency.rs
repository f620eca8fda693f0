use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::payment::InitiationResult;
use crate::domain::ports::InitiationError;

#[derive(Debug, Clone)]
enum KeyState {
    InFlight,
    /// The last attempt timed out; the gateway may or may not have prompted.
    Ambiguous,
    Completed(InitiationResult),
}

#[derive(Debug, Clone)]
struct KeyRecord {
    state: KeyState,
    expires_at: OffsetDateTime,
}

/// What the caller may do with a keyed submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// No live record: submit to the gateway.
    Proceed,
    /// A previous attempt succeeded; return its acknowledgment unchanged.
    Replay(InitiationResult),
}

/// Guards against double-prompting a payer when a caller retries a
/// submission whose first attempt had an unknown outcome.
#[derive(Debug, Clone)]
pub struct IdempotencyGuard {
    records: Arc<Mutex<HashMap<String, KeyRecord>>>,
    window: Duration,
}

impl IdempotencyGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            window,
        }
    }

    /// Claim `key` for a new attempt.
    pub async fn begin(&self, key: &str) -> Result<Admission, InitiationError> {
        let now = OffsetDateTime::now_utc();
        let mut records = self.records.lock().await;
        records.retain(|_, record| record.expires_at > now);

        match records.get(key).map(|r| &r.state) {
            Some(KeyState::Completed(result)) => {
                debug!(idempotency_key = %key, "Replaying completed submission");
                Ok(Admission::Replay(result.clone()))
            }
            Some(KeyState::InFlight) | Some(KeyState::Ambiguous) => {
                warn!(idempotency_key = %key, "Refusing repeat of unresolved submission");
                Err(InitiationError::DuplicateSubmission {
                    idempotency_key: key.to_string(),
                })
            }
            None => {
                records.insert(
                    key.to_string(),
                    KeyRecord {
                        state: KeyState::InFlight,
                        expires_at: now + self.window,
                    },
                );
                Ok(Admission::Proceed)
            }
        }
    }

    /// Record the outcome of an attempt started with [`begin`](Self::begin).
    ///
    /// Failures that cannot have prompted the payer release the key so the
    /// caller may try again.
    pub async fn finish(&self, key: &str, outcome: &Result<InitiationResult, InitiationError>) {
        let now = OffsetDateTime::now_utc();
        let mut records = self.records.lock().await;

        let state = match outcome {
            Ok(result) => KeyState::Completed(result.clone()),
            Err(err) if err.is_ambiguous() => KeyState::Ambiguous,
            Err(_) => {
                records.remove(key);
                return;
            }
        };

        records.insert(
            key.to_string(),
            KeyRecord {
                state,
                expires_at: now + self.window,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack() -> InitiationResult {
        InitiationResult {
            merchant_request_id: "m-1".to_string(),
            checkout_request_id: "ws_CO_1".to_string(),
            response_code: "0".to_string(),
            response_description: "Success".to_string(),
            customer_message: None,
        }
    }

    #[tokio::test]
    async fn test_first_use_proceeds() -> Result<(), InitiationError> {
        let guard = IdempotencyGuard::new(Duration::from_secs(60));
        assert_eq!(guard.begin("k1").await?, Admission::Proceed);
        Ok(())
    }

    #[tokio::test]
    async fn test_in_flight_key_is_refused() -> Result<(), InitiationError> {
        let guard = IdempotencyGuard::new(Duration::from_secs(60));
        guard.begin("k1").await?;

        let err = guard.begin("k1").await.unwrap_err();
        assert!(matches!(err, InitiationError::DuplicateSubmission { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_completed_key_replays() -> Result<(), InitiationError> {
        let guard = IdempotencyGuard::new(Duration::from_secs(60));
        guard.begin("k1").await?;
        guard.finish("k1", &Ok(ack())).await;

        assert_eq!(guard.begin("k1").await?, Admission::Replay(ack()));
        Ok(())
    }

    #[tokio::test]
    async fn test_timed_out_key_stays_blocked() -> Result<(), InitiationError> {
        let guard = IdempotencyGuard::new(Duration::from_secs(60));
        guard.begin("k1").await?;
        guard
            .finish(
                "k1",
                &Err(InitiationError::TransientNetwork {
                    reason: "timeout".to_string(),
                    delivery_unknown: true,
                }),
            )
            .await;

        assert!(guard.begin("k1").await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_undelivered_network_failure_releases_key() -> Result<(), InitiationError> {
        let guard = IdempotencyGuard::new(Duration::from_secs(60));
        guard.begin("k1").await?;
        guard
            .finish(
                "k1",
                &Err(InitiationError::TransientNetwork {
                    reason: "token endpoint returned status 503".to_string(),
                    delivery_unknown: false,
                }),
            )
            .await;

        assert_eq!(guard.begin("k1").await?, Admission::Proceed);
        Ok(())
    }

    #[tokio::test]
    async fn test_definitive_failure_releases_key() -> Result<(), InitiationError> {
        let guard = IdempotencyGuard::new(Duration::from_secs(60));
        guard.begin("k1").await?;
        guard
            .finish(
                "k1",
                &Err(InitiationError::GatewayRejection {
                    code: "1".to_string(),
                    description: "Insufficient permissions".to_string(),
                }),
            )
            .await;

        assert_eq!(guard.begin("k1").await?, Admission::Proceed);
        Ok(())
    }

    #[tokio::test]
    async fn test_records_expire_after_window() -> Result<(), InitiationError> {
        let guard = IdempotencyGuard::new(Duration::ZERO);
        guard.begin("k1").await?;
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(guard.begin("k1").await?, Admission::Proceed);
        Ok(())
    }
}
