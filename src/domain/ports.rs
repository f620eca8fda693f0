/*
   This module specifies the API by which the payment lifecycle talks to the
   gateway-facing collaborators, and the errors that cross those seams.
*/

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::domain::payment::ValidationError;
use crate::domain::token::AccessToken;

/// Failure to obtain a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The gateway refused the credentials or answered with an unusable body.
    /// Not retried: credential errors do not heal by themselves.
    #[error("Authentication failed: status={status}, body={body}")]
    Authentication { status: u16, body: String },

    #[error("Transient network error during token exchange: {0}")]
    TransientNetwork(String),
}

/// Failure to initiate a push payment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitiationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Authentication failed: status={status}, body={body}")]
    Authentication { status: u16, body: String },

    /// `delivery_unknown` is set when the push request may have reached the
    /// gateway, so the payer may already have been prompted.
    #[error("Transient network error: {reason}")]
    TransientNetwork {
        reason: String,
        delivery_unknown: bool,
    },

    #[error("Gateway rejected request: code={code}, description={description}")]
    GatewayRejection { code: String, description: String },

    #[error("Unexpected gateway response: status={status:?}, reason={reason}, body={body}")]
    GatewayCommunication {
        status: Option<u16>,
        reason: String,
        body: String,
    },

    #[error("A submission with idempotency key {idempotency_key} is in flight or unresolved")]
    DuplicateSubmission { idempotency_key: String },

    #[error(transparent)]
    Correlation(#[from] CorrelationError),
}

impl From<TokenError> for InitiationError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Authentication { status, body } => {
                InitiationError::Authentication { status, body }
            }
            // Token exchange precedes any submission.
            TokenError::TransientNetwork(reason) => InitiationError::TransientNetwork {
                reason,
                delivery_unknown: false,
            },
        }
    }
}

impl InitiationError {
    /// Short machine-readable discriminator used in API responses and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            InitiationError::Validation(_) => "validation_error",
            InitiationError::Authentication { .. } => "authentication_error",
            InitiationError::TransientNetwork { .. } => "transient_network_error",
            InitiationError::GatewayRejection { .. } => "gateway_rejection",
            InitiationError::GatewayCommunication { .. } => "gateway_communication_error",
            InitiationError::DuplicateSubmission { .. } => "duplicate_submission",
            InitiationError::Correlation(_) => "correlation_error",
        }
    }

    /// Whether the gateway might have accepted the request despite the error.
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            InitiationError::TransientNetwork {
                delivery_unknown: true,
                ..
            }
        )
    }
}

/// Correlation tracker anomalies. Logged, never fatal to the callback path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorrelationError {
    #[error("Checkout request {checkout_request_id} already has a live correlation")]
    Duplicate { checkout_request_id: String },

    #[error("No correlation for checkout request {checkout_request_id}")]
    Unknown { checkout_request_id: String },

    #[error("Correlation for checkout request {checkout_request_id} expired at {expired_at}")]
    Expired {
        checkout_request_id: String,
        expired_at: OffsetDateTime,
    },
}

/// Source of bearer tokens for gateway calls.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Returns a cached token if still fresh, otherwise exchanges credentials
    /// for a new one.
    async fn access_token(&self) -> Result<AccessToken, TokenError>;

    /// Drops `token` from the cache if it is still the cached value.
    async fn invalidate(&self, token: &AccessToken);
}
