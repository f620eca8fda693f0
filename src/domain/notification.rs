use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Payer cancelled the prompt.
pub const RESULT_CODE_CANCELLED: i64 = 1032;

/// Payer could not be reached before the prompt timed out.
pub const RESULT_CODE_TIMEOUT: i64 = 1037;

/// Final outcome of a push prompt as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Success,
    Failure,
    Cancelled,
    Timeout,
}

impl PaymentOutcome {
    pub fn from_result_code(code: i64) -> Self {
        match code {
            0 => PaymentOutcome::Success,
            RESULT_CODE_CANCELLED => PaymentOutcome::Cancelled,
            RESULT_CODE_TIMEOUT => PaymentOutcome::Timeout,
            _ => PaymentOutcome::Failure,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOutcome::Success => "success",
            PaymentOutcome::Failure => "failure",
            PaymentOutcome::Cancelled => "cancelled",
            PaymentOutcome::Timeout => "timeout",
        }
    }
}

/// Settlement details present only on successful payments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementMetadata {
    pub receipt_number: Option<String>,
    pub amount: Option<u64>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub settled_at: Option<OffsetDateTime>,
    pub phone: Option<String>,
}

/// Asynchronous result delivered by the gateway for one checkout request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationResult {
    pub merchant_request_id: Option<String>,
    pub checkout_request_id: String,
    pub outcome: PaymentOutcome,
    pub result_code: i64,
    pub result_description: String,
    pub settlement: Option<SettlementMetadata>,
}

impl NotificationResult {
    pub fn new(
        checkout_request_id: impl Into<String>,
        result_code: i64,
        result_description: impl Into<String>,
    ) -> Self {
        Self {
            merchant_request_id: None,
            checkout_request_id: checkout_request_id.into(),
            outcome: PaymentOutcome::from_result_code(result_code),
            result_code,
            result_description: result_description.into(),
            settlement: None,
        }
    }

    pub fn with_merchant_request_id(mut self, merchant_request_id: impl Into<String>) -> Self {
        self.merchant_request_id = Some(merchant_request_id.into());
        self
    }

    pub fn with_settlement(mut self, settlement: SettlementMetadata) -> Self {
        self.settlement = Some(settlement);
        self
    }
}
