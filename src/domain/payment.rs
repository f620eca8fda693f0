use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Maximum length the gateway accepts for `AccountReference`.
pub const MAX_REFERENCE_LEN: usize = 12;

/// Maximum length the gateway accepts for `TransactionDesc`.
pub const MAX_DESCRIPTION_LEN: usize = 13;

/// Country-code-prefixed subscriber number: `254` followed by nine ASCII digits.
static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^254[0-9]{9}$").expect("phone pattern is a valid regex literal"));

/// Rejected caller input. Never reaches the gateway.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// A validated request to push a payment prompt to a payer's phone.
///
/// The payer's number is used both as the paying party and as the phone that
/// receives the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    phone: String,
    amount: u64,
    reference: String,
    description: String,
}

impl PaymentIntent {
    /// Validates raw caller input.
    ///
    /// A leading `+` on the phone number is tolerated and stripped.
    pub fn new(
        phone: &str,
        amount: i64,
        reference: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let phone = phone.trim();
        let phone = phone.strip_prefix('+').unwrap_or(phone);
        if !PHONE_PATTERN.is_match(phone) {
            return Err(ValidationError::new(
                "phone",
                "expected 254 followed by 9 digits, e.g. 254712345678",
            ));
        }

        if amount <= 0 {
            return Err(ValidationError::new(
                "amount",
                format!("must be a positive whole number, got {amount}"),
            ));
        }

        let reference = reference.into();
        Self::check_text("reference", &reference, MAX_REFERENCE_LEN)?;

        let description = description.into();
        Self::check_text("description", &description, MAX_DESCRIPTION_LEN)?;

        Ok(Self {
            phone: phone.to_string(),
            amount: amount as u64,
            reference,
            description,
        })
    }

    fn check_text(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::new(field, "must not be empty"));
        }
        let len = value.chars().count();
        if len > max {
            return Err(ValidationError::new(
                field,
                format!("at most {max} characters allowed, got {len}"),
            ));
        }
        Ok(())
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Gateway acknowledgment that the prompt was delivered.
///
/// This is not proof of payment; the outcome arrives later on the callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InitiationResult {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    pub response_code: String,
    pub response_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_message: Option<String>,
}
