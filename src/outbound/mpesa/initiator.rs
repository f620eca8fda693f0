use std::sync::Arc;

use reqwest::StatusCode;
use time::UtcOffset;
use tracing::{debug, error, info, warn};

use super::credentials::Credentials;
use super::http_client::{GatewayHttpClient, GatewayResponse, HttpClientError};
use super::password::{PasswordSigner, SignedStamp};
use super::schemas::{GatewayErrorBody, StkPushRequest, StkPushResponse, TRANSACTION_TYPE};
use crate::domain::payment::{InitiationResult, PaymentIntent, ValidationError};
use crate::domain::ports::{InitiationError, TokenSource};
use crate::domain::token::AccessToken;
use crate::infrastructure::correlation_tracker::CorrelationTracker;
use crate::infrastructure::idempotency::{Admission, IdempotencyGuard};

/// Reference and description used when a caller does not supply them.
#[derive(Debug, Clone)]
pub struct RequestDefaults {
    pub account_reference: String,
    pub transaction_desc: String,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            account_reference: "TestPayment".to_string(),
            transaction_desc: "Goods payment".to_string(),
        }
    }
}

/// How a single submission attempt ended.
enum Attempt {
    Done(Result<InitiationResult, InitiationError>),
    /// The gateway did not accept the bearer token.
    TokenRejected(GatewayResponse),
}

/// Builds, signs and submits push requests, and registers accepted ones with
/// the correlation tracker.
pub struct PaymentInitiator {
    credentials: Arc<Credentials>,
    signer: PasswordSigner,
    tokens: Arc<dyn TokenSource>,
    http_client: GatewayHttpClient,
    tracker: CorrelationTracker,
    idempotency: IdempotencyGuard,
    defaults: RequestDefaults,
}

impl PaymentInitiator {
    pub fn new(
        credentials: Arc<Credentials>,
        tokens: Arc<dyn TokenSource>,
        http_client: GatewayHttpClient,
        tracker: CorrelationTracker,
        idempotency: IdempotencyGuard,
        gateway_offset: UtcOffset,
    ) -> Self {
        let signer = PasswordSigner::new(
            credentials.shortcode(),
            credentials.passkey().clone(),
            gateway_offset,
        );
        Self {
            credentials,
            signer,
            tokens,
            http_client,
            tracker,
            idempotency,
            defaults: RequestDefaults::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: RequestDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn tracker(&self) -> &CorrelationTracker {
        &self.tracker
    }

    /// Validate raw caller input, filling reference and description from
    /// the configured defaults.
    pub fn prepare(
        &self,
        phone: &str,
        amount: i64,
        reference: Option<String>,
        description: Option<String>,
    ) -> Result<PaymentIntent, ValidationError> {
        PaymentIntent::new(
            phone,
            amount,
            reference.unwrap_or_else(|| self.defaults.account_reference.clone()),
            description.unwrap_or_else(|| self.defaults.transaction_desc.clone()),
        )
    }

    /// Initiate under an optional caller idempotency key.
    pub async fn initiate_keyed(
        &self,
        idempotency_key: Option<&str>,
        intent: PaymentIntent,
    ) -> Result<InitiationResult, InitiationError> {
        let Some(key) = idempotency_key else {
            return self.initiate(intent).await;
        };

        if let Admission::Replay(result) = self.idempotency.begin(key).await? {
            return Ok(result);
        }

        let outcome = self.initiate(intent).await;
        self.idempotency.finish(key, &outcome).await;
        outcome
    }

    /// Submit a push prompt for `intent`.
    ///
    /// On acceptance exactly one pending correlation is opened; on any
    /// failure none is.
    pub async fn initiate(
        &self,
        intent: PaymentIntent,
    ) -> Result<InitiationResult, InitiationError> {
        let token = self.tokens.access_token().await?;

        let result = match self.attempt(&intent, &token).await {
            Attempt::Done(result) => result,
            Attempt::TokenRejected(_) => {
                warn!("Gateway rejected cached access token, renewing once");
                self.tokens.invalidate(&token).await;
                let fresh = self.tokens.access_token().await?;
                match self.attempt(&intent, &fresh).await {
                    Attempt::Done(result) => result,
                    Attempt::TokenRejected(response) => {
                        error!(
                            status = response.status.as_u16(),
                            body = %response.body,
                            "Gateway rejected a freshly issued access token"
                        );
                        Err(InitiationError::Authentication {
                            status: response.status.as_u16(),
                            body: response.body,
                        })
                    }
                }
            }
        }?;

        self.tracker
            .open(
                result.merchant_request_id.clone(),
                result.checkout_request_id.clone(),
                intent,
            )
            .await?;

        info!(
            checkout_request_id = %result.checkout_request_id,
            merchant_request_id = %result.merchant_request_id,
            "Push prompt accepted for processing"
        );
        Ok(result)
    }

    /// Build the gateway body. Each call carries its own timestamp and password.
    pub fn build_request(&self, intent: &PaymentIntent, stamp: SignedStamp) -> StkPushRequest {
        let shortcode = self.credentials.shortcode().to_string();
        StkPushRequest {
            business_short_code: shortcode.clone(),
            password: stamp.password,
            timestamp: stamp.timestamp,
            transaction_type: TRANSACTION_TYPE,
            amount: intent.amount().to_string(),
            party_a: intent.phone().to_string(),
            party_b: shortcode,
            phone_number: intent.phone().to_string(),
            call_back_url: self.credentials.callback_url().to_string(),
            account_reference: intent.reference().to_string(),
            transaction_desc: intent.description().to_string(),
        }
    }

    async fn attempt(&self, intent: &PaymentIntent, token: &AccessToken) -> Attempt {
        let stamp = match self.signer.sign_now() {
            Ok(stamp) => stamp,
            Err(e) => {
                return Attempt::Done(Err(InitiationError::GatewayCommunication {
                    status: None,
                    reason: format!("cannot render request timestamp: {e}"),
                    body: String::new(),
                }));
            }
        };
        let request = self.build_request(intent, stamp);

        let response = match self
            .http_client
            .post_json(
                &self.credentials.stk_push_url(),
                &token.bearer_header(),
                &request,
            )
            .await
        {
            Ok(response) => response,
            Err(err) => return Attempt::Done(Err(Self::transport_error(err))),
        };

        if Self::is_token_rejection(&response) {
            return Attempt::TokenRejected(response);
        }

        Attempt::Done(Self::interpret(response))
    }

    fn transport_error(err: HttpClientError) -> InitiationError {
        match err {
            HttpClientError::Encoding(reason) => InitiationError::GatewayCommunication {
                status: None,
                reason,
                body: String::new(),
            },
            other => {
                let delivery_unknown = other.may_have_been_delivered();
                if delivery_unknown {
                    warn!(
                        error = %other,
                        "Submission outcome unknown; the payer may still be prompted"
                    );
                }
                InitiationError::TransientNetwork {
                    reason: other.to_string(),
                    delivery_unknown,
                }
            }
        }
    }

    fn is_token_rejection(response: &GatewayResponse) -> bool {
        if response.status == StatusCode::UNAUTHORIZED {
            return true;
        }
        !response.status.is_success()
            && GatewayErrorBody::parse(&response.body).is_some_and(|b| b.is_invalid_token())
    }

    /// Map a gateway reply to the domain result.
    fn interpret(response: GatewayResponse) -> Result<InitiationResult, InitiationError> {
        let status = response.status.as_u16();

        debug!(status, elapsed_ms = response.elapsed_ms, "Push submission answered");

        if !response.status.is_success() {
            let parsed = GatewayErrorBody::parse(&response.body);
            let request_id = parsed
                .as_ref()
                .and_then(|b| b.request_id.clone())
                .unwrap_or_default();
            let reason = parsed
                .map(|b| {
                    format!(
                        "{}: {}",
                        b.error_code.unwrap_or_default(),
                        b.error_message.unwrap_or_default()
                    )
                })
                .unwrap_or_else(|| format!("unexpected status {status}"));
            error!(
                status,
                gateway_request_id = %request_id,
                reason = %reason,
                body = %response.body,
                "Gateway returned an error status"
            );
            return Err(InitiationError::GatewayCommunication {
                status: Some(status),
                reason,
                body: response.body,
            });
        }

        let ack: StkPushResponse = match serde_json::from_str(&response.body) {
            Ok(ack) => ack,
            Err(e) => {
                error!(status, error = %e, body = %response.body, "Malformed gateway acknowledgment");
                return Err(InitiationError::GatewayCommunication {
                    status: Some(status),
                    reason: format!("malformed acknowledgment: {e}"),
                    body: response.body,
                });
            }
        };

        if ack.response_code.trim() != "0" {
            warn!(
                response_code = %ack.response_code,
                description = %ack.response_description,
                "Gateway rejected push request"
            );
            return Err(InitiationError::GatewayRejection {
                code: ack.response_code,
                description: ack.response_description,
            });
        }

        match (ack.merchant_request_id, ack.checkout_request_id) {
            (Some(merchant_request_id), Some(checkout_request_id))
                if !merchant_request_id.is_empty() && !checkout_request_id.is_empty() =>
            {
                Ok(InitiationResult {
                    merchant_request_id,
                    checkout_request_id,
                    response_code: ack.response_code,
                    response_description: ack.response_description,
                    customer_message: ack.customer_message,
                })
            }
            _ => {
                error!(body = %response.body, "Acknowledgment is missing correlation ids");
                Err(InitiationError::GatewayCommunication {
                    status: Some(status),
                    reason: "acknowledgment is missing correlation ids".to_string(),
                    body: response.body,
                })
            }
        }
    }
}
