use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::domain::correlation::Resolution;
use crate::domain::payment::{InitiationResult, ValidationError};
use crate::domain::ports::{CorrelationError, InitiationError};
use crate::outbound::mpesa::schemas::{CallbackAck, CallbackPayload};
use crate::server::AppState;
use crate::server::responses::{ApiError, ResponseBody, not_found};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Caller input for a push prompt. Reference and description fall back to
/// configured defaults.
///
/// `phone` and `amount` are kept as raw JSON so a mistyped value is reported
/// against its own field rather than as an unreadable body.
#[derive(Debug, Clone, Deserialize)]
pub struct StkPushBody {
    #[serde(default)]
    pub phone: Value,
    #[serde(default)]
    pub amount: Value,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl StkPushBody {
    fn phone(&self) -> Result<&str, ValidationError> {
        match &self.phone {
            Value::String(phone) => Ok(phone),
            Value::Null => Err(ValidationError::new("phone", "is required")),
            _ => Err(ValidationError::new(
                "phone",
                "must be a string such as \"254712345678\"",
            )),
        }
    }

    fn amount(&self) -> Result<i64, ValidationError> {
        match &self.amount {
            Value::Number(n) => n.as_i64().ok_or_else(|| {
                ValidationError::new("amount", format!("must be a whole number, got {n}"))
            }),
            Value::Null => Err(ValidationError::new("amount", "is required")),
            other => Err(ValidationError::new(
                "amount",
                format!("must be a JSON number, got {other}"),
            )),
        }
    }
}

pub async fn stk_push(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<StkPushBody>, JsonRejection>,
) -> Result<Json<InitiationResult>, ApiError> {
    let Json(body) = body.map_err(|rejection| {
        InitiationError::Validation(ValidationError::new("body", rejection.body_text()))
    })?;

    let phone = body.phone().map_err(InitiationError::from)?;
    let amount = body.amount().map_err(InitiationError::from)?;
    let intent = state
        .initiator
        .prepare(phone, amount, body.reference.clone(), body.description.clone())
        .map_err(InitiationError::from)?;

    let idempotency_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty());

    let result = state
        .initiator
        .initiate_keyed(idempotency_key, intent)
        .await
        .inspect_err(|e| warn!(kind = e.kind(), error = %e, "Push initiation failed"))?;

    Ok(Json(result))
}

/// Result notification from the gateway. Always acknowledged so the gateway
/// never retries; anomalies are logged.
pub async fn stk_callback(State(state): State<AppState>, body: Bytes) -> Json<CallbackAck> {
    let payload = match CallbackPayload::parse(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(
                error = %e,
                body = %String::from_utf8_lossy(&body),
                "Discarding unparseable result notification"
            );
            return Json(CallbackAck::accepted());
        }
    };

    let notification = payload.into_notification(state.gateway_offset);
    match state.tracker.resolve(notification).await {
        Ok(Resolution::Resolved(resolved)) => info!(
            checkout_request_id = %resolved.checkout_request_id,
            outcome = resolved.outcome.as_str(),
            "Result notification applied"
        ),
        Ok(Resolution::Duplicate(resolved)) => info!(
            checkout_request_id = %resolved.checkout_request_id,
            "Duplicate result notification ignored"
        ),
        Err(e) => warn!(error = %e, "Result notification not applied"),
    }

    Json(CallbackAck::accepted())
}

pub async fn transaction(
    State(state): State<AppState>,
    Path(checkout_request_id): Path<String>,
) -> Response {
    match state.tracker.get(&checkout_request_id).await {
        Some(entry) => ResponseBody::new(StatusCode::OK, entry).into_response(),
        None => not_found(&CorrelationError::Unknown {
            checkout_request_id,
        }),
    }
}
