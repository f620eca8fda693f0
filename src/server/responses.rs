use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::ports::{CorrelationError, InitiationError};

/// Generic response structure shared by all API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseBody<T: Serialize> {
    status_code: u16,
    data: T,
}

impl<T: Serialize> ResponseBody<T> {
    pub fn new(status: StatusCode, data: T) -> Self {
        Self {
            status_code: status.as_u16(),
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ResponseBody<T> {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Error payload carried in `data` of a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorData {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
}

impl ErrorData {
    pub fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            field: None,
        }
    }
}

/// Wraps [`InitiationError`] so handlers can return it with `?`.
#[derive(Debug)]
pub struct ApiError(pub InitiationError);

impl From<InitiationError> for ApiError {
    fn from(err: InitiationError) -> Self {
        Self(err)
    }
}

pub fn status_for(err: &InitiationError) -> StatusCode {
    match err {
        InitiationError::Validation(_) => StatusCode::BAD_REQUEST,
        InitiationError::DuplicateSubmission { .. } => StatusCode::CONFLICT,
        InitiationError::GatewayRejection { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        InitiationError::Authentication { .. } | InitiationError::GatewayCommunication { .. } => {
            StatusCode::BAD_GATEWAY
        }
        InitiationError::TransientNetwork { .. } => StatusCode::GATEWAY_TIMEOUT,
        InitiationError::Correlation(_) => StatusCode::CONFLICT,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        // Upstream bodies stay in the logs, not in our responses.
        let message = match &self.0 {
            InitiationError::Authentication { status, .. } => {
                format!("Gateway authentication failed with status {status}")
            }
            InitiationError::GatewayCommunication { status, reason, .. } => match status {
                Some(status) => format!("Unexpected gateway response ({status}): {reason}"),
                None => format!("Unexpected gateway response: {reason}"),
            },
            other => other.to_string(),
        };
        let field = match &self.0 {
            InitiationError::Validation(e) => Some(e.field),
            _ => None,
        };

        ResponseBody::new(
            status,
            ErrorData {
                kind: self.0.kind(),
                message,
                field,
            },
        )
        .into_response()
    }
}

/// Lookup failures on the transaction query endpoint.
pub fn not_found(err: &CorrelationError) -> Response {
    ResponseBody::new(StatusCode::NOT_FOUND, ErrorData::new("not_found", err.to_string()))
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::ValidationError;

    #[test]
    fn test_error_statuses() {
        let cases = [
            (
                InitiationError::Validation(ValidationError {
                    field: "phone",
                    reason: "bad".to_string(),
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                InitiationError::DuplicateSubmission {
                    idempotency_key: "k".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (
                InitiationError::GatewayRejection {
                    code: "1".to_string(),
                    description: "no".to_string(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                InitiationError::Authentication {
                    status: 400,
                    body: String::new(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                InitiationError::TransientNetwork {
                    reason: "timeout".to_string(),
                    delivery_unknown: true,
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(status_for(&err), expected, "{err}");
            assert_eq!(ApiError(err).into_response().status(), expected);
        }
    }

    #[test]
    fn test_response_body_shape() {
        let body = ResponseBody::new(StatusCode::OK, ErrorData::new("not_found", "missing"));
        let json = serde_json::to_value(&body).expect("serializes");
        assert_eq!(
            json,
            serde_json::json!({
                "status_code": 200,
                "data": {"kind": "not_found", "message": "missing"}
            })
        );
    }
}
