use axum::http::StatusCode;

/// Liveness only. Gateway reachability surfaces on the payment endpoints.
pub async fn health_check() -> StatusCode {
    StatusCode::OK
}
