use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Error type for gateway transport failures
#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Failed to encode request body: {0}")]
    Encoding(String),
}

impl HttpClientError {
    /// Whether the request may have reached the gateway.
    pub fn may_have_been_delivered(&self) -> bool {
        !matches!(
            self,
            HttpClientError::NetworkError(_) | HttpClientError::Encoding(_)
        )
    }
}

/// Raw response from the gateway. Status interpretation is left to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub body: String,
    pub elapsed_ms: u64,
}

/// HTTP client wrapper for gateway calls
#[derive(Debug, Clone)]
pub struct GatewayHttpClient {
    client: Client,
    timeout: Duration,
}

impl GatewayHttpClient {
    /// Create a new HTTP client with default timeout (30 seconds)
    pub fn new() -> Result<Self, HttpClientError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a new HTTP client with custom timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("MpesaExpress/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HttpClientError::RequestFailed(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    /// GET with a preformatted `Authorization` header.
    pub async fn get(
        &self,
        url: &str,
        authorization: &str,
    ) -> Result<GatewayResponse, HttpClientError> {
        debug!(url = %url, "Sending gateway GET");

        let request = self.client.get(url).header(AUTHORIZATION, authorization);
        self.execute(url, request).await
    }

    /// POST a JSON body with a preformatted `Authorization` header.
    pub async fn post_json<T: Serialize>(
        &self,
        url: &str,
        authorization: &str,
        body: &T,
    ) -> Result<GatewayResponse, HttpClientError> {
        debug!(url = %url, "Sending gateway POST");

        let payload =
            serde_json::to_string(body).map_err(|e| HttpClientError::Encoding(e.to_string()))?;

        let request = self
            .client
            .post(url)
            .header(AUTHORIZATION, authorization)
            .header(CONTENT_TYPE, "application/json")
            .body(payload);

        self.execute(url, request).await
    }

    async fn execute(
        &self,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<GatewayResponse, HttpClientError> {
        let start = Instant::now();

        let response = request.send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Gateway request failed");
            self.classify(e)
        })?;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let status = response.status();

        debug!(
            url = %url,
            status = %status.as_u16(),
            elapsed_ms = %elapsed_ms,
            "Gateway response received"
        );

        let body = self.read_response_body(response).await?;

        Ok(GatewayResponse {
            status,
            body,
            elapsed_ms,
        })
    }

    fn classify(&self, err: reqwest::Error) -> HttpClientError {
        if err.is_timeout() {
            HttpClientError::Timeout(self.timeout)
        } else if err.is_connect() {
            HttpClientError::NetworkError(err.to_string())
        } else {
            HttpClientError::RequestFailed(err.to_string())
        }
    }

    /// Read response body with size limit
    async fn read_response_body(&self, response: Response) -> Result<String, HttpClientError> {
        // Limit response body size to 1MB
        const MAX_BODY_SIZE: usize = 1024 * 1024;

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                HttpClientError::Timeout(self.timeout)
            } else {
                HttpClientError::RequestFailed(format!("Failed to read response body: {e}"))
            }
        })?;

        if bytes.len() > MAX_BODY_SIZE {
            warn!(
                size = bytes.len(),
                max_size = MAX_BODY_SIZE,
                "Response body too large, truncating"
            );
        }

        let body = String::from_utf8_lossy(&bytes[..bytes.len().min(MAX_BODY_SIZE)]).to_string();
        Ok(body)
    }
}
