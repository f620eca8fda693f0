use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::credentials::Credentials;
use super::http_client::{GatewayHttpClient, HttpClientError};
use super::retry_strategy::RetryStrategy;
use super::schemas::TokenResponse;
use crate::domain::ports::{TokenError, TokenSource};
use crate::domain::token::AccessToken;

/// Caching policy for bearer tokens.
#[derive(Debug, Clone)]
pub struct TokenPolicy {
    /// Lifetime assumed when the gateway's declared one is unusable.
    /// `None` makes such tokens single-use.
    pub fallback_lifetime: Option<Duration>,
    /// Tokens are treated as expired this long before their real expiry.
    pub expiry_margin: Duration,
    pub retry: RetryStrategy,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            fallback_lifetime: Some(Duration::from_secs(55 * 60)),
            expiry_margin: Duration::from_secs(60),
            retry: RetryStrategy::default(),
        }
    }
}

/// Exchanges consumer credentials for bearer tokens and caches them.
///
/// Readers holding a fresh cached token never wait on each other. Renewal is
/// serialised by `renewal` so at most one exchange is in flight; the cache
/// lock is only taken to read or swap the value, never across the HTTP call.
pub struct TokenManager {
    credentials: Arc<Credentials>,
    http_client: GatewayHttpClient,
    policy: TokenPolicy,
    cached: RwLock<Option<AccessToken>>,
    renewal: Mutex<()>,
}

impl TokenManager {
    pub fn new(
        credentials: Arc<Credentials>,
        http_client: GatewayHttpClient,
        policy: TokenPolicy,
    ) -> Self {
        Self {
            credentials,
            http_client,
            policy,
            cached: RwLock::new(None),
            renewal: Mutex::new(()),
        }
    }

    async fn fresh_cached(&self) -> Option<AccessToken> {
        let cached = self.cached.read().await;
        cached.as_ref().filter(|t| t.is_fresh()).cloned()
    }

    /// Exchange credentials, retrying transient failures per policy.
    async fn renew(&self) -> Result<AccessToken, TokenError> {
        let mut failed_attempts = 0;
        loop {
            match self.exchange().await {
                Ok(token) => return Ok(token),
                Err(TokenError::TransientNetwork(reason)) => {
                    failed_attempts += 1;
                    match self.policy.retry.delay_after(failed_attempts) {
                        Some(delay) => {
                            warn!(
                                attempt = failed_attempts,
                                max_attempts = self.policy.retry.max_attempts(),
                                delay_ms = delay.as_millis() as u64,
                                error = %reason,
                                "Token exchange failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => return Err(TokenError::TransientNetwork(reason)),
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One token exchange round trip.
    async fn exchange(&self) -> Result<AccessToken, TokenError> {
        debug!(consumer_key = %self.credentials.key_hint(), "Requesting access token");

        let response = self
            .http_client
            .get(
                &self.credentials.token_url(),
                &self.credentials.basic_auth_header(),
            )
            .await
            .map_err(|e: HttpClientError| TokenError::TransientNetwork(e.to_string()))?;

        let status = response.status.as_u16();

        if RetryStrategy::is_retryable_status(status) {
            return Err(TokenError::TransientNetwork(format!(
                "token endpoint returned status {status}"
            )));
        }

        if !response.status.is_success() {
            warn!(status, body = %response.body, "Token exchange rejected");
            return Err(TokenError::Authentication {
                status,
                body: response.body,
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&response.body).map_err(|e| {
            warn!(status, error = %e, body = %response.body, "Unparseable token response");
            TokenError::Authentication {
                status,
                body: response.body.clone(),
            }
        })?;

        if parsed.access_token.trim().is_empty() {
            return Err(TokenError::Authentication {
                status,
                body: response.body,
            });
        }

        let token = AccessToken::new(parsed.access_token, self.expiry_for(parsed.expires_in));
        info!(expires_at = ?token.expires_at(), "Access token acquired");
        Ok(token)
    }

    /// Declared lifetimes lose the safety margin; a lifetime that does not
    /// outlast the margin makes the token single-use. The fallback applies
    /// only when no usable lifetime was declared.
    fn expiry_for(&self, declared_secs: Option<u64>) -> Option<OffsetDateTime> {
        let lifetime = match declared_secs {
            Some(secs) => {
                let usable = Duration::from_secs(secs).saturating_sub(self.policy.expiry_margin);
                (!usable.is_zero()).then_some(usable)?
            }
            None => self.policy.fallback_lifetime?,
        };

        Some(OffsetDateTime::now_utc() + lifetime)
    }
}

#[async_trait]
impl TokenSource for TokenManager {
    async fn access_token(&self) -> Result<AccessToken, TokenError> {
        if let Some(token) = self.fresh_cached().await {
            return Ok(token);
        }

        let _guard = self.renewal.lock().await;

        // Another task may have renewed while we waited for the gate.
        if let Some(token) = self.fresh_cached().await {
            return Ok(token);
        }

        let token = self.renew().await?;
        if token.is_fresh() {
            *self.cached.write().await = Some(token.clone());
        }
        Ok(token)
    }

    async fn invalidate(&self, token: &AccessToken) {
        let mut cached = self.cached.write().await;
        if cached.as_ref() == Some(token) {
            debug!("Invalidating cached access token");
            *cached = None;
        }
    }
}
