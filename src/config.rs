use std::collections::HashMap;
use std::time::Duration;

use config::{Config as ConfigLib, ConfigBuilder, ConfigError, Environment, builder::DefaultState};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub mpesa: MpesaConfig,
    pub payments: PaymentsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Gateway identity. Every field is required; there are no defaults.
#[derive(Debug, Deserialize)]
pub struct MpesaConfig {
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: SecretString,
    pub shortcode: String,
    pub passkey: SecretString,
    pub callback_url: String,
}

impl MpesaConfig {
    /// A blank value fails here rather than at the first gateway exchange.
    fn ensure_present(&self) -> Result<(), ConfigError> {
        let fields = [
            ("base_url", self.base_url.as_str()),
            ("consumer_key", self.consumer_key.as_str()),
            ("consumer_secret", self.consumer_secret.expose_secret()),
            ("shortcode", self.shortcode.as_str()),
            ("passkey", self.passkey.expose_secret()),
            ("callback_url", self.callback_url.as_str()),
        ];
        match fields.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((field, _)) => Err(ConfigError::Message(format!(
                "mpesa.{field} must not be empty"
            ))),
            None => Ok(()),
        }
    }
}

/// Timing and request policy for the payment lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentsConfig {
    pub request_timeout_secs: u64,
    /// Lifetime assumed when the gateway's `expires_in` is unusable.
    /// Zero means the token is used once and never cached.
    pub token_fallback_lifetime_secs: u64,
    pub token_expiry_margin_secs: u64,
    pub token_retry_attempts: u32,
    pub token_retry_base_delay_ms: u64,
    pub correlation_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub archive_retention_secs: u64,
    pub idempotency_window_secs: u64,
    pub gateway_utc_offset_hours: i8,
    pub account_reference: String,
    pub transaction_desc: String,
}

impl PaymentsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_fallback_lifetime(&self) -> Option<Duration> {
        (self.token_fallback_lifetime_secs > 0)
            .then(|| Duration::from_secs(self.token_fallback_lifetime_secs))
    }

    pub fn token_expiry_margin(&self) -> Duration {
        Duration::from_secs(self.token_expiry_margin_secs)
    }

    pub fn correlation_ttl(&self) -> Duration {
        Duration::from_secs(self.correlation_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn archive_retention(&self) -> Duration {
        Duration::from_secs(self.archive_retention_secs)
    }

    pub fn idempotency_window(&self) -> Duration {
        Duration::from_secs(self.idempotency_window_secs)
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    /// Loads configuration from an explicit key/value map instead of the
    /// process environment. Keys use dotted paths such as `mpesa.passkey`.
    pub fn load_with_sources(env_vars: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let mut builder = Self::set_defaults()?;
        // If env_vars is provided, we use it instead of system environment
        // This is to avoid systems variables pollution across tests
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // Should be in the format APP_SERVER__PORT or APP_MPESA__CONSUMER_KEY
            builder = builder.add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.mpesa.ensure_present()?;
        Ok(config)
    }

    /// Set default values for the configuration.
    /// Gateway credentials are deliberately absent so a missing one fails the load.
    fn set_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        ConfigLib::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("payments.request_timeout_secs", 30)?
            .set_default("payments.token_fallback_lifetime_secs", 55 * 60)?
            .set_default("payments.token_expiry_margin_secs", 60)?
            .set_default("payments.token_retry_attempts", 3)?
            .set_default("payments.token_retry_base_delay_ms", 200)?
            .set_default("payments.correlation_ttl_secs", 180)?
            .set_default("payments.sweep_interval_secs", 15)?
            .set_default("payments.archive_retention_secs", 3600)?
            .set_default("payments.idempotency_window_secs", 600)?
            .set_default("payments.gateway_utc_offset_hours", 3)?
            .set_default("payments.account_reference", "TestPayment")?
            .set_default("payments.transaction_desc", "Goods payment")
    }
}
