use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};

use crate::config::MpesaConfig;

const TOKEN_PATH: &str = "/oauth/v1/generate?grant_type=client_credentials";
const STK_PUSH_PATH: &str = "/mpesa/stkpush/v1/processrequest";

/// Gateway API identity, fixed for the lifetime of the process.
#[derive(Debug)]
pub struct Credentials {
    base_url: String,
    consumer_key: String,
    consumer_secret: SecretString,
    shortcode: String,
    passkey: SecretString,
    callback_url: String,
}

impl Credentials {
    pub fn new(
        base_url: impl Into<String>,
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        shortcode: impl Into<String>,
        passkey: impl Into<String>,
        callback_url: impl Into<String>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            consumer_key: consumer_key.into().trim().to_string(),
            consumer_secret: SecretString::from(consumer_secret.into().trim().to_string()),
            shortcode: shortcode.into().trim().to_string(),
            passkey: SecretString::from(passkey.into()),
            callback_url: callback_url.into(),
        }
    }

    pub fn from_config(config: &MpesaConfig) -> Self {
        Self::new(
            config.base_url.clone(),
            config.consumer_key.clone(),
            config.consumer_secret.expose_secret(),
            config.shortcode.clone(),
            config.passkey.expose_secret(),
            config.callback_url.clone(),
        )
    }

    /// `Basic base64(key:secret)` for the token exchange.
    pub fn basic_auth_header(&self) -> String {
        let raw = format!(
            "{}:{}",
            self.consumer_key,
            self.consumer_secret.expose_secret()
        );
        format!("Basic {}", STANDARD.encode(raw))
    }

    pub fn token_url(&self) -> String {
        format!("{}{}", self.base_url, TOKEN_PATH)
    }

    pub fn stk_push_url(&self) -> String {
        format!("{}{}", self.base_url, STK_PUSH_PATH)
    }

    pub fn shortcode(&self) -> &str {
        &self.shortcode
    }

    pub fn passkey(&self) -> &SecretString {
        &self.passkey
    }

    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    /// First characters of the consumer key, safe to log.
    pub fn key_hint(&self) -> String {
        let hint: String = self.consumer_key.chars().take(4).collect();
        format!("{hint}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials::new(
            "https://sandbox.safaricom.co.ke/",
            " consumer-key ",
            "consumer-secret\n",
            "174379",
            "passkey",
            "https://example.com/api/mpesa/callback",
        )
    }

    #[test]
    fn test_basic_auth_header_encodes_trimmed_pair() {
        let header = credentials().basic_auth_header();
        let encoded = header.strip_prefix("Basic ").expect("basic prefix");
        let decoded = STANDARD.decode(encoded).expect("valid base64");
        assert_eq!(decoded, b"consumer-key:consumer-secret");
    }

    #[test]
    fn test_endpoint_urls() {
        let creds = credentials();
        assert_eq!(
            creds.token_url(),
            "https://sandbox.safaricom.co.ke/oauth/v1/generate?grant_type=client_credentials"
        );
        assert_eq!(
            creds.stk_push_url(),
            "https://sandbox.safaricom.co.ke/mpesa/stkpush/v1/processrequest"
        );
    }

    #[test]
    fn test_debug_hides_secrets() {
        let rendered = format!("{:?}", credentials());
        assert!(!rendered.contains("consumer-secret"));
        assert!(!rendered.contains("\"passkey\""));
    }

    #[test]
    fn test_key_hint() {
        assert_eq!(credentials().key_hint(), "cons...");
    }
}
