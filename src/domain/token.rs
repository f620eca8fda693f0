use std::fmt;

use time::OffsetDateTime;

/// Short-lived bearer credential issued by the gateway.
///
/// A token without an expiry instant is single-use: it is never considered
/// fresh and is therefore never served from a cache.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    expires_at: Option<OffsetDateTime>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_at: Option<OffsetDateTime>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    pub fn single_use(value: impl Into<String>) -> Self {
        Self::new(value, None)
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.expires_at
    }

    /// Whether the token may still be attached to a request at `now`.
    pub fn is_fresh_at(&self, now: OffsetDateTime) -> bool {
        matches!(self.expires_at, Some(expiry) if now < expiry)
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(OffsetDateTime::now_utc())
    }

    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn test_fresh_before_expiry() {
        let now = OffsetDateTime::now_utc();
        let token = AccessToken::new("abc", Some(now + Duration::minutes(5)));

        assert!(token.is_fresh_at(now));
        assert!(!token.is_fresh_at(now + Duration::minutes(5)));
        assert!(!token.is_fresh_at(now + Duration::minutes(6)));
    }

    #[test]
    fn test_single_use_token_is_never_fresh() {
        let token = AccessToken::single_use("abc");
        assert!(!token.is_fresh());
        assert_eq!(token.expires_at(), None);
    }

    #[test]
    fn test_bearer_header() {
        let token = AccessToken::single_use("abc123");
        assert_eq!(token.bearer_header(), "Bearer abc123");
    }

    #[test]
    fn test_debug_redacts_value() {
        let token = AccessToken::single_use("super-secret-token");
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("super-secret-token"));
        assert!(rendered.contains("REDACTED"));
    }
}
