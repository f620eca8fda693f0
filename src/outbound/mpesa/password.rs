use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};
use time::macros::format_description;
use time::error::Format;
use time::{OffsetDateTime, UtcOffset};

/// Derives the per-request password for push submissions.
///
/// `password = base64(shortcode || passkey || timestamp)`. The password is
/// bound to its timestamp and never reused across attempts.
pub struct PasswordSigner {
    shortcode: String,
    passkey: SecretString,
    offset: UtcOffset,
}

/// A password together with the timestamp it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedStamp {
    pub password: String,
    pub timestamp: String,
}

impl PasswordSigner {
    pub fn new(shortcode: impl Into<String>, passkey: SecretString, offset: UtcOffset) -> Self {
        Self {
            shortcode: shortcode.into(),
            passkey,
            offset,
        }
    }

    /// Stamp a request built right now.
    pub fn sign_now(&self) -> Result<SignedStamp, Format> {
        self.sign_at(OffsetDateTime::now_utc())
    }

    /// Stamp a request built at `instant`, rendered in the gateway's local time.
    pub fn sign_at(&self, instant: OffsetDateTime) -> Result<SignedStamp, Format> {
        let timestamp = format_timestamp(instant, self.offset)?;
        let password = sign(&self.shortcode, self.passkey.expose_secret(), &timestamp);
        Ok(SignedStamp {
            password,
            timestamp,
        })
    }
}

/// Concatenate the raw text of the three parts, no separators, and encode.
pub fn sign(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    let mut raw = String::with_capacity(shortcode.len() + passkey.len() + timestamp.len());
    raw.push_str(shortcode);
    raw.push_str(passkey);
    raw.push_str(timestamp);
    STANDARD.encode(raw.as_bytes())
}

/// Render `instant` as `YYYYMMDDHHMMSS` in the given offset.
pub fn format_timestamp(instant: OffsetDateTime, offset: UtcOffset) -> Result<String, Format> {
    instant
        .to_offset(offset)
        .format(format_description!("[year][month][day][hour][minute][second]"))
}
