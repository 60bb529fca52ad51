//! Authentication tokens issued by the mpx identity service

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An mpx authentication token.
///
/// The expiry is fixed when the token is created and the token is never
/// mutated afterwards. A token held across a long operation may still be
/// superseded by another caller forcing a refresh, so check [`Token::is_valid`]
/// again before reuse.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    value: String,
    lifetime_seconds: i64,
    expires_at: DateTime<Utc>,
}

impl Token {
    /// Create a token that expires `lifetime_seconds` from now.
    pub fn new(value: impl Into<String>, lifetime_seconds: i64) -> Self {
        Self::issued_at(value, lifetime_seconds, Utc::now())
    }

    /// Create a token issued at a specific instant.
    pub fn issued_at(value: impl Into<String>, lifetime_seconds: i64, issued: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            lifetime_seconds,
            expires_at: issued + Duration::seconds(lifetime_seconds),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Lifetime granted when the token was issued.
    pub fn lifetime_seconds(&self) -> i64 {
        self.lifetime_seconds
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whole seconds left before expiry, clamped at zero.
    pub fn remaining_seconds(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }

    /// True if the token stays valid for at least `min_duration_secs` more seconds.
    pub fn is_valid(&self, min_duration_secs: i64) -> bool {
        self.is_valid_at(Utc::now(), min_duration_secs)
    }

    /// [`Token::is_valid`] evaluated against a fixed clock reading.
    pub fn is_valid_at(&self, now: DateTime<Utc>, min_duration_secs: i64) -> bool {
        self.expires_at > now + Duration::seconds(min_duration_secs)
    }
}

// Token values are credentials
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("lifetime_seconds", &self.lifetime_seconds)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
