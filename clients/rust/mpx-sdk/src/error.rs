//! Error types for the mpx SDK

use std::fmt;
use thiserror::Error;

/// Result type alias for mpx SDK operations
pub type Result<T> = std::result::Result<T, Error>;

/// A vendor exception envelope returned by an mpx service.
///
/// mpx reports failures either through the HTTP status or through a body
/// carrying `isException: true` (JSON) or `<e:responseCode>` (XML), sometimes
/// on a response that otherwise looks successful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiException {
    /// Vendor response code, usually mirroring an HTTP status.
    pub response_code: u16,
    /// Exception class title, e.g. `com.theplatform.data.api.exception.ObjectNotFoundException`.
    pub title: String,
    /// Human readable description.
    pub description: String,
    /// Correlation id, when the service supplied one.
    pub correlation_id: Option<String>,
}

impl fmt::Display for ApiException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {} {}: {}", self.response_code, self.title, self.description)?;
        if let Some(ref id) = self.correlation_id {
            write!(f, " (correlation id {})", id)?;
        }
        Ok(())
    }
}

/// Error types for the mpx SDK
#[derive(Error, Debug)]
pub enum Error {
    /// Sign-in or sign-out against the identity service failed
    #[error("Authentication failed ({status}): {message}")]
    Authentication { status: u16, message: String },

    /// The data service returned an exception envelope
    #[error("mpx API error: {0}")]
    Api(ApiException),

    /// The notification sequence id is outside the server's retention window
    #[error("Notification id {since} has expired, resynchronize before listening again")]
    NotificationExpired { since: i64 },

    /// `listen()` was called before any sequence id was known
    #[error("Notification listener has no sequence id, call sync() first")]
    NotSynced,

    /// No cached token exists for the user
    #[error("No token cached for user {0}")]
    TokenNotFound(String),

    /// Non-2xx response without a recognizable vendor envelope
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// HTTP transport failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL construction failed
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Token cache backend failure
    #[error("Token cache error: {0}")]
    Cache(String),

    /// Session lock could not be acquired or released
    #[error("Session lock error: {0}")]
    Lock(String),

    /// A query could not be built
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The response could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Numeric status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Authentication { status, .. } => Some(*status),
            Error::Api(exception) => Some(exception.response_code),
            Error::Status { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True if a data request was rejected because its token is no longer valid.
    ///
    /// This is the only condition the authenticated client retries on. Identity
    /// service failures are excluded even when they carry a 401.
    pub fn is_token_auth_error(&self) -> bool {
        match self {
            Error::Api(exception) => exception.response_code == 401,
            Error::Status { status, .. } => *status == 401,
            _ => false,
        }
    }

    /// True if the error reports a missing object or endpoint.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404) && !matches!(self, Error::Authentication { .. })
    }

    pub(crate) fn redis(e: redis::RedisError) -> Self {
        Error::Cache(e.to_string())
    }
}
