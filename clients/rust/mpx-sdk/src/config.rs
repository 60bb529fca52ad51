//! SDK Configuration

use std::fmt;
use std::time::Duration;

/// Default identity service base URL
pub const DEFAULT_IDENTITY_URL: &str = "https://identity.auth.theplatform.com";

/// Default access (registry) service base URL
pub const DEFAULT_ACCESS_URL: &str = "https://access.auth.theplatform.com";

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of objects requested per page
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Configuration for the mpx SDK
#[derive(Clone)]
pub struct Config {
    /// mpx username, including its directory prefix (e.g. `mpx/user@example.com`)
    pub username: String,

    /// mpx password
    pub password: String,

    /// Identity service base URL
    pub identity_url: String,

    /// Access service base URL, used for domain resolution
    pub access_url: String,

    /// Requested token lifetime, sent as `_duration`
    pub token_duration: Option<Duration>,

    /// Requested token idle timeout, sent as `_idleTimeout`
    pub token_idle_timeout: Option<Duration>,

    /// Seconds a cached token must still be valid for before it is reused
    pub min_token_validity_secs: i64,

    /// Request timeout
    pub timeout: Duration,

    /// User agent string
    pub user_agent: String,

    /// Objects per page for queries without an explicit range
    pub page_size: u32,
}

impl Config {
    /// Create a new configuration for the given credentials
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            identity_url: DEFAULT_IDENTITY_URL.to_string(),
            access_url: DEFAULT_ACCESS_URL.to_string(),
            token_duration: None,
            token_idle_timeout: None,
            min_token_validity_secs: 0,
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("mpx-rust-sdk/{}", env!("CARGO_PKG_VERSION")),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Set a custom identity service URL
    pub fn with_identity_url(mut self, url: impl Into<String>) -> Self {
        self.identity_url = url.into();
        self
    }

    /// Set a custom access service URL
    pub fn with_access_url(mut self, url: impl Into<String>) -> Self {
        self.access_url = url.into();
        self
    }

    /// Request a specific token lifetime and idle timeout
    pub fn with_token_lifetime(mut self, duration: Option<Duration>, idle_timeout: Option<Duration>) -> Self {
        self.token_duration = duration;
        self.token_idle_timeout = idle_timeout;
        self
    }

    /// Require cached tokens to remain valid for at least this many seconds
    pub fn with_min_token_validity(mut self, secs: i64) -> Self {
        self.min_token_validity_secs = secs;
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set custom user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the default page size
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Build the HTTP client described by this configuration
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .build()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("identity_url", &self.identity_url)
            .field("access_url", &self.access_url)
            .field("token_duration", &self.token_duration)
            .field("token_idle_timeout", &self.token_idle_timeout)
            .field("min_token_validity_secs", &self.min_token_validity_secs)
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .field("page_size", &self.page_size)
            .finish()
    }
}
