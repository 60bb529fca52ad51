//! mpx Configuration
//!
//! TOML-based configuration for the SDK and the command line tool, with
//! environment variable overrides (see [`ConfigLoader`]).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Largest page size the data services accept
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Environment variable error: {0}")]
    EnvError(String),
}

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MpxConfig {
    pub auth: AuthConfig,
    pub endpoints: EndpointsConfig,
    pub http: HttpConfig,
    pub cache: CacheConfig,
    pub lock: LockConfig,
    pub paging: PagingConfig,
    pub notify: NotifyConfig,
}

/// Credentials and token lifetime
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
    /// Requested absolute token lifetime; the identity service default when unset
    pub duration_secs: Option<u64>,
    /// Requested idle timeout; the identity service default when unset
    pub idle_timeout_secs: Option<u64>,
    /// A cached token is reused only while it has more than this many seconds left
    pub min_validity_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            duration_secs: None,
            idle_timeout_secs: None,
            min_validity_secs: 0,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("duration_secs", &self.duration_secs)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("min_validity_secs", &self.min_validity_secs)
            .finish()
    }
}

/// Service endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub identity_url: String,
    pub access_url: String,
    /// Fixed base URLs by data service name. When non-empty these are used
    /// instead of the access registry.
    pub services: BTreeMap<String, String>,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            identity_url: mpx_sdk::config::DEFAULT_IDENTITY_URL.to_string(),
            access_url: mpx_sdk::config::DEFAULT_ACCESS_URL.to_string(),
            services: BTreeMap::new(),
        }
    }
}

/// HTTP client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            user_agent: format!("mpx-sdk-rust/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Where tokens are cached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Redis,
}

impl FromStr for CacheBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(ConfigError::EnvError(format!("unknown cache backend '{}'", other))),
        }
    }
}

/// Token cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub redis_url: Option<String>,
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            redis_url: None,
            key_prefix: mpx_sdk::token_cache::DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

/// How concurrent token refreshes are serialised
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockBackend {
    #[default]
    Local,
    Redis,
}

impl FromStr for LockBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "redis" => Ok(Self::Redis),
            other => Err(ConfigError::EnvError(format!("unknown lock backend '{}'", other))),
        }
    }
}

/// Session lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub backend: LockBackend,
    pub redis_url: Option<String>,
    pub key_prefix: String,
    pub ttl_secs: u64,
    pub wait_timeout_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backend: LockBackend::Local,
            redis_url: None,
            key_prefix: "mpx:lock:".to_string(),
            ttl_secs: 150,
            wait_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    pub page_size: u32,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            page_size: mpx_sdk::config::DEFAULT_PAGE_SIZE,
        }
    }
}

/// Notification listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub client_id: String,
    /// Sync again after the server reports the held sequence id as expired
    pub resync_on_expiry: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            client_id: "mpx-cli".to_string(),
            resync_on_expiry: true,
        }
    }
}

impl MpxConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: MpxConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Check the settings the SDK cannot work without
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.username.trim().is_empty() {
            return Err(ConfigError::ValidationError("auth.username is required".into()));
        }
        if self.auth.password.is_empty() {
            return Err(ConfigError::ValidationError("auth.password is required".into()));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.paging.page_size) {
            return Err(ConfigError::ValidationError(format!(
                "paging.page_size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, self.paging.page_size
            )));
        }
        if self.cache.backend == CacheBackend::Redis && self.cache.redis_url.is_none() {
            return Err(ConfigError::ValidationError(
                "cache.redis_url is required for the redis cache backend".into(),
            ));
        }
        if self.lock.backend == LockBackend::Redis && self.lock.redis_url.is_none() {
            return Err(ConfigError::ValidationError(
                "lock.redis_url is required for the redis lock backend".into(),
            ));
        }
        Ok(())
    }

    /// Settings for the redis session lock, `None` unless that backend is selected.
    ///
    /// The TTL is raised when needed so a refresh at `http.timeout_secs` cannot
    /// outlive the lock.
    pub fn redis_lock_config(&self) -> Option<mpx_sdk::lock::RedisLockConfig> {
        if self.lock.backend != LockBackend::Redis {
            return None;
        }
        let url = self.lock.redis_url.clone()?;
        Some(
            mpx_sdk::lock::RedisLockConfig::new(url)
                .with_key_prefix(self.lock.key_prefix.clone())
                .with_ttl(Duration::from_secs(self.lock.ttl_secs))
                .with_request_timeout(Duration::from_secs(self.http.timeout_secs))
                .with_wait_timeout(Duration::from_secs(self.lock.wait_timeout_secs)),
        )
    }

    /// The SDK client configuration described by this file
    pub fn sdk_config(&self) -> mpx_sdk::Config {
        mpx_sdk::Config::new(&self.auth.username, &self.auth.password)
            .with_identity_url(&self.endpoints.identity_url)
            .with_access_url(&self.endpoints.access_url)
            .with_token_lifetime(
                self.auth.duration_secs.map(Duration::from_secs),
                self.auth.idle_timeout_secs.map(Duration::from_secs),
            )
            .with_min_token_validity(self.auth.min_validity_secs)
            .with_timeout(Duration::from_secs(self.http.timeout_secs))
            .with_user_agent(&self.http.user_agent)
            .with_page_size(self.paging.page_size)
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# mpx SDK Configuration
# Environment variables (MPX_*) override these settings

[auth]
username = "mpx/user@example.com"
password = ""
# duration_secs = 43200
# idle_timeout_secs = 14400
min_validity_secs = 60

[endpoints]
identity_url = "https://identity.auth.theplatform.com"
access_url = "https://access.auth.theplatform.com"

# Fixed service URLs skip the access registry
# [endpoints.services]
# "Media Data Service" = "https://data.media.theplatform.com/media"

[http]
timeout_secs = 60
user_agent = "mpx-sdk-rust"

[cache]
backend = "memory"  # memory or redis
# redis_url = "redis://localhost:6379"
key_prefix = "mpx:token:"

[lock]
backend = "local"  # local or redis
# redis_url = "redis://localhost:6379"
key_prefix = "mpx:lock:"
ttl_secs = 150  # raised to cover a sign-out plus sign-in at http.timeout_secs
wait_timeout_secs = 60

[paging]
page_size = 100

[notify]
client_id = "mpx-cli"
resync_on_expiry = true
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid() -> MpxConfig {
        let mut config = MpxConfig::default();
        config.auth.username = "mpx/user@example.com".into();
        config.auth.password = "secret".into();
        config
    }

    #[test]
    fn test_defaults() {
        let config = MpxConfig::default();
        assert_eq!(config.paging.page_size, 100);
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.lock.backend, LockBackend::Local);
        assert_eq!(config.lock.ttl_secs, 150);
        assert!(config.endpoints.services.is_empty());
    }

    #[test]
    fn test_default_lock_ttl_outlasts_refresh() {
        let config = MpxConfig::default();
        assert!(config.lock.ttl_secs > 2 * config.http.timeout_secs);
    }

    #[test]
    fn test_redis_lock_ttl_follows_http_timeout() {
        let mut config = valid();
        assert!(config.redis_lock_config().is_none());

        config.lock.backend = LockBackend::Redis;
        config.lock.redis_url = Some("redis://localhost:6379".into());
        config.lock.ttl_secs = 10;
        config.http.timeout_secs = 120;

        let lock = config.redis_lock_config().unwrap();
        assert!(lock.ttl > Duration::from_secs(240));
        assert_eq!(lock.key_prefix, "mpx:lock:");
    }

    #[test]
    fn test_example_toml_parses() {
        let config: MpxConfig = toml::from_str(&MpxConfig::example_toml()).unwrap();
        assert_eq!(config.auth.username, "mpx/user@example.com");
        assert_eq!(config.auth.min_validity_secs, 60);
        assert_eq!(config.notify.client_id, "mpx-cli");
    }

    #[test]
    fn test_from_file_with_partial_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[auth]
username = "mpx/a@b.com"
password = "pw"

[cache]
backend = "redis"
redis_url = "redis://cache:6379"

[endpoints.services]
"Media Data Service" = "http://localhost:9000/media"
"#
        )
        .unwrap();

        let config = MpxConfig::from_file(file.path()).unwrap();
        assert_eq!(config.cache.backend, CacheBackend::Redis);
        assert_eq!(config.cache.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.paging.page_size, 100);
        assert_eq!(
            config.endpoints.services.get("Media Data Service").map(String::as_str),
            Some("http://localhost:9000/media")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_credentials() {
        let err = MpxConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(msg) if msg.contains("username")));

        let mut config = valid();
        config.auth.password.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_page_size_bounds() {
        let mut config = valid();
        config.paging.page_size = 0;
        assert!(config.validate().is_err());
        config.paging.page_size = MAX_PAGE_SIZE + 1;
        assert!(config.validate().is_err());
        config.paging.page_size = MAX_PAGE_SIZE;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_redis_needs_url() {
        let mut config = valid();
        config.lock.backend = LockBackend::Redis;
        assert!(config.validate().is_err());
        config.lock.redis_url = Some("redis://localhost:6379".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sdk_config_carries_settings() {
        let mut config = valid();
        config.auth.duration_secs = Some(3600);
        config.paging.page_size = 25;
        let sdk = config.sdk_config();
        assert_eq!(sdk.username, "mpx/user@example.com");
        assert_eq!(sdk.token_duration, Some(Duration::from_secs(3600)));
        assert_eq!(sdk.token_idle_timeout, None);
        assert_eq!(sdk.page_size, 25);
    }

    #[test]
    fn test_debug_hides_password() {
        let text = format!("{:?}", valid());
        assert!(!text.contains("secret"));
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("Redis".parse::<CacheBackend>().unwrap(), CacheBackend::Redis);
        assert_eq!("local".parse::<LockBackend>().unwrap(), LockBackend::Local);
        assert!("mongo".parse::<CacheBackend>().is_err());
    }
}
