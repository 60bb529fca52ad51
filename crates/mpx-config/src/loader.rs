//! Configuration loader with file and environment variable support

use crate::{ConfigError, MpxConfig};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &["mpx.toml", "./config/mpx.toml", "/etc/mpx/mpx.toml"];

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MPX_CONFIG";

/// Configuration loader
///
/// Looks for a file at the explicit path, then `MPX_CONFIG`, then the
/// standard paths, and finally applies `MPX_*` overrides on top.
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<MpxConfig, ConfigError> {
        let mut config = MpxConfig::default();

        if let Some(path) = self.find_config_file()? {
            info!(?path, "Loading configuration from file");
            config = MpxConfig::from_file(&path)?;
        }

        apply_overrides(&mut config, |key| env::var(key).ok())?;

        Ok(config)
    }

    fn find_config_file(&self) -> Result<Option<PathBuf>, ConfigError> {
        // An explicitly requested file must exist
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Ok(Some(path.clone()));
            }
            return Err(ConfigError::ValidationError(format!(
                "config file {} not found",
                path.display()
            )));
        }

        if let Ok(path) = env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(ConfigError::EnvError(format!(
                "{} points at missing file {}",
                CONFIG_ENV_VAR,
                path.display()
            )));
        }

        Ok(CONFIG_PATHS.iter().map(PathBuf::from).find(|p| p.exists()))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse<T: std::str::FromStr>(key: &str, val: &str) -> Result<T, ConfigError> {
    val.trim()
        .parse()
        .map_err(|_| ConfigError::EnvError(format!("{} has invalid value '{}'", key, val)))
}

/// Apply `MPX_*` overrides read through `lookup`
pub(crate) fn apply_overrides<F>(config: &mut MpxConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // Auth
    if let Some(val) = lookup("MPX_USERNAME") {
        config.auth.username = val;
    }
    if let Some(val) = lookup("MPX_PASSWORD") {
        config.auth.password = val;
    }
    if let Some(val) = lookup("MPX_TOKEN_DURATION_SECS") {
        config.auth.duration_secs = Some(parse("MPX_TOKEN_DURATION_SECS", &val)?);
    }
    if let Some(val) = lookup("MPX_TOKEN_IDLE_TIMEOUT_SECS") {
        config.auth.idle_timeout_secs = Some(parse("MPX_TOKEN_IDLE_TIMEOUT_SECS", &val)?);
    }
    if let Some(val) = lookup("MPX_MIN_TOKEN_VALIDITY_SECS") {
        config.auth.min_validity_secs = parse("MPX_MIN_TOKEN_VALIDITY_SECS", &val)?;
    }

    // Endpoints
    if let Some(val) = lookup("MPX_IDENTITY_URL") {
        config.endpoints.identity_url = val;
    }
    if let Some(val) = lookup("MPX_ACCESS_URL") {
        config.endpoints.access_url = val;
    }

    // HTTP
    if let Some(val) = lookup("MPX_HTTP_TIMEOUT_SECS") {
        config.http.timeout_secs = parse("MPX_HTTP_TIMEOUT_SECS", &val)?;
    }
    if let Some(val) = lookup("MPX_USER_AGENT") {
        config.http.user_agent = val;
    }

    // Redis, shared by cache and lock unless set individually below
    if let Some(val) = lookup("MPX_REDIS_URL") {
        config.cache.redis_url = Some(val.clone());
        config.lock.redis_url = Some(val);
    }

    // Cache
    if let Some(val) = lookup("MPX_CACHE_BACKEND") {
        config.cache.backend = val.parse()?;
    }
    if let Some(val) = lookup("MPX_CACHE_REDIS_URL") {
        config.cache.redis_url = Some(val);
    }

    // Lock
    if let Some(val) = lookup("MPX_LOCK_BACKEND") {
        config.lock.backend = val.parse()?;
    }
    if let Some(val) = lookup("MPX_LOCK_REDIS_URL") {
        config.lock.redis_url = Some(val);
    }
    if let Some(val) = lookup("MPX_LOCK_TTL_SECS") {
        config.lock.ttl_secs = parse("MPX_LOCK_TTL_SECS", &val)?;
    }

    // Paging
    if let Some(val) = lookup("MPX_PAGE_SIZE") {
        config.paging.page_size = parse("MPX_PAGE_SIZE", &val)?;
    }

    // Notify
    if let Some(val) = lookup("MPX_NOTIFY_CLIENT_ID") {
        config.notify.client_id = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CacheBackend, LockBackend};
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let mut config = MpxConfig::default();
        apply_overrides(
            &mut config,
            lookup(&[
                ("MPX_USERNAME", "mpx/ops@example.com"),
                ("MPX_PASSWORD", "pw"),
                ("MPX_PAGE_SIZE", "250"),
                ("MPX_TOKEN_DURATION_SECS", "600"),
                ("MPX_CACHE_BACKEND", "redis"),
                ("MPX_REDIS_URL", "redis://shared:6379"),
                ("MPX_LOCK_REDIS_URL", "redis://lock:6379"),
            ]),
        )
        .unwrap();

        assert_eq!(config.auth.username, "mpx/ops@example.com");
        assert_eq!(config.paging.page_size, 250);
        assert_eq!(config.auth.duration_secs, Some(600));
        assert_eq!(config.cache.backend, CacheBackend::Redis);
        assert_eq!(config.cache.redis_url.as_deref(), Some("redis://shared:6379"));
        assert_eq!(config.lock.redis_url.as_deref(), Some("redis://lock:6379"));
        assert_eq!(config.lock.backend, LockBackend::Local);
    }

    #[test]
    fn test_invalid_override_is_an_error() {
        let mut config = MpxConfig::default();
        let err = apply_overrides(&mut config, lookup(&[("MPX_PAGE_SIZE", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::EnvError(msg) if msg.contains("MPX_PAGE_SIZE")));

        let err = apply_overrides(&mut config, lookup(&[("MPX_LOCK_BACKEND", "zookeeper")])).unwrap_err();
        assert!(matches!(err, ConfigError::EnvError(_)));
    }

    #[test]
    fn test_explicit_path_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[paging]\npage_size = 42\n\n[notify]\nclient_id = \"watcher\"").unwrap();

        let config = ConfigLoader::with_path(file.path()).load().unwrap();
        assert_eq!(config.notify.client_id, "watcher");
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConfigLoader::with_path(dir.path().join("absent.toml")).load();
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
