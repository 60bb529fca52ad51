//! Authentication support for the mpx SDK
//!
//! [`UserSession`] signs a user in against the identity service, keeps the
//! resulting token in a [`TokenCachePool`] and hands out valid tokens on demand.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::lock::{LocalLock, SessionLock};
use crate::response::parse_exception;
use crate::token::Token;
use crate::token_cache::TokenCachePool;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// mpx credentials
#[derive(Clone)]
pub struct User {
    username: String,
    password: String,
}

impl User {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Sign-in response from the identity service
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInEnvelope {
    sign_in_response: SignInResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    token: String,
    /// Milliseconds
    duration: i64,
    /// Milliseconds
    idle_timeout: i64,
}

impl SignInResponse {
    /// The shorter of the absolute and idle lifetimes, in seconds
    fn lifetime_seconds(&self) -> i64 {
        self.duration.min(self.idle_timeout) / 1000
    }
}

/// Which cached token a refresh may keep once it holds the lock
#[derive(Debug, Clone, Copy)]
enum Reuse<'a> {
    /// Any token that is still valid
    Valid,
    /// None, always sign in again
    Never,
    /// Any valid token except the one with this value
    Except(&'a str),
}

impl Reuse<'_> {
    fn allows(&self, token: &Token) -> bool {
        match self {
            Reuse::Valid => true,
            Reuse::Never => false,
            Reuse::Except(rejected) => token.value() != *rejected,
        }
    }
}

/// A user's authenticated session with mpx
pub struct UserSession {
    user: User,
    http_client: reqwest::Client,
    identity_url: String,
    token_cache: TokenCachePool,
    lock: Arc<dyn SessionLock>,
    duration: Option<Duration>,
    idle_timeout: Option<Duration>,
    min_validity_secs: i64,
}

impl UserSession {
    /// Create a session with an in-memory token cache and an in-process lock
    pub fn new(user: User, http_client: reqwest::Client) -> Self {
        Self {
            user,
            http_client,
            identity_url: crate::config::DEFAULT_IDENTITY_URL.to_string(),
            token_cache: TokenCachePool::in_memory(),
            lock: Arc::new(LocalLock::new()),
            duration: None,
            idle_timeout: None,
            min_validity_secs: 0,
        }
    }

    /// Create a session from SDK configuration
    pub fn from_config(config: &Config, http_client: reqwest::Client) -> Self {
        Self::new(User::new(&config.username, &config.password), http_client)
            .with_identity_url(&config.identity_url)
            .with_duration(config.token_duration)
            .with_idle_timeout(config.token_idle_timeout)
            .with_min_validity(config.min_token_validity_secs)
    }

    /// Share a token cache with other sessions or processes
    pub fn with_token_cache(mut self, cache: TokenCachePool) -> Self {
        self.token_cache = cache;
        self
    }

    /// Guard sign-in with a different lock
    pub fn with_lock(mut self, lock: Arc<dyn SessionLock>) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_identity_url(mut self, url: impl Into<String>) -> Self {
        self.identity_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Lifetime requested when a caller does not ask for one
    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    /// Idle timeout requested on every sign-in
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Seconds a cached token must still be good for when no duration is requested
    pub fn with_min_validity(mut self, secs: i64) -> Self {
        self.min_validity_secs = secs;
        self
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn token_cache(&self) -> &TokenCachePool {
        &self.token_cache
    }

    /// Return a token valid for at least `duration`, signing in if needed.
    ///
    /// With `force` the cached token is discarded and a new one is always
    /// issued. When a token is replaced, the old one is signed out first on a
    /// best-effort basis.
    pub async fn acquire_token(&self, duration: Option<Duration>, force: bool) -> Result<Token> {
        let min_secs = duration
            .map(|d| d.as_secs() as i64)
            .unwrap_or(self.min_validity_secs);

        if !force {
            if let Some(token) = self.cached_token().await? {
                if token.is_valid(min_secs) {
                    return Ok(token);
                }
            }
        }

        let reuse = if force { Reuse::Never } else { Reuse::Valid };
        self.refresh(duration, min_secs, reuse).await
    }

    /// Replace a token the API rejected.
    ///
    /// Callers that saw the same rejection concurrently share one refresh: a
    /// cached token other than `rejected` that is still valid was issued by
    /// whoever refreshed first, and is returned instead of signing in again.
    pub async fn replace_token(&self, rejected: &Token) -> Result<Token> {
        let min_secs = self.min_validity_secs;

        if let Some(token) = self.cached_token().await? {
            if token.value() != rejected.value() && token.is_valid(min_secs) {
                return Ok(token);
            }
        }

        self.refresh(None, min_secs, Reuse::Except(rejected.value())).await
    }

    async fn refresh(&self, duration: Option<Duration>, min_secs: i64, reuse: Reuse<'_>) -> Result<Token> {
        // A cancelled caller drops the lease, which releases it
        let lease = self.lock.acquire(self.user.username()).await?;
        let result = self.refresh_locked(duration, min_secs, reuse).await;
        if let Err(e) = self.lock.release(lease).await {
            warn!(error = %e, "Failed to release session lock");
        }
        result
    }

    async fn refresh_locked(&self, duration: Option<Duration>, min_secs: i64, reuse: Reuse<'_>) -> Result<Token> {
        let existing = self.cached_token().await?;

        // Another worker may have refreshed while we waited for the lock
        if let Some(ref token) = existing {
            if reuse.allows(token) && token.is_valid(min_secs) {
                debug!(user = %self.user.username(), "Using token refreshed by another caller");
                return Ok(token.clone());
            }
        }

        if let Some(token) = existing {
            if let Err(e) = self.sign_out(&token).await {
                warn!(user = %self.user.username(), error = %e, "Sign-out of replaced token failed");
            }
        }

        self.sign_in(duration).await
    }

    async fn cached_token(&self) -> Result<Option<Token>> {
        match self.token_cache.get_token(self.user.username()).await {
            Ok(token) => Ok(Some(token)),
            Err(Error::TokenNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Sign in and cache the issued token
    pub async fn sign_in(&self, duration: Option<Duration>) -> Result<Token> {
        let url = format!("{}/idm/web/Authentication/signIn", self.identity_url);
        let mut query: Vec<(&str, String)> = vec![("schema", "1.0".into()), ("form", "json".into())];
        if let Some(d) = duration.or(self.duration) {
            query.push(("_duration", d.as_millis().to_string()));
        }
        if let Some(idle) = self.idle_timeout {
            query.push(("_idleTimeout", idle.as_millis().to_string()));
        }

        let response = self
            .http_client
            .get(&url)
            .query(&query)
            .basic_auth(self.user.username(), Some(&self.user.password))
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?;

        if let Some(exception) = parse_exception(&body) {
            return Err(Error::Authentication {
                status: exception.response_code,
                message: exception.description,
            });
        }
        if !(200..300).contains(&status) {
            return Err(Error::Authentication {
                status,
                message: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let envelope: SignInEnvelope = serde_json::from_slice(&body)?;
        let signed_in = envelope.sign_in_response;
        let token = Token::new(signed_in.token.clone(), signed_in.lifetime_seconds());

        self.token_cache
            .set_token(self.user.username(), &token)
            .await?;

        info!(
            user = %self.user.username(),
            lifetime_seconds = token.lifetime_seconds(),
            "Signed in to mpx"
        );
        Ok(token)
    }

    /// Invalidate a token server-side and drop it from the cache
    pub async fn sign_out(&self, token: &Token) -> Result<()> {
        // Drop the cache entry even if the remote call fails
        self.token_cache.delete_token(self.user.username()).await?;

        let url = format!("{}/idm/web/Authentication/signOut", self.identity_url);
        let response = self
            .http_client
            .get(&url)
            .query(&[("schema", "1.0"), ("form", "json"), ("_token", token.value())])
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?;
        if let Some(exception) = parse_exception(&body) {
            return Err(Error::Authentication {
                status: exception.response_code,
                message: exception.description,
            });
        }
        if !(200..300).contains(&status) {
            return Err(Error::Authentication {
                status,
                message: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        info!(user = %self.user.username(), "Signed out of mpx");
        Ok(())
    }

    /// Sign out the currently cached token, if any
    pub async fn sign_out_current(&self) -> Result<()> {
        let lease = self.lock.acquire(self.user.username()).await?;
        let result = match self.cached_token().await {
            Ok(Some(token)) => self.sign_out(&token).await,
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = self.lock.release(lease).await {
            warn!(error = %e, "Failed to release session lock");
        }
        result
    }
}

impl fmt::Debug for UserSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserSession")
            .field("user", &self.user)
            .field("identity_url", &self.identity_url)
            .field("lock", &self.lock)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifetime_uses_shorter_window() {
        let response = SignInResponse {
            token: "t".into(),
            duration: 315_360_000_000,
            idle_timeout: 14_400_000,
        };
        assert_eq!(response.lifetime_seconds(), 14_400);

        let response = SignInResponse {
            token: "t".into(),
            duration: 60_000,
            idle_timeout: 14_400_000,
        };
        assert_eq!(response.lifetime_seconds(), 60);
    }

    #[test]
    fn test_sign_in_envelope_parses() {
        let body = r#"{"signInResponse":{"authenticationMethod":"basic","duration":315360000000,"idleTimeout":14400000,"token":"abc","userId":"https://identity.auth.theplatform.com/idm/data/User/mpx/1","userName":"mpx/user@example.com"}}"#;
        let envelope: SignInEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.sign_in_response.token, "abc");
    }

    #[test]
    fn test_reuse_rules() {
        let token = Token::new("tok-2", 600);
        assert!(Reuse::Valid.allows(&token));
        assert!(!Reuse::Never.allows(&token));
        assert!(Reuse::Except("tok-1").allows(&token));
        assert!(!Reuse::Except("tok-2").allows(&token));
    }

    #[test]
    fn test_user_debug_hides_password() {
        let user = User::new("mpx/user", "hunter2");
        assert!(!format!("{:?}", user).contains("hunter2"));
    }
}
