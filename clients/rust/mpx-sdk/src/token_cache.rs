//! Per-user token storage
//!
//! [`TokenCachePool`] holds at most one [`Token`] per user. Expiry is delegated
//! to the backing store, which drops the entry once the token's remaining
//! lifetime has elapsed. TTL precision is not exact, so callers still check
//! [`Token::is_valid`] on whatever they get back.

use crate::error::{Error, Result};
use crate::token::Token;
use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default key prefix for cached tokens
pub const DEFAULT_KEY_PREFIX: &str = "mpx:token:";

/// Storage behind a [`TokenCachePool`]
#[async_trait]
pub trait TokenCacheBackend: Send + Sync + fmt::Debug {
    /// Read a serialized token, `None` if absent or already evicted.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a serialized token that the backend drops after `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Remove an entry immediately.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-process backend with per-entry expiry
#[derive(Debug, Default)]
pub struct MemoryCacheBackend {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, including ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl TokenCacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        // The map guard must be released before removing
        {
            let Some(entry) = self.entries.get(key) else {
                return Ok(None);
            };
            let (value, expires) = entry.value();
            if *expires > Instant::now() {
                return Ok(Some(value.clone()));
            }
        }

        self.entries
            .remove_if(key, |_, (_, expires)| *expires <= Instant::now());
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Redis backend, shared by every process pointing at the same server
#[derive(Clone)]
pub struct RedisCacheBackend {
    conn: ConnectionManager,
}

impl RedisCacheBackend {
    /// Connect to the given redis URL
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(Error::redis)?;
        let conn = ConnectionManager::new(client).await.map_err(Error::redis)?;
        Ok(Self { conn })
    }

    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

impl fmt::Debug for RedisCacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCacheBackend").finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenCacheBackend for RedisCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(Error::redis)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        // SET key value EX seconds, never below one second
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(Error::redis)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(Error::redis)?;
        Ok(())
    }
}

/// Token storage keyed by a stable hash of the username
#[derive(Debug, Clone)]
pub struct TokenCachePool {
    backend: Arc<dyn TokenCacheBackend>,
    key_prefix: String,
}

impl TokenCachePool {
    pub fn new(backend: Arc<dyn TokenCacheBackend>) -> Self {
        Self {
            backend,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    /// Pool over a fresh in-memory backend
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCacheBackend::new()))
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Cache key for a username
    pub fn cache_key(&self, username: &str) -> String {
        let digest = Sha256::digest(username.as_bytes());
        format!("{}{}", self.key_prefix, hex::encode(digest))
    }

    /// Store a token, expiring the entry when the token does.
    ///
    /// Overwrites any token already cached for the user. A token with no
    /// remaining lifetime is not stored.
    pub async fn set_token(&self, username: &str, token: &Token) -> Result<()> {
        let remaining = token.remaining_seconds();
        let key = self.cache_key(username);
        if remaining <= 0 {
            debug!(key = %key, "Not caching already expired token");
            return self.backend.delete(&key).await;
        }

        let value = serde_json::to_string(token)?;
        self.backend
            .set(&key, value, Duration::from_secs(remaining as u64))
            .await
    }

    /// Fetch the cached token, or [`Error::TokenNotFound`].
    pub async fn get_token(&self, username: &str) -> Result<Token> {
        let key = self.cache_key(username);
        match self.backend.get(&key).await? {
            Some(value) => Ok(serde_json::from_str(&value)?),
            None => Err(Error::TokenNotFound(username.to_string())),
        }
    }

    /// Remove the user's token immediately
    pub async fn delete_token(&self, username: &str) -> Result<()> {
        let key = self.cache_key(username);
        self.backend.delete(&key).await
    }
}
