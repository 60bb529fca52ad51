//! Mutual exclusion around sign-in and sign-out
//!
//! mpx limits how many sessions an account may hold at once, so workers that
//! share credentials must not sign in concurrently. [`LocalLock`] covers a
//! single process; [`RedisLock`] covers every process sharing a redis server.

use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

/// Extra TTL on top of the identity calls a refresh makes
const REFRESH_TTL_MARGIN: Duration = Duration::from_secs(30);

/// Deletes the key only while `owner` still holds it
const RELEASE_SCRIPT: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        redis.call("DEL", KEYS[1])
        return 1
    else
        return 0
    end
"#;

/// Gives back a lease held in an external store
#[async_trait]
pub trait LeaseReleaser: Send + Sync + fmt::Debug {
    /// Release `key` if `owner` still holds it. `false` means the lease had already lapsed.
    async fn release(&self, key: &str, owner: &str) -> Result<bool>;
}

/// A held lock.
///
/// Dropping a lease releases it, including when the future holding it is
/// cancelled. Remote leases are released on a spawned task in that case.
pub struct LockLease {
    key: String,
    owner: String,
    guard: Option<OwnedMutexGuard<()>>,
    releaser: Option<Arc<dyn LeaseReleaser>>,
}

impl LockLease {
    /// A lease backed by an in-process mutex guard
    pub fn local(key: impl Into<String>, guard: OwnedMutexGuard<()>) -> Self {
        Self {
            key: key.into(),
            owner: "local".to_string(),
            guard: Some(guard),
            releaser: None,
        }
    }

    /// A lease that `releaser` gives back on release or drop
    pub fn remote(key: impl Into<String>, owner: impl Into<String>, releaser: Arc<dyn LeaseReleaser>) -> Self {
        Self {
            key: key.into(),
            owner: owner.into(),
            guard: None,
            releaser: Some(releaser),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Release now and wait for the store to confirm
    pub async fn release(mut self) -> Result<()> {
        self.guard.take();
        if let Some(releaser) = self.releaser.clone() {
            let released = releaser.release(&self.key, &self.owner).await;
            // Released or failed, either way drop must not try again
            self.releaser = None;
            log_release(&self.key, released?);
        }
        Ok(())
    }
}

fn log_release(key: &str, released: bool) {
    if released {
        debug!(key = %key, "Released session lock");
    } else {
        warn!(key = %key, "Session lock expired before release");
    }
}

impl Drop for LockLease {
    fn drop(&mut self) {
        let Some(releaser) = self.releaser.take() else {
            return;
        };
        let key = std::mem::take(&mut self.key);
        let owner = std::mem::take(&mut self.owner);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match releaser.release(&key, &owner).await {
                        Ok(released) => log_release(&key, released),
                        Err(e) => warn!(key = %key, error = %e, "Failed to release dropped session lock"),
                    }
                });
            }
            Err(_) => {
                warn!(key = %key, "No runtime to release dropped session lock, it lapses at its TTL");
            }
        }
    }
}

impl fmt::Debug for LockLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockLease")
            .field("key", &self.key)
            .field("owner", &self.owner)
            .finish()
    }
}

/// Lock guarding the acquire-or-refresh sequence
#[async_trait]
pub trait SessionLock: Send + Sync + fmt::Debug {
    /// Wait for and take the lock for `key`.
    async fn acquire(&self, key: &str) -> Result<LockLease>;

    /// Give the lock back.
    async fn release(&self, lease: LockLease) -> Result<()> {
        lease.release().await
    }
}

/// In-process lock, one mutex per key
#[derive(Debug, Default)]
pub struct LocalLock {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LocalLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionLock for LocalLock {
    async fn acquire(&self, key: &str) -> Result<LockLease> {
        let mutex = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = mutex.lock_owned().await;
        Ok(LockLease::local(key, guard))
    }
}

/// Configuration for [`RedisLock`]
#[derive(Debug, Clone)]
pub struct RedisLockConfig {
    /// Redis connection URL
    pub redis_url: String,

    /// Prefix prepended to every lock key
    pub key_prefix: String,

    /// Lock TTL, the longest a crashed holder can block others.
    ///
    /// Must outlast a whole refresh (sign-out then sign-in), otherwise a slow
    /// identity service lets a second process in mid-refresh.
    pub ttl: Duration,

    /// Give up waiting after this long
    pub wait_timeout: Duration,

    /// Delay between acquisition attempts
    pub retry_interval: Duration,
}

impl Default for RedisLockConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "mpx:lock:".to_string(),
            ttl: Self::ttl_covering(crate::config::DEFAULT_TIMEOUT),
            wait_timeout: Duration::from_secs(60),
            retry_interval: Duration::from_millis(100),
        }
    }
}

impl RedisLockConfig {
    pub fn new(redis_url: String) -> Self {
        Self {
            redis_url,
            ..Default::default()
        }
    }

    /// Smallest TTL that covers two identity calls of `request_timeout` each
    pub fn ttl_covering(request_timeout: Duration) -> Duration {
        request_timeout * 2 + REFRESH_TTL_MARGIN
    }

    pub fn with_key_prefix(mut self, prefix: String) -> Self {
        self.key_prefix = prefix;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Raise the TTL, if needed, to cover a refresh at this request timeout
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.ttl = self.ttl.max(Self::ttl_covering(request_timeout));
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }
}

/// Runs the compare-and-delete release script
#[derive(Clone)]
struct RedisLeaseReleaser {
    conn: ConnectionManager,
}

impl fmt::Debug for RedisLeaseReleaser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisLeaseReleaser").finish_non_exhaustive()
    }
}

#[async_trait]
impl LeaseReleaser for RedisLeaseReleaser {
    async fn release(&self, key: &str, owner: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let released: i32 = redis::Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(owner)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Error::Lock(e.to_string()))?;
        Ok(released == 1)
    }
}

/// Cross-process lock using redis `SET NX PX`
pub struct RedisLock {
    config: RedisLockConfig,
    conn: ConnectionManager,
    releaser: Arc<RedisLeaseReleaser>,
}

impl RedisLock {
    /// Connect to redis
    pub async fn new(config: RedisLockConfig) -> Result<Self> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| Error::Lock(format!("redis connection: {}", e)))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::Lock(format!("redis connection: {}", e)))?;
        let releaser = Arc::new(RedisLeaseReleaser { conn: conn.clone() });

        Ok(Self {
            config,
            conn,
            releaser,
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    async fn try_acquire(&self, key: &str, owner: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        // SET key owner NX PX millis
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(owner)
            .arg("NX")
            .arg("PX")
            .arg(self.config.ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Lock(e.to_string()))?;

        Ok(result.is_some())
    }
}

impl fmt::Debug for RedisLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisLock")
            .field("key_prefix", &self.config.key_prefix)
            .field("ttl", &self.config.ttl)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SessionLock for RedisLock {
    async fn acquire(&self, key: &str) -> Result<LockLease> {
        let full_key = self.full_key(key);
        let owner = Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.config.wait_timeout;

        loop {
            if self.try_acquire(&full_key, &owner).await? {
                debug!(key = %full_key, owner = %owner, "Acquired session lock");
                return Ok(LockLease::remote(full_key, owner, self.releaser.clone()));
            }

            if Instant::now() >= deadline {
                return Err(Error::Lock(format!(
                    "timed out after {:?} waiting for {}",
                    self.config.wait_timeout, full_key
                )));
            }

            tokio::time::sleep(self.config.retry_interval).await;
        }
    }
}
