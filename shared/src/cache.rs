//! Key/value cache used for cache-aside reads. Values are opaque strings;
//! callers decide the encoding.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use thiserror::Error;
use tokio::sync::{OnceCell, RwLock};
use tracing::info;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Backend(err.to_string())
    }
}

#[async_trait]
pub trait Cache: Send + Sync {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// `Ok(None)` on a miss.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
}

/// Bound on connecting and on each command when none is configured.
pub const DEFAULT_REDIS_TIMEOUT: Duration = Duration::from_secs(2);

/// Redis cache. Concurrent writers to one key are last-writer-wins.
///
/// The connection is opened on first use and retried on later calls until
/// it succeeds, so an unreachable server turns into per-call
/// [`CacheError::Backend`] errors rather than a startup failure.
pub struct RedisCache {
    client: Client,
    conn: OnceCell<ConnectionManager>,
    timeout: Duration,
    key_prefix: String,
}

impl RedisCache {
    /// Parses `url`; no connection is attempted yet.
    pub fn new(url: &str, key_prefix: &str, timeout: Duration) -> Result<Self, CacheError> {
        Ok(Self {
            client: Client::open(url)?,
            conn: OnceCell::new(),
            timeout,
            key_prefix: key_prefix.to_string(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let conn = self
                    .bounded("connect", ConnectionManager::new(self.client.clone()))
                    .await?;
                info!("connected to redis");
                Ok::<_, CacheError>(conn)
            })
            .await?;
        Ok(conn.clone())
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CacheError::Backend(format!(
                "redis {op} timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let key = self.key(key);
        self.bounded::<(), _>("set", conn.set_ex(key, value, ttl.as_secs().max(1)))
            .await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        let key = self.key(key);
        self.bounded::<Option<String>, _>("get", conn.get(key)).await
    }
}

/// Process-local cache with expiry, for tests and single-node runs.
#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
    fail: AtomicBool,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail, to exercise the fallback paths.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Stores a raw value, bypassing any encoding the caller would apply.
    pub async fn put_raw(&self, key: &str, value: &str, ttl: Duration) {
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|(_, expires)| *expires > now)
            .count()
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CacheError::Backend("cache unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.check()?;
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check()?;
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}
