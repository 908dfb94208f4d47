//! Redis-backed `Cache`, `DistributedLock`, and `RateLimiter`.
//!
//! Mirrors the raw-command style of `RedisStreamsEventBus`: a cheap
//! `redis::Client` held behind `Arc`, a fresh connection pulled per call via
//! `get_connection()`, and hand-built `redis::cmd(...)` invocations rather
//! than the higher-level typed helpers, so every round trip is visible.

use std::time::Duration;

use tracing::instrument;

use super::{Cache, CacheError, DistributedLock, RateLimitDecision, RateLimiter};

#[derive(Debug, Clone)]
pub struct RedisCache {
    client: std::sync::Arc<redis::Client>,
    prefix: String,
}

impl RedisCache {
    pub fn new(redis_url: impl AsRef<str>, prefix: impl Into<String>) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(Self {
            client: std::sync::Arc::new(client),
            prefix: prefix.into(),
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }
}

impl Cache for RedisCache {
    #[instrument(skip(self), fields(key = %key), err)]
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(self.full_key(key))
            .query(&mut conn)
            .map_err(|e| CacheError::Unavailable(format!("GET failed: {e}")))?;

        Ok(value)
    }

    #[instrument(skip(self, value), fields(key = %key, ttl_secs = ttl.as_secs()), err)]
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        let _: () = redis::cmd("SET")
            .arg(self.full_key(key))
            .arg(value)
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query(&mut conn)
            .map_err(|e| CacheError::Unavailable(format!("SET failed: {e}")))?;

        Ok(())
    }

    #[instrument(skip(self), fields(key = %key), err)]
    fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        let _: i64 = redis::cmd("DEL")
            .arg(self.full_key(key))
            .query(&mut conn)
            .map_err(|e| CacheError::Unavailable(format!("DEL failed: {e}")))?;

        Ok(())
    }

    #[instrument(skip(self), fields(pattern = %pattern), err)]
    fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        let scan_pattern = self.full_key(pattern);
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&scan_pattern)
                .arg("COUNT")
                .arg(200)
                .query(&mut conn)
                .map_err(|e| CacheError::Unavailable(format!("SCAN failed: {e}")))?;

            if !keys.is_empty() {
                let deleted: i64 = redis::cmd("DEL")
                    .arg(&keys)
                    .query(&mut conn)
                    .map_err(|e| CacheError::Unavailable(format!("DEL failed: {e}")))?;
                removed += deleted as u64;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(removed)
    }
}

#[derive(Debug, Clone)]
pub struct RedisDistributedLock {
    client: std::sync::Arc<redis::Client>,
    prefix: String,
}

impl RedisDistributedLock {
    pub fn new(redis_url: impl AsRef<str>, prefix: impl Into<String>) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(Self {
            client: std::sync::Arc::new(client),
            prefix: prefix.into(),
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:lock:{}", self.prefix, key)
    }
}

impl DistributedLock for RedisDistributedLock {
    #[instrument(skip(self), fields(key = %key, ttl_secs = ttl.as_secs()), err)]
    fn try_lock(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        // SET key value NX PX ttl_ms: succeeds only if the key is absent.
        let acquired: Option<String> = redis::cmd("SET")
            .arg(self.full_key(key))
            .arg("1")
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query(&mut conn)
            .map_err(|e| CacheError::Unavailable(format!("SET NX failed: {e}")))?;

        Ok(acquired.is_some())
    }

    #[instrument(skip(self), fields(key = %key), err)]
    fn unlock(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        let _: i64 = redis::cmd("DEL")
            .arg(self.full_key(key))
            .query(&mut conn)
            .map_err(|e| CacheError::Unavailable(format!("DEL failed: {e}")))?;

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RedisRateLimiter {
    client: std::sync::Arc<redis::Client>,
    prefix: String,
}

impl RedisRateLimiter {
    pub fn new(redis_url: impl AsRef<str>, prefix: impl Into<String>) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(Self {
            client: std::sync::Arc::new(client),
            prefix: prefix.into(),
        })
    }

    fn full_key(&self, identifier: &str) -> String {
        format!("{}:ratelimit:{}", self.prefix, identifier)
    }
}

impl RateLimiter for RedisRateLimiter {
    /// Sliding-window check backed by a sorted set: one member per call,
    /// scored by its arrival timestamp in milliseconds. Each call trims
    /// entries older than the window, adds itself, then counts survivors —
    /// no Lua script, so this is three round trips rather than one atomic op.
    #[instrument(skip(self), fields(identifier = %identifier, limit, window_secs = window.as_secs()), err)]
    fn check(&self, identifier: &str, limit: u32, window: Duration) -> Result<RateLimitDecision, CacheError> {
        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        let key = self.full_key(identifier);
        let now_ms = chrono::Utc::now().timestamp_millis();
        let window_start = now_ms - window.as_millis() as i64;

        let _: i64 = redis::cmd("ZREMRANGEBYSCORE")
            .arg(&key)
            .arg("-inf")
            .arg(window_start)
            .query(&mut conn)
            .map_err(|e| CacheError::Unavailable(format!("ZREMRANGEBYSCORE failed: {e}")))?;

        let member = format!("{now_ms}-{}", uuid::Uuid::new_v4());
        let _: i64 = redis::cmd("ZADD")
            .arg(&key)
            .arg(now_ms)
            .arg(&member)
            .query(&mut conn)
            .map_err(|e| CacheError::Unavailable(format!("ZADD failed: {e}")))?;

        let _: i64 = redis::cmd("PEXPIRE")
            .arg(&key)
            .arg(window.as_millis() as u64)
            .query(&mut conn)
            .map_err(|e| CacheError::Unavailable(format!("PEXPIRE failed: {e}")))?;

        let count: u32 = redis::cmd("ZCARD")
            .arg(&key)
            .query(&mut conn)
            .map_err(|e| CacheError::Unavailable(format!("ZCARD failed: {e}")))?;

        if count > limit {
            Ok(RateLimitDecision::Deny)
        } else {
            Ok(RateLimitDecision::Allow)
        }
    }
}
