//! Tenant-prefixed cache, distributed lock, and sliding-window rate limiter.
//!
//! These three concerns share one module because they share one operational
//! profile: small, short-lived values, single round trip per call, and a
//! Redis-backed implementation alongside an in-memory one for tests/dev —
//! the same dual-implementation shape already used by the event store and
//! event bus in this crate.

mod in_memory;
#[cfg(feature = "redis")]
mod redis_backed;

pub use in_memory::{InMemoryCache, InMemoryDistributedLock, InMemoryRateLimiter};
#[cfg(feature = "redis")]
pub use redis_backed::{RedisCache, RedisDistributedLock, RedisRateLimiter};

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("value serialization failed: {0}")]
    Serialization(String),
}

/// Tenant-prefixed string/blob cache.
///
/// Callers are responsible for prefixing keys with the tenant database name
/// (e.g. `<tenantId>:entity:<aggregateId>`) — the cache itself is tenant-agnostic
/// so it can also serve the idempotency cache and session store, neither of
/// which are naturally tenant/aggregate keyed the same way read models are.
pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;
    fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Delete every key matching a glob pattern (e.g. `list:invoicing.invoice:<tenantId>:*`).
    ///
    /// Implementations MUST use a cursor scan rather than a blocking key-space
    /// scan, so a large cache never stalls the server on a pattern delete.
    /// Returns the number of keys removed.
    fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError>;
}

impl<C: Cache + ?Sized> Cache for Arc<C> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        (**self).set(key, value, ttl)
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        (**self).delete(key)
    }

    fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        (**self).delete_pattern(pattern)
    }
}

/// Set-if-absent lock with a TTL bound on how long a crashed holder can block others.
///
/// No fencing token is issued: critical sections guarded by this lock must stay
/// well under the TTL (see the `MergeParties` saga, the one user of this trait
/// in this codebase).
pub trait DistributedLock: Send + Sync {
    /// Attempt to acquire `key`. Returns `true` if the lock was acquired.
    fn try_lock(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Unconditionally release `key`. Safe to call even if the lock already expired.
    fn unlock(&self, key: &str) -> Result<(), CacheError>;
}

impl<L: DistributedLock + ?Sized> DistributedLock for Arc<L> {
    fn try_lock(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        (**self).try_lock(key, ttl)
    }

    fn unlock(&self, key: &str) -> Result<(), CacheError> {
        (**self).unlock(key)
    }
}

/// Outcome of a rate-limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allow,
    Deny,
}

impl RateLimitDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, RateLimitDecision::Allow)
    }
}

/// Sliding-window rate limiter keyed by an arbitrary identifier
/// (`"login:<tenantId>:<email>"`, `"api:<tenantId>:<principalId>"`, ...).
pub trait RateLimiter: Send + Sync {
    /// Record one call for `identifier` and report whether it is within `limit`
    /// calls per rolling `window`. Implementations perform the add/trim/count/
    /// expire sequence as a single round trip where the backend allows it.
    fn check(&self, identifier: &str, limit: u32, window: Duration) -> Result<RateLimitDecision, CacheError>;
}

impl<R: RateLimiter + ?Sized> RateLimiter for Arc<R> {
    fn check(&self, identifier: &str, limit: u32, window: Duration) -> Result<RateLimitDecision, CacheError> {
        (**self).check(identifier, limit, window)
    }
}
