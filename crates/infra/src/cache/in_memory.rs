use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{Cache, CacheError, DistributedLock, RateLimitDecision, RateLimiter};

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-memory `Cache` for tests and single-process dev deployments.
///
/// Expired entries are only reaped lazily on access, matching the teacher's
/// `InMemoryEventStore`/`InMemoryTenantStore` style of never running a
/// background sweep of its own.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cache for InMemoryCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().expect("cache mutex poisoned").remove(key);
        Ok(())
    }

    fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let prefix = pattern.trim_end_matches('*');
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        let matching: Vec<String> = entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        let removed = matching.len() as u64;
        for key in matching {
            entries.remove(&key);
        }
        Ok(removed)
    }
}

struct LockEntry {
    expires_at: Instant,
}

/// In-memory `DistributedLock`. Only useful within a single process — real
/// cross-instance locking requires the Redis-backed implementation.
#[derive(Default)]
pub struct InMemoryDistributedLock {
    held: Mutex<HashMap<String, LockEntry>>,
}

impl InMemoryDistributedLock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DistributedLock for InMemoryDistributedLock {
    fn try_lock(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut held = self.held.lock().expect("lock mutex poisoned");
        let now = Instant::now();
        if let Some(entry) = held.get(key) {
            if entry.expires_at > now {
                return Ok(false);
            }
        }
        held.insert(key.to_string(), LockEntry { expires_at: now + ttl });
        Ok(true)
    }

    fn unlock(&self, key: &str) -> Result<(), CacheError> {
        self.held.lock().expect("lock mutex poisoned").remove(key);
        Ok(())
    }
}

struct Window {
    count: u32,
    window_start: Instant,
}

/// In-memory fixed-window `RateLimiter`.
///
/// Uses a fixed window rather than a true sliding log — adequate for dev/test
/// and for the single-process deployment profile this implementation targets.
/// The Redis-backed implementation uses a sorted-set sliding window instead.
#[derive(Default)]
pub struct InMemoryRateLimiter {
    windows: Mutex<HashMap<String, Window>>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimiter for InMemoryRateLimiter {
    fn check(&self, identifier: &str, limit: u32, window: Duration) -> Result<RateLimitDecision, CacheError> {
        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");
        let now = Instant::now();
        let entry = windows.entry(identifier.to_string()).or_insert_with(|| Window {
            count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) >= window {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;
        if entry.count > limit {
            Ok(RateLimitDecision::Deny)
        } else {
            Ok(RateLimitDecision::Allow)
        }
    }
}
