//! Read-through cache layer over the existing projections.
//!
//! For each read operation: build a cache key from the operation name plus
//! normalized parameters, check the cache, and on a miss fall through to the
//! projection/read-model query with an explicit tenant filter before caching
//! the encoded result with a type-specific TTL.

use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use forgeerp_core::TenantId;

use crate::cache::{Cache, CacheError};

/// TTL for cached list responses.
pub const LIST_TTL: Duration = Duration::from_secs(30);
/// TTL for cached single-entity detail responses.
pub const DETAIL_TTL: Duration = Duration::from_secs(5 * 60);
/// TTL for the credit-utilization projection, which changes more often than
/// a typical detail view but is expensive enough to still warrant caching.
pub const CREDIT_UTILIZATION_TTL: Duration = Duration::from_secs(60);

/// Default/maximum page size for list operations (spec: default 20, max 200).
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 200;

/// Normalized, clamped pagination/sort parameters for a list operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub page_size: u32,
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl ListQuery {
    /// Build a normalized query from raw, possibly-absent/out-of-range input.
    ///
    /// `page < 1` clamps to 1; `page_size` above `max_page_size` clamps down
    /// to it; `page_size == 0` falls back to the default.
    pub fn normalize(
        page: Option<i64>,
        page_size: Option<i64>,
        sort_by: Option<String>,
        sort_order: Option<&str>,
        max_page_size: u32,
    ) -> Self {
        let page = page.filter(|p| *p >= 1).unwrap_or(1) as u32;
        let page_size = match page_size {
            Some(p) if p >= 1 => (p as u32).min(max_page_size),
            _ => DEFAULT_PAGE_SIZE.min(max_page_size),
        };
        let sort_order = match sort_order.map(|s| s.to_ascii_lowercase()) {
            Some(s) if s == "desc" => SortOrder::Desc,
            _ => SortOrder::Asc,
        };

        Self {
            page,
            page_size,
            sort_by,
            sort_order,
        }
    }

    /// Stable cache-key fragment for this query (sorted, deterministic).
    pub fn cache_fragment(&self) -> String {
        format!(
            "page={}&page_size={}&sort_by={}&sort_order={}",
            self.page,
            self.page_size,
            self.sort_by.as_deref().unwrap_or(""),
            match self.sort_order {
                SortOrder::Asc => "asc",
                SortOrder::Desc => "desc",
            }
        )
    }

    /// Slice `items` (assumed already sorted) into this query's page.
    pub fn paginate<T>(&self, items: Vec<T>) -> PagedResult<T> {
        let total = items.len() as u64;
        let start = ((self.page - 1) as usize).saturating_mul(self.page_size as usize);
        let end = start.saturating_add(self.page_size as usize).min(items.len());
        let page_items = if start >= items.len() {
            Vec::new()
        } else {
            items[start..end].to_vec()
        };

        PagedResult {
            items: page_items,
            total,
            page: self.page,
            page_size: self.page_size,
        }
    }
}

impl Default for ListQuery {
    fn default() -> Self {
        Self::normalize(None, None, None, None, MAX_PAGE_SIZE)
    }
}

/// A page of results plus enough metadata for the caller to build the
/// `{items, total, page, pageSize}` response envelope.
#[derive(Debug, Clone)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

/// Build a cache key from an operation name and a normalized parameter
/// fragment, e.g. `list:parties.party:<tenantId>:page=1&page_size=20&...`.
pub fn list_cache_key(operation: &str, tenant_id: TenantId, query: &ListQuery) -> String {
    format!("list:{operation}:{tenant_id}:{}", query.cache_fragment())
}

/// Build a cache key for a single-entity detail lookup, e.g.
/// `entity:parties.party:<tenantId>:<id>`.
pub fn entity_cache_key(operation: &str, tenant_id: TenantId, id: impl std::fmt::Display) -> String {
    format!("entity:{operation}:{tenant_id}:{id}")
}

/// Glob pattern matching every cached list for one operation/tenant, used to
/// invalidate all list caches for an aggregate family after a write.
pub fn list_cache_pattern(operation: &str, tenant_id: TenantId) -> String {
    format!("list:{operation}:{tenant_id}:*")
}

/// Read `key` from `cache` and decode it as `T`; any miss or decode failure
/// is treated as a cache miss (never surfaced as an error — the caller falls
/// through to the source of truth).
fn read_cached<T: DeserializeOwned>(cache: &dyn Cache, key: &str) -> Option<T> {
    match cache.get(key) {
        Ok(Some(bytes)) => serde_json::from_slice(&bytes).ok(),
        Ok(None) => None,
        Err(_) => None,
    }
}

fn write_cached<T: Serialize>(cache: &dyn Cache, key: &str, value: &T, ttl: Duration) {
    if let Ok(bytes) = serde_json::to_vec(value) {
        // A cache write failure only costs a future avoidable projection
        // query; the projection itself is the source of truth.
        let _ = cache.set(key, bytes, ttl);
    }
}

/// Read-through cache wrapper: on a cache hit, return the decoded value
/// without calling `compute`; on a miss (or malformed cache payload),
/// compute fresh, cache it with `ttl`, and return it.
pub fn get_or_compute<T, F>(cache: &dyn Cache, key: &str, ttl: Duration, compute: F) -> Result<T, CacheError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<T, CacheError>,
{
    if let Some(cached) = read_cached::<T>(cache, key) {
        return Ok(cached);
    }

    let value = compute()?;
    write_cached(cache, key, &value, ttl);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;

    #[test]
    fn page_below_one_clamps_to_one() {
        let q = ListQuery::normalize(Some(-5), Some(20), None, None, MAX_PAGE_SIZE);
        assert_eq!(q.page, 1);
    }

    #[test]
    fn page_size_above_max_clamps_down() {
        let q = ListQuery::normalize(Some(1), Some(10_000), None, None, MAX_PAGE_SIZE);
        assert_eq!(q.page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn page_size_defaults_when_absent() {
        let q = ListQuery::normalize(Some(1), None, None, None, MAX_PAGE_SIZE);
        assert_eq!(q.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn paginate_slices_correct_window() {
        let q = ListQuery::normalize(Some(2), Some(3), None, None, MAX_PAGE_SIZE);
        let items: Vec<i32> = (1..=10).collect();
        let paged = q.paginate(items);
        assert_eq!(paged.items, vec![4, 5, 6]);
        assert_eq!(paged.total, 10);
        assert_eq!(paged.page, 2);
        assert_eq!(paged.page_size, 3);
    }

    #[test]
    fn paginate_past_the_end_is_empty() {
        let q = ListQuery::normalize(Some(99), Some(10), None, None, MAX_PAGE_SIZE);
        let items: Vec<i32> = (1..=10).collect();
        let paged = q.paginate(items);
        assert!(paged.items.is_empty());
        assert_eq!(paged.total, 10);
    }

    #[test]
    fn get_or_compute_caches_after_miss() {
        let cache = InMemoryCache::new();
        let key = "entity:test:tenant:1";
        let mut calls = 0;

        let first: i32 = get_or_compute(&cache, key, DETAIL_TTL, || {
            calls += 1;
            Ok(42)
        })
        .unwrap();
        assert_eq!(first, 42);
        assert_eq!(calls, 1);

        let second: i32 = get_or_compute(&cache, key, DETAIL_TTL, || {
            calls += 1;
            Ok(7)
        })
        .unwrap();
        assert_eq!(second, 42, "second call should be served from cache, not recomputed");
        assert_eq!(calls, 1);
    }
}
