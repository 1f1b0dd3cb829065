use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

/// The shared TTL-keyed store behind deduplication state, recent-log views,
/// and statistics buckets.
///
/// Every operation is a single bounded round trip. Mutations that would
/// otherwise need a read-then-write (counter bumps, push-and-trim) are
/// expressed as atomic primitives so concurrent producers never lose
/// updates. Implementations are best-effort: callers treat any `Err` as
/// degraded service, never as a reason to fail the instrumented request.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Round-trip liveness probe.
    async fn ping(&self) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Atomically increments a counter and refreshes its TTL. Returns the
    /// value after the increment (1 for a fresh key).
    async fn incr_ex(&self, key: &str, ttl_secs: u64) -> Result<i64>;

    /// Atomically increments a hash field. Returns the value after the
    /// increment.
    async fn hash_incr(&self, key: &str, field: &str, by: i64) -> Result<i64>;

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()>;

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>>;

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<()>;

    /// Prepends a value to a list, trims the list to `max_len`, and
    /// refreshes its TTL, all in one round trip.
    async fn list_push_trim(
        &self,
        key: &str,
        value: &str,
        max_len: usize,
        ttl_secs: u64,
    ) -> Result<()>;

    /// Returns list elements between `start` and `stop` (inclusive,
    /// newest-first).
    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;

    async fn delete(&self, key: &str) -> Result<()>;
}
