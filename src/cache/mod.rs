//! Two-tier caching of cleaned content.
//!
//! - [`MemoryCache`] -- a bounded, process-local map consulted first.
//! - [`ExternalCache`] -- a shared, TTL-based backend consulted on a local
//!   miss. The crate ships [`NoopCache`] and, with the `fs-cache` feature,
//!   [`FsCache`].
//!
//! Implement [`ExternalCache`] to plug in your own backend.

#[cfg(feature = "fs-cache")]
mod fs;
mod key;
mod memory;

#[cfg(feature = "fs-cache")]
pub use fs::FsCache;
pub use key::CacheKey;
pub use memory::{CacheEntry, MemoryCache};

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Trait for shared cache backends.
///
/// Implementations must be `Send + Sync + 'static` so they can be used from
/// the background write-behind task. A read that fails is treated as a miss;
/// a write that fails is logged and otherwise ignored.
///
/// # Implementing a custom backend
///
/// ```rust,no_run
/// use std::time::Duration;
/// use word_cleaner::{ExternalCache, Result};
///
/// struct MyCache;
///
/// impl ExternalCache for MyCache {
///     async fn get(&self, key: &str) -> Result<Option<String>> {
///         Ok(None)
///     }
///     async fn set(&self, key: &str, content: &str, ttl: Duration) -> Result<()> {
///         Ok(())
///     }
///     async fn delete(&self, key: &str) -> Result<()> {
///         Ok(())
///     }
///     async fn flush(&self) -> Result<()> {
///         Ok(())
///     }
/// }
/// ```
pub trait ExternalCache: Send + Sync + 'static {
    /// The stored content for `key`, or `None` if absent or expired.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Store `content` under `key` for `ttl`.
    fn set(&self, key: &str, content: &str, ttl: Duration) -> impl Future<Output = Result<()>> + Send;

    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Remove every entry this backend holds.
    fn flush(&self) -> impl Future<Output = Result<()>> + Send;
}

/// An external tier that stores nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopCache;

impl ExternalCache for NoopCache {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _content: &str, _ttl: Duration) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Snapshot of cache counters.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub max_entries: usize,
    pub current_entries: usize,
    /// Lookups served from either tier.
    pub hits: u64,
    /// Lookups that ran the cleaning pipeline.
    pub misses: u64,
    /// `hits / (hits + misses)` as a percentage, two decimals.
    pub hit_rate: f64,
    pub version: String,
}

impl CacheStats {
    pub(crate) fn hit_rate(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total == 0 {
            return 0.0;
        }
        (hits as f64 / total as f64 * 10_000.0).round() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_is_a_rounded_percentage() {
        assert_eq!(CacheStats::hit_rate(0, 0), 0.0);
        assert_eq!(CacheStats::hit_rate(1, 2), 33.33);
        assert_eq!(CacheStats::hit_rate(3, 1), 75.0);
    }

    #[tokio::test]
    async fn noop_cache_never_hits() {
        let cache = NoopCache;
        cache.set("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
