//! Builder for configuring a [`ContentCleaner`] and launching its cache writer.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{ExternalCache, NoopCache};
use crate::cleaner::{CacheSettings, ContentCleaner};
use crate::engine::Engine;
use crate::policy::PolicyStore;
use crate::worker::WriteBehind;

/// Builder for configuring and starting a [`ContentCleaner`].
///
/// Provides a fluent API for the cache tiers, the policy store, the
/// write-behind batching and the tree-processing switch.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use word_cleaner::{CleanerBuilder, FsCache, StaticPolicyStore, Switch};
///
/// # async fn example() {
/// let cleaner = CleanerBuilder::new()
///     .external_cache(FsCache::new("/tmp/word_cleaner"))
///     .policy_store(StaticPolicyStore::new().with_override("post", Switch::StripAllStyles, true))
///     .max_entries(500)
///     .external_ttl(Duration::from_secs(600))
///     .build();
///
/// let html = cleaner.clean(r#"<p class="MsoNormal">Hi</p>"#, "post", None).await;
/// cleaner.shutdown().await;
/// # }
/// ```
pub struct CleanerBuilder<C: ExternalCache = NoopCache> {
    external: C,
    policies: Option<Arc<dyn PolicyStore>>,
    max_entries: usize,
    cache_enabled: bool,
    external_ttl: Duration,
    external_timeout: Duration,
    version: String,
    tree_processing: bool,
    batch_size: usize,
    flush_interval: Duration,
    channel_buffer: usize,
    debug: bool,
}

impl Default for CleanerBuilder<NoopCache> {
    fn default() -> Self {
        Self::new()
    }
}

impl CleanerBuilder<NoopCache> {
    /// Create a builder with no external tier and sensible defaults.
    ///
    /// Defaults: 100 memory entries, caching on, external TTL 1 h, external
    /// read timeout 250 ms, version = crate version, tree processing on,
    /// batch size 50, flush interval 5 s, channel buffer 1000, debug off.
    pub fn new() -> Self {
        Self {
            external: NoopCache,
            policies: None,
            max_entries: 100,
            cache_enabled: true,
            external_ttl: Duration::from_secs(3600),
            external_timeout: Duration::from_millis(250),
            version: env!("CARGO_PKG_VERSION").to_string(),
            tree_processing: true,
            batch_size: 50,
            flush_interval: Duration::from_secs(5),
            channel_buffer: 1000,
            debug: false,
        }
    }
}

impl<C: ExternalCache> CleanerBuilder<C> {
    /// Use `cache` as the shared external tier.
    pub fn external_cache<D: ExternalCache>(self, cache: D) -> CleanerBuilder<D> {
        CleanerBuilder {
            external: cache,
            policies: self.policies,
            max_entries: self.max_entries,
            cache_enabled: self.cache_enabled,
            external_ttl: self.external_ttl,
            external_timeout: self.external_timeout,
            version: self.version,
            tree_processing: self.tree_processing,
            batch_size: self.batch_size,
            flush_interval: self.flush_interval,
            channel_buffer: self.channel_buffer,
            debug: self.debug,
        }
    }

    /// Where per-content-type switch overrides come from.
    pub fn policy_store(mut self, store: impl PolicyStore + 'static) -> Self {
        self.policies = Some(Arc::new(store));
        self
    }

    /// Memory-tier capacity, clamped to `10..=1000`.
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Lifetime of entries written to the external tier.
    pub fn external_ttl(mut self, ttl: Duration) -> Self {
        self.external_ttl = ttl;
        self
    }

    /// How long a read from the external tier may take before it counts as a miss.
    pub fn external_timeout(mut self, timeout: Duration) -> Self {
        self.external_timeout = timeout;
        self
    }

    /// Version string mixed into every cache key. Changing it invalidates
    /// everything cached under the old one.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Global switch for the tree path. Policies can only narrow it.
    pub fn tree_processing(mut self, enabled: bool) -> Self {
        self.tree_processing = enabled;
        self
    }

    /// Maximum number of external writes to batch before flushing.
    pub fn write_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Time after which queued external writes are flushed regardless of count.
    pub fn write_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Capacity of the channel between the cleaner and the cache writer.
    pub fn channel_buffer(mut self, size: usize) -> Self {
        self.channel_buffer = size;
        self
    }

    /// Log a [`ChangeReport`](crate::ChangeReport) for every cleaning run.
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Consume the builder, spawn the external-cache writer, and return the
    /// [`ContentCleaner`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn build(self) -> ContentCleaner<C> {
        let (tx, rx) = tokio::sync::mpsc::channel(self.channel_buffer.max(1));
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let external = Arc::new(self.external);

        let writer = WriteBehind {
            ttl: self.external_ttl,
            batch_size: self.batch_size.max(1),
            flush_interval: self.flush_interval.max(Duration::from_millis(1)),
        };
        let worker_handle = tokio::spawn(writer.run(rx, shutdown_rx, Arc::clone(&external)));

        ContentCleaner::new(
            Engine::new(self.tree_processing),
            self.policies,
            external,
            CacheSettings {
                max_entries: self.max_entries,
                enabled: self.cache_enabled,
                external_timeout: self.external_timeout,
                version: self.version,
            },
            self.debug,
            tx,
            shutdown_tx,
            worker_handle,
        )
    }
}
