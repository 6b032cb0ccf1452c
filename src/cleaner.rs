//! The cached, async front door to the cleaning engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::cache::{CacheKey, CacheStats, ExternalCache, MemoryCache, NoopCache};
use crate::engine::Engine;
use crate::error::{CleanerError, Result};
use crate::fields::Field;
use crate::policy::{CleaningPolicy, PolicyStore, resolve_policy};
use crate::report::ChangeReport;
use crate::worker::PendingWrite;

pub(crate) struct CacheSettings {
    pub max_entries: usize,
    pub enabled: bool,
    pub external_timeout: Duration,
    pub version: String,
}

/// Cleans Word markup out of HTML, caching results in two tiers.
///
/// Created by [`CleanerBuilder::build`](crate::CleanerBuilder::build). Every
/// cleaning entry point is infallible: when anything goes wrong internally
/// the input comes back unchanged.
///
/// Lookups go to the process-local [`MemoryCache`] first, then the external
/// tier (bounded by a timeout). Results are stored in memory immediately and
/// written to the external tier by a background task; call
/// [`shutdown`](Self::shutdown) to flush pending writes.
pub struct ContentCleaner<C: ExternalCache = NoopCache> {
    engine: Engine,
    policies: Option<Arc<dyn PolicyStore>>,
    memory: MemoryCache,
    external: Arc<C>,
    enabled: AtomicBool,
    external_timeout: Duration,
    version: String,
    hits: AtomicU64,
    misses: AtomicU64,
    debug: bool,
    writes: mpsc::Sender<PendingWrite>,
    shutdown: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl<C: ExternalCache> ContentCleaner<C> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        engine: Engine,
        policies: Option<Arc<dyn PolicyStore>>,
        external: Arc<C>,
        settings: CacheSettings,
        debug: bool,
        writes: mpsc::Sender<PendingWrite>,
        shutdown: oneshot::Sender<()>,
        worker: JoinHandle<()>,
    ) -> Self {
        Self {
            engine,
            policies,
            memory: MemoryCache::new(settings.max_entries),
            external,
            enabled: AtomicBool::new(settings.enabled),
            external_timeout: settings.external_timeout,
            version: settings.version,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            debug,
            writes,
            shutdown: Some(shutdown),
            worker: Some(worker),
        }
    }

    /// Defaults for `content_type` with any stored overrides applied.
    pub fn resolve_policy(&self, content_type: &str) -> CleaningPolicy {
        resolve_policy(content_type, self.policies.as_deref())
    }

    /// Clean `content` as `content_type`.
    ///
    /// `policy_override` replaces the resolved policy entirely. Content with
    /// no Word markup (and no excerpt stripping) never touches the cache.
    pub async fn clean(&self, content: &str, content_type: &str, policy_override: Option<&CleaningPolicy>) -> String {
        let policy = policy_override
            .copied()
            .unwrap_or_else(|| self.resolve_policy(content_type));

        if content.is_empty() || !Engine::needs_cleaning(content, &policy) {
            return self.engine.clean(content, content_type, &policy);
        }
        if !self.is_cache_enabled() {
            return self.run_engine(content, content_type, &policy);
        }

        let key = self.cache_key(content, content_type, &policy);
        if let Some(hit) = self.memory.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Memory cache hit for {key}");
            return hit;
        }
        if let Some(hit) = self.external_get(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("External cache hit for {key}");
            self.memory.insert(key, hit.clone());
            return hit;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let cleaned = self.run_engine(content, content_type, &policy);
        if cleaned != content {
            self.memory.insert(key.clone(), cleaned.clone());
            self.persist_or_log(PendingWrite {
                key,
                content: cleaned.clone(),
            });
        }
        cleaned
    }

    /// Clean a post excerpt: every tag is removed.
    pub async fn clean_excerpt(&self, content: &str) -> String {
        self.clean(content, "excerpt", None).await
    }

    /// Clean every text leaf of `field` in place, each as its own content type.
    pub async fn clean_fields(&self, field: &mut Field) {
        for (content_type, value) in field.leaves_mut() {
            let cleaned = self.clean(value, content_type, None).await;
            *value = cleaned;
        }
    }

    /// Run the pipeline without consulting or filling either cache tier.
    pub fn clean_uncached(&self, content: &str, content_type: &str, policy_override: Option<&CleaningPolicy>) -> String {
        let policy = policy_override
            .copied()
            .unwrap_or_else(|| self.resolve_policy(content_type));
        self.run_engine(content, content_type, &policy)
    }

    /// The key `content` would be cached under.
    pub fn cache_key(&self, content: &str, content_type: &str, policy: &CleaningPolicy) -> CacheKey {
        CacheKey::derive(content, policy, content_type, &self.version)
    }

    fn run_engine(&self, content: &str, content_type: &str, policy: &CleaningPolicy) -> String {
        let outcome = self.engine.clean_detailed(content, content_type, policy);
        tracing::debug!("Cleaned {} bytes of {content_type} via {}", content.len(), outcome.path);
        if self.debug {
            ChangeReport::analyze(content, &outcome.content).log(content_type);
        }
        outcome.content
    }

    async fn external_get(&self, key: &CacheKey) -> Option<String> {
        match tokio::time::timeout(self.external_timeout, self.external.get(key.as_str())).await {
            Ok(Ok(hit)) => hit,
            Ok(Err(e)) => {
                tracing::warn!("External cache read for {key} failed: {e}");
                None
            }
            Err(_) => {
                tracing::warn!("External cache read for {key} failed: {}", CleanerError::CacheTimeout);
                None
            }
        }
    }

    fn persist(&self, write: PendingWrite) -> Result<()> {
        self.writes
            .try_send(write)
            .map_err(|_| CleanerError::ChannelClosed)
    }

    fn persist_or_log(&self, write: PendingWrite) {
        if let Err(e) = self.persist(write) {
            tracing::error!("Failed to queue cache write: {e}");
        }
    }

    /// Remove one cached result from both tiers.
    pub async fn invalidate(&self, key: &CacheKey) {
        self.memory.remove(key);
        if let Err(e) = self.external.delete(key.as_str()).await {
            tracing::warn!("External cache delete for {key} failed: {e}");
        }
    }

    /// Empty both tiers.
    pub async fn clear_cache(&self) {
        self.memory.clear();
        if let Err(e) = self.external.flush().await {
            tracing::warn!("External cache flush failed: {e}");
        }
        tracing::info!("Cache cleared");
    }

    /// Drop memory entries older than `max_age`, returning how many went.
    pub fn cleanup_expired(&self, max_age: Duration) -> usize {
        let removed = self.memory.remove_older_than(max_age);
        if removed > 0 {
            tracing::debug!("Removed {removed} expired cache entries");
        }
        removed
    }

    pub fn is_cache_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Turn caching on or off. Turning it off also empties the memory tier.
    pub fn set_cache_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        if !enabled {
            self.memory.clear();
        }
    }

    /// Change the memory-tier capacity (clamped to `10..=1000`).
    pub fn set_max_entries(&self, max_entries: usize) {
        self.memory.set_max_entries(max_entries);
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStats {
            enabled: self.is_cache_enabled(),
            max_entries: self.memory.max_entries(),
            current_entries: self.memory.len(),
            hits,
            misses,
            hit_rate: CacheStats::hit_rate(hits, misses),
            version: self.version.clone(),
        }
    }

    /// Gracefully shut down the cache writer.
    ///
    /// Sends a shutdown signal, waits for the writer to drain any queued
    /// writes and flush the final batch, then returns.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.worker.take() {
            let _ = handle.await;
        }
    }
}
