//! Write-behind persistence for the external cache tier.
//!
//! Cleaned results are queued by [`ContentCleaner`](crate::ContentCleaner)
//! and written here in batches, so a slow backend never sits on the
//! cleaning path. Writes for the same key inside one batch collapse to the
//! latest one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};

use crate::cache::{CacheKey, ExternalCache};

/// One queued external-cache write.
#[derive(Debug)]
pub(crate) struct PendingWrite {
    pub key: CacheKey,
    pub content: String,
}

pub(crate) struct WriteBehind {
    pub ttl: Duration,
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl WriteBehind {
    /// Consume queued writes until `shutdown_rx` fires, then persist what is
    /// left in the queue and return.
    pub(crate) async fn run<C: ExternalCache>(
        self,
        mut rx: mpsc::Receiver<PendingWrite>,
        mut shutdown_rx: oneshot::Receiver<()>,
        cache: Arc<C>,
    ) {
        let mut pending: HashMap<CacheKey, String> = HashMap::with_capacity(self.batch_size);
        let mut ticker = time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // interval() completes its first tick at once.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown_rx => {
                    rx.close();
                    let mut drained = 0usize;
                    while let Some(write) = rx.recv().await {
                        pending.insert(write.key, write.content);
                        drained += 1;
                    }
                    tracing::info!(drained, pending = pending.len(), "Cache writer stopping");
                    self.persist(cache.as_ref(), &mut pending).await;
                    return;
                }

                Some(write) = rx.recv() => {
                    pending.insert(write.key, write.content);
                    if pending.len() >= self.batch_size {
                        self.persist(cache.as_ref(), &mut pending).await;
                    }
                }

                _ = ticker.tick() => self.persist(cache.as_ref(), &mut pending).await,
            }
        }
    }

    async fn persist<C: ExternalCache>(&self, cache: &C, pending: &mut HashMap<CacheKey, String>) {
        if pending.is_empty() {
            return;
        }
        let writes = std::mem::take(pending);
        let ttl = self.ttl;
        let results = futures::future::join_all(
            writes
                .iter()
                .map(|(key, content)| async move { (key, cache.set(key.as_str(), content, ttl).await) }),
        )
        .await;

        let mut failed = 0usize;
        for (key, result) in results {
            if let Err(e) = result {
                tracing::error!("Cache write for {key} failed: {e}");
                failed += 1;
            }
        }
        tracing::debug!(written = writes.len() - failed, failed, "Persisted cache batch");
    }
}
