use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::CacheKey;

/// Bounds for the configurable entry limit.
pub const MIN_ENTRIES: usize = 10;
pub const MAX_ENTRIES: usize = 1000;

#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub content: String,
    pub inserted_at: Instant,
    seq: u64,
}

#[derive(Default)]
struct State {
    entries: HashMap<CacheKey, CacheEntry>,
    next_seq: u64,
}

/// Bounded process-local cache.
///
/// When full, the oldest fifth of the entries (at least one) is evicted
/// before an insert.
pub struct MemoryCache {
    state: Mutex<State>,
    max_entries: AtomicUsize,
}

impl MemoryCache {
    /// `max_entries` is clamped to `10..=1000`.
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            max_entries: AtomicUsize::new(max_entries.clamp(MIN_ENTRIES, MAX_ENTRIES)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries.load(Ordering::Relaxed)
    }

    /// Change the limit (clamped), trimming immediately if over it.
    pub fn set_max_entries(&self, max_entries: usize) {
        let max_entries = max_entries.clamp(MIN_ENTRIES, MAX_ENTRIES);
        self.max_entries.store(max_entries, Ordering::Relaxed);
        let mut state = self.lock();
        let excess = state.entries.len().saturating_sub(max_entries);
        if excess > 0 {
            evict_oldest(&mut state, excess);
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<String> {
        self.lock().entries.get(key).map(|entry| entry.content.clone())
    }

    pub fn insert(&self, key: CacheKey, content: String) {
        let max_entries = self.max_entries();
        let mut state = self.lock();
        if !state.entries.contains_key(&key) && state.entries.len() >= max_entries {
            let count = (max_entries / 5).max(1);
            evict_oldest(&mut state, count);
            tracing::debug!("Evicted {count} oldest cache entries");
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            key,
            CacheEntry {
                content,
                inserted_at: Instant::now(),
                seq,
            },
        );
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        self.lock().entries.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Drop entries older than `max_age`, returning how many were removed.
    pub fn remove_older_than(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        let before = state.entries.len();
        state
            .entries
            .retain(|_, entry| now.saturating_duration_since(entry.inserted_at) <= max_age);
        before - state.entries.len()
    }
}

fn evict_oldest(state: &mut State, count: usize) {
    let mut by_age: Vec<(u64, CacheKey)> = state
        .entries
        .iter()
        .map(|(key, entry)| (entry.seq, key.clone()))
        .collect();
    by_age.sort_unstable_by_key(|(seq, _)| *seq);
    for (_, key) in by_age.into_iter().take(count) {
        state.entries.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::CleaningPolicy;

    fn key(n: usize) -> CacheKey {
        CacheKey::derive(&format!("<p>{n}</p>"), &CleaningPolicy::default(), "post", "test")
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(MemoryCache::new(1).max_entries(), 10);
        assert_eq!(MemoryCache::new(5000).max_entries(), 1000);
        assert_eq!(MemoryCache::new(100).max_entries(), 100);
    }

    #[test]
    fn evicts_the_oldest_fifth_when_full() {
        let cache = MemoryCache::new(10);
        for n in 0..10 {
            cache.insert(key(n), n.to_string());
        }
        assert_eq!(cache.len(), 10);

        cache.insert(key(10), "10".into());
        assert_eq!(cache.len(), 9);
        assert!(cache.get(&key(0)).is_none());
        assert!(cache.get(&key(1)).is_none());
        assert_eq!(cache.get(&key(2)).as_deref(), Some("2"));
        assert_eq!(cache.get(&key(10)).as_deref(), Some("10"));
    }

    #[test]
    fn replacing_an_entry_does_not_evict() {
        let cache = MemoryCache::new(10);
        for n in 0..10 {
            cache.insert(key(n), n.to_string());
        }
        cache.insert(key(3), "again".into());
        assert_eq!(cache.len(), 10);
        assert_eq!(cache.get(&key(3)).as_deref(), Some("again"));
    }

    #[test]
    fn shrinking_the_limit_trims_oldest() {
        let cache = MemoryCache::new(20);
        for n in 0..20 {
            cache.insert(key(n), n.to_string());
        }
        cache.set_max_entries(10);
        assert_eq!(cache.len(), 10);
        assert!(cache.get(&key(9)).is_none());
        assert!(cache.get(&key(10)).is_some());
    }

    #[test]
    fn expiry_and_clear() {
        let cache = MemoryCache::new(10);
        cache.insert(key(1), "1".into());
        assert_eq!(cache.remove_older_than(Duration::from_secs(3600)), 0);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.remove_older_than(Duration::from_millis(1)), 1);
        cache.insert(key(2), "2".into());
        assert!(cache.remove(&key(2)));
        cache.insert(key(3), "3".into());
        cache.clear();
        assert!(cache.is_empty());
    }
}
