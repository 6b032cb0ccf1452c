//! Filesystem cache backend.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::cache::ExternalCache;
use crate::error::{CleanerError, Result};

const EXTENSION: &str = "cache";

/// External cache tier that keeps one file per key under a base directory.
///
/// Each file starts with a line holding the expiry as Unix seconds (`0` for
/// no expiry), followed by the content. Expired files are removed when read.
///
/// # Example
///
/// ```rust,no_run
/// use word_cleaner::FsCache;
///
/// let cache = FsCache::new("/var/cache/word_cleaner");
/// ```
pub struct FsCache {
    base_dir: PathBuf,
}

impl FsCache {
    /// Create a new `FsCache` rooted at the given directory.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{key}.{EXTENSION}"))
    }
}

fn backend(e: std::io::Error) -> CleanerError {
    CleanerError::CacheBackend(Box::new(e))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

impl ExternalCache for FsCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path(key);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(backend(e)),
        };

        let Some((header, content)) = raw.split_once('\n') else {
            return Err(CleanerError::CacheBackend(
                format!("malformed cache file {}", path.display()).into(),
            ));
        };
        let expires_at: u64 = header.trim().parse().map_err(|e| CleanerError::CacheBackend(Box::new(e)))?;
        if expires_at != 0 && expires_at <= unix_now() {
            tracing::debug!("Cache file {} expired", path.display());
            self.delete(key).await?;
            return Ok(None);
        }
        Ok(Some(content.to_string()))
    }

    async fn set(&self, key: &str, content: &str, ttl: Duration) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_dir).await.map_err(backend)?;

        let expires_at = if ttl.is_zero() { 0 } else { unix_now() + ttl.as_secs().max(1) };
        let path = self.path(key);
        tokio::fs::write(&path, format!("{expires_at}\n{content}"))
            .await
            .map_err(backend)?;

        tracing::debug!("Wrote {} bytes to {}", content.len(), path.display());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(backend(e)),
        }
    }

    async fn flush(&self) -> Result<()> {
        let mut entries = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(backend(e)),
        };
        while let Some(entry) = entries.next_entry().await.map_err(backend)? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == EXTENSION) {
                tokio::fs::remove_file(&path).await.map_err(backend)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        assert_eq!(cache.get("k").await.unwrap(), None);

        cache.set("k", "<p>a\nb</p>", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("<p>a\nb</p>"));

        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        cache.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        tokio::fs::write(dir.path().join("old.cache"), "1\n<p>stale</p>").await.unwrap();
        assert_eq!(cache.get("old").await.unwrap(), None);
        assert!(!dir.path().join("old.cache").exists());
    }

    #[tokio::test]
    async fn flush_removes_only_cache_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        cache.set("a", "1", Duration::ZERO).await.unwrap();
        cache.set("b", "2", Duration::ZERO).await.unwrap();
        tokio::fs::write(dir.path().join("keep.txt"), "x").await.unwrap();

        cache.flush().await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert!(dir.path().join("keep.txt").exists());
    }

    #[tokio::test]
    async fn malformed_files_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        tokio::fs::write(dir.path().join("bad.cache"), "not-a-number\nx").await.unwrap();
        assert!(matches!(cache.get("bad").await, Err(CleanerError::CacheBackend(_))));
    }

    #[tokio::test]
    async fn flushing_a_missing_directory_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path().join("missing"));
        cache.flush().await.unwrap();
    }
}
