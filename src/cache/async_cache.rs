//! Async Cache Adapter
//!
//! Runs the blocking [`FileCache`] operations on tokio's blocking pool so
//! async callers never stall a runtime worker on disk I/O.

use std::sync::Arc;
use std::time::Duration;

use tokio::{task, time};

use crate::cache::entry::Ttl;
use crate::cache::maintenance::{EntryInfo, PruneReport};
use crate::cache::stats::CacheStats;
use crate::cache::store::FileCache;
use crate::cache::value::CacheValue;
use crate::error::{CacheError, Result};

// == Async File Cache ==
/// Cloneable async handle over a shared [`FileCache`].
///
/// With a timeout set, an operation that takes too long resolves to
/// [`CacheError::Timeout`]. The blocking call itself cannot be interrupted
/// and still runs to completion in the background.
#[derive(Debug, Clone)]
pub struct AsyncFileCache {
    inner: Arc<FileCache>,
    timeout: Option<Duration>,
}

impl AsyncFileCache {
    pub fn new(cache: FileCache) -> Self {
        Self::from_shared(Arc::new(cache))
    }

    /// Wraps an engine that is also used synchronously elsewhere.
    pub fn from_shared(cache: Arc<FileCache>) -> Self {
        Self {
            inner: cache,
            timeout: None,
        }
    }

    /// Bounds how long each operation may take.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn inner(&self) -> &Arc<FileCache> {
        &self.inner
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&FileCache) -> Result<T> + Send + 'static,
    {
        let cache = Arc::clone(&self.inner);
        let handle = task::spawn_blocking(move || op(&cache));

        let joined = match self.timeout {
            Some(limit) => time::timeout(limit, handle)
                .await
                .map_err(|_| CacheError::Timeout(limit))?,
            None => handle.await,
        };

        joined.map_err(|e| CacheError::Internal(format!("cache task failed: {e}")))?
    }

    // == Operations ==
    pub async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        let key = key.to_string();
        self.run(move |cache| cache.get(&key)).await
    }

    pub async fn get_or(&self, key: &str, default: impl Into<CacheValue>) -> Result<CacheValue> {
        let key = key.to_string();
        let default = default.into();
        self.run(move |cache| cache.get_or(&key, default)).await
    }

    pub async fn has(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.run(move |cache| cache.has(&key)).await
    }

    pub async fn set(
        &self,
        key: &str,
        value: impl Into<CacheValue>,
        ttl: impl Into<Ttl>,
    ) -> Result<()> {
        let key = key.to_string();
        let value = value.into();
        let ttl = ttl.into();
        self.run(move |cache| cache.set(&key, value, ttl)).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.run(move |cache| cache.delete(&key)).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.run(|cache| cache.clear()).await
    }

    pub async fn inspect(&self, key: &str) -> Result<Option<EntryInfo>> {
        let key = key.to_string();
        self.run(move |cache| cache.inspect(&key)).await
    }

    pub async fn prune_expired(&self) -> Result<PruneReport> {
        self.run(|cache| cache.prune_expired()).await
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use crate::fs::{DirEntry, FileSystem, FsResult, MemoryFileSystem};
    use std::path::Path;

    const ROOT: &str = "/storage";

    fn async_cache(fs: Arc<dyn FileSystem>) -> (AsyncFileCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let cache = FileCache::builder(ROOT)
            .filesystem(fs)
            .clock(clock.clone())
            .build()
            .unwrap();
        (AsyncFileCache::new(cache), clock)
    }

    /// Delegates to memory storage but sleeps on every read.
    #[derive(Debug)]
    struct SlowReads {
        inner: MemoryFileSystem,
        delay: Duration,
    }

    impl FileSystem for SlowReads {
        fn dir_exists(&self, path: &Path) -> bool {
            self.inner.dir_exists(path)
        }
        fn create_dir(&self, path: &Path, mode: u32, recursive: bool) -> FsResult<()> {
            self.inner.create_dir(path, mode, recursive)
        }
        fn is_writable_dir(&self, path: &Path) -> bool {
            self.inner.is_writable_dir(path)
        }
        fn file_exists(&self, path: &Path) -> bool {
            self.inner.file_exists(path)
        }
        fn is_writable_file(&self, path: &Path) -> bool {
            self.inner.is_writable_file(path)
        }
        fn is_readable_file(&self, path: &Path) -> bool {
            self.inner.is_readable_file(path)
        }
        fn create_file(&self, path: &Path) -> FsResult<()> {
            self.inner.create_file(path)
        }
        fn write_file(&self, path: &Path, data: &[u8]) -> FsResult<()> {
            self.inner.write_file(path, data)
        }
        fn read_file(&self, path: &Path) -> FsResult<Vec<u8>> {
            std::thread::sleep(self.delay);
            self.inner.read_file(path)
        }
        fn delete_file(&self, path: &Path) -> FsResult<()> {
            self.inner.delete_file(path)
        }
        fn remove_dir_recursive(&self, path: &Path) -> FsResult<()> {
            self.inner.remove_dir_recursive(path)
        }
        fn list_dir(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
            self.inner.list_dir(path)
        }
        fn rename_file(&self, from: &Path, to: &Path) -> FsResult<()> {
            self.inner.rename_file(from, to)
        }
    }

    #[tokio::test]
    async fn test_async_set_get_delete() {
        let (cache, _clock) = async_cache(Arc::new(MemoryFileSystem::with_dir(ROOT)));

        cache.set("key1", "value1", Ttl::Never).await.unwrap();
        assert_eq!(cache.get("key1").await.unwrap(), Some("value1".into()));
        assert!(cache.has("key1").await.unwrap());

        cache.delete("key1").await.unwrap();
        assert_eq!(cache.get_or("key1", "default").await.unwrap(), "default".into());
    }

    #[tokio::test]
    async fn test_async_expiry_and_prune() {
        let (cache, clock) = async_cache(Arc::new(MemoryFileSystem::with_dir(ROOT)));

        cache.set("short", 1i64, 10).await.unwrap();
        cache.set("long", 2i64, 1000).await.unwrap();
        clock.advance(11);

        let report = cache.prune_expired().await.unwrap();
        assert_eq!(report.expired, 1);
        assert!(cache.inspect("short").await.unwrap().is_none());
        assert!(cache.inspect("long").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_async_clear_and_stats() {
        let (cache, _clock) = async_cache(Arc::new(MemoryFileSystem::with_dir(ROOT)));

        cache.set("a", true, Ttl::Never).await.unwrap();
        cache.get("a").await.unwrap();
        cache.clear().await.unwrap();

        assert_eq!(cache.get("a").await.unwrap(), None);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_async_errors_pass_through() {
        let (cache, _clock) = async_cache(Arc::new(MemoryFileSystem::with_dir(ROOT)));

        assert!(matches!(
            cache.get("bad key").await,
            Err(CacheError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_async_timeout() {
        let fs = Arc::new(SlowReads {
            inner: MemoryFileSystem::with_dir(ROOT),
            delay: Duration::from_millis(300),
        });
        let (cache, _clock) = async_cache(fs);
        cache.set("slow", "v", Ttl::Never).await.unwrap();

        let cache = cache.with_timeout(Duration::from_millis(20));
        let result = cache.get("slow").await;

        assert!(matches!(result, Err(CacheError::Timeout(_))));
    }
}
