//! Cache Store Module
//!
//! The file cache engine: key validation, key→path resolution, lazy
//! expiration, and get/set/delete/clear on top of the filesystem port.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::IgnoredAny;
use tracing::{debug, info, warn};

use crate::cache::clock::{Clock, SystemClock};
use crate::cache::codec::{JsonObjectCodec, ObjectCodec};
use crate::cache::entry::{EntryRecord, Ttl};
use crate::cache::key::{CacheKey, Namespace};
use crate::cache::stats::{CacheStats, StatsRecorder};
use crate::cache::value::CacheValue;
use crate::cache::{DEFAULT_CACHE_NAME, DEFAULT_FILE_EXTENSION, DIGEST_LENGTH, TEMP_FILE_SUFFIX};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::fs::{FileSystem, FsError, FsResult, LocalFileSystem, DEFAULT_DIR_MODE};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

// == Sharding ==
/// Nested directory layout for entry files.
///
/// Each level is a directory named after the next `chars_per_level`
/// characters of the key digest. `levels == 0` keeps all entries directly in
/// the namespace directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sharding {
    pub levels: usize,
    pub chars_per_level: usize,
}

impl Sharding {
    /// All entries directly under the namespace directory.
    pub fn flat() -> Self {
        Self {
            levels: 0,
            chars_per_level: 1,
        }
    }

    pub fn new(levels: usize, chars_per_level: usize) -> Self {
        Self {
            levels,
            chars_per_level,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.levels == 0 {
            return Ok(());
        }
        let used = self.levels.checked_mul(self.chars_per_level);
        if self.chars_per_level == 0 || used.map_or(true, |n| n > DIGEST_LENGTH) {
            return Err(CacheError::InvalidConfig(format!(
                "sharding of {} levels x {} chars does not fit a {DIGEST_LENGTH}-char digest",
                self.levels, self.chars_per_level
            )));
        }
        Ok(())
    }

    fn segments<'a>(&self, digest: &'a str) -> impl Iterator<Item = &'a str> {
        let width = self.chars_per_level;
        (0..self.levels).map(move |level| &digest[level * width..(level + 1) * width])
    }
}

impl Default for Sharding {
    fn default() -> Self {
        Self::flat()
    }
}

fn validate_extension(extension: &str) -> Result<()> {
    let valid = extension.len() >= 2
        && extension.len() <= 16
        && extension.starts_with('.')
        && extension[1..].bytes().all(|b| b.is_ascii_alphanumeric())
        && extension != TEMP_FILE_SUFFIX;
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidConfig(format!(
            "file extension {extension:?} must be a dot followed by 1-15 alphanumerics"
        )))
    }
}

/// Treats "already exists" as success; creation races between writers are expected.
fn ignore_exists(result: FsResult<()>) -> FsResult<()> {
    match result {
        Err(FsError::AlreadyExists(_)) => Ok(()),
        other => other,
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.{}{}", std::process::id(), counter, TEMP_FILE_SUFFIX));
    path.with_file_name(name)
}

// == Builder ==
/// Configures and constructs a [`FileCache`].
#[derive(Debug)]
pub struct FileCacheBuilder {
    storage_root: PathBuf,
    namespace: String,
    file_extension: String,
    sharding: Sharding,
    atomic_writes: bool,
    fs: Option<Arc<dyn FileSystem>>,
    clock: Option<Arc<dyn Clock>>,
    object_codec: Option<Arc<dyn ObjectCodec>>,
}

impl FileCacheBuilder {
    /// Starts a builder for a cache rooted at `storage_root`.
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            namespace: DEFAULT_CACHE_NAME.to_string(),
            file_extension: DEFAULT_FILE_EXTENSION.to_string(),
            sharding: Sharding::flat(),
            atomic_writes: true,
            fs: None,
            clock: None,
            object_codec: None,
        }
    }

    /// Starts a builder from loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.storage_path.clone())
            .namespace(config.cache_name.clone())
            .file_extension(config.file_extension.clone())
            .sharding(Sharding::new(config.shard_levels, config.shard_width))
            .atomic_writes(config.atomic_writes)
    }

    pub fn namespace(mut self, name: impl Into<String>) -> Self {
        self.namespace = name.into();
        self
    }

    pub fn file_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = extension.into();
        self
    }

    pub fn sharding(mut self, sharding: Sharding) -> Self {
        self.sharding = sharding;
        self
    }

    /// Write through a temporary file and rename (the default). When
    /// disabled, entry files are overwritten in place.
    pub fn atomic_writes(mut self, enabled: bool) -> Self {
        self.atomic_writes = enabled;
        self
    }

    /// Filesystem port to use. Defaults to [`LocalFileSystem`].
    pub fn filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    /// Time source. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Codec for `object` payloads. Defaults to [`JsonObjectCodec`].
    pub fn object_codec(mut self, codec: Arc<dyn ObjectCodec>) -> Self {
        self.object_codec = Some(codec);
        self
    }

    // == Build ==
    /// Validates the configuration and prepares the namespace directory.
    ///
    /// # Errors
    /// - [`CacheError::InvalidNamespace`] / [`CacheError::InvalidConfig`] for bad settings
    /// - [`CacheError::StorageUnavailable`] if the root is not a writable
    ///   directory or the namespace directory cannot be created
    pub fn build(self) -> Result<FileCache> {
        let namespace = Namespace::parse(&self.namespace)?;
        validate_extension(&self.file_extension)?;
        self.sharding.validate()?;

        let fs = self.fs.unwrap_or_else(|| Arc::new(LocalFileSystem::new()));
        if !fs.is_writable_dir(&self.storage_root) {
            return Err(CacheError::StorageUnavailable {
                path: self.storage_root,
                reason: "not a writable directory".into(),
            });
        }

        let cache_path = self.storage_root.join(namespace.as_str());
        let cache = FileCache {
            storage_root: self.storage_root,
            namespace,
            cache_path,
            file_extension: self.file_extension,
            sharding: self.sharding,
            atomic_writes: self.atomic_writes,
            fs,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            object_codec: self.object_codec.unwrap_or_else(|| Arc::new(JsonObjectCodec)),
            stats: StatsRecorder::default(),
        };

        cache
            .ensure_cache_path()
            .map_err(|e| CacheError::StorageUnavailable {
                path: cache.cache_path.clone(),
                reason: e.to_string(),
            })?;

        info!(
            cache_path = %cache.cache_path.display(),
            shard_levels = cache.sharding.levels,
            atomic_writes = cache.atomic_writes,
            codec = cache.object_codec.name(),
            "File cache initialized"
        );

        Ok(cache)
    }
}

// == File Cache ==
/// Persistent key/value cache with one JSON record file per key.
///
/// All operations take `&self` and perform blocking I/O; share the engine
/// across threads with an `Arc`. There is no cross-process locking: two
/// writers racing on one key leave whichever write completed last. Readers
/// see either the old or the new record. With atomic writes disabled a
/// reader racing a writer may see a truncated record; that is a miss and
/// the file is left for the writer to finish.
#[derive(Debug)]
pub struct FileCache {
    pub(super) storage_root: PathBuf,
    pub(super) namespace: Namespace,
    pub(super) cache_path: PathBuf,
    pub(super) file_extension: String,
    pub(super) sharding: Sharding,
    pub(super) atomic_writes: bool,
    pub(super) fs: Arc<dyn FileSystem>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) object_codec: Arc<dyn ObjectCodec>,
    pub(super) stats: StatsRecorder,
}

impl FileCache {
    // == Constructors ==
    /// Opens the default namespace under `storage_root` on the local filesystem.
    pub fn new(storage_root: impl Into<PathBuf>) -> Result<Self> {
        FileCacheBuilder::new(storage_root).build()
    }

    pub fn builder(storage_root: impl Into<PathBuf>) -> FileCacheBuilder {
        FileCacheBuilder::new(storage_root)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        FileCacheBuilder::from_config(config).build()
    }

    // == Accessors ==
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Directory holding this namespace's entries.
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn file_extension(&self) -> &str {
        &self.file_extension
    }

    pub fn sharding(&self) -> Sharding {
        self.sharding
    }

    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Path of the file that holds `key`. Does not touch the filesystem.
    pub fn entry_path(&self, key: &str) -> Result<PathBuf> {
        let key = CacheKey::parse(key)?;
        Ok(self.locate(&key).1)
    }

    /// Returns (entry directory, entry file) for a key.
    pub(super) fn locate(&self, key: &CacheKey) -> (PathBuf, PathBuf) {
        let digest = key.digest();
        let mut dir = self.cache_path.clone();
        for segment in self.sharding.segments(&digest) {
            dir.push(segment);
        }
        let file = dir.join(format!("{digest}{}", self.file_extension));
        (dir, file)
    }

    fn ensure_cache_path(&self) -> FsResult<()> {
        if self.fs.dir_exists(&self.cache_path) {
            return Ok(());
        }
        ignore_exists(self.fs.create_dir(&self.cache_path, DEFAULT_DIR_MODE, true))
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Returns `Ok(None)` when the entry is absent, unreadable, expired, or
    /// invalid; expired and invalid entry files are deleted on the way, except
    /// a truncated file an in-place writer may still be filling.
    ///
    /// # Errors
    /// - [`CacheError::InvalidKey`] before any I/O
    /// - [`CacheError::Io`] if reading or removing the file fails
    pub fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        let key = CacheKey::parse(key)?;
        self.lookup(&key)
    }

    /// Retrieves a value by key, falling back to `default` on a miss.
    pub fn get_or(&self, key: &str, default: impl Into<CacheValue>) -> Result<CacheValue> {
        Ok(self.get(key)?.unwrap_or_else(|| default.into()))
    }

    /// True if `get` would return a value.
    pub fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn lookup(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        let (_, path) = self.locate(key);

        if !self.fs.is_readable_file(&path) {
            self.stats.record_miss();
            return Ok(None);
        }

        let bytes = match self.fs.read_file(&path) {
            Ok(bytes) => bytes,
            // Deleted between the check and the read
            Err(FsError::NotFound(_)) => {
                self.stats.record_miss();
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let now = self.clock.now();
        let outcome = EntryRecord::from_bytes(&bytes).and_then(|record| {
            if record.is_expired_at(now) {
                Ok(None)
            } else {
                record.value(self.object_codec.as_ref()).map(Some)
            }
        });

        match outcome {
            Ok(Some(value)) => {
                self.stats.record_hit();
                debug!(key = %key, "Cache hit");
                Ok(Some(value))
            }
            Ok(None) => {
                debug!(key = %key, "Cache entry expired, removing");
                self.discard(&path)?;
                self.stats.record_expired();
                self.stats.record_miss();
                Ok(None)
            }
            Err(err) if err.is_record_error() && self.is_in_flight(&bytes) => {
                debug!(key = %key, "Cache entry is being written, skipping");
                self.stats.record_miss();
                Ok(None)
            }
            Err(err) if err.is_record_error() => {
                warn!(key = %key, path = %path.display(), error = %err, "Removing invalid cache entry");
                self.discard(&path)?;
                self.stats.record_invalid();
                self.stats.record_miss();
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// True when an in-place writer may still be filling this file: the
    /// bytes are not even well-formed JSON. Never true with atomic writes.
    pub(super) fn is_in_flight(&self, bytes: &[u8]) -> bool {
        !self.atomic_writes && serde_json::from_slice::<IgnoredAny>(bytes).is_err()
    }

    /// Deletes an entry file, tolerating a concurrent removal.
    pub(super) fn discard(&self, path: &Path) -> Result<()> {
        match self.fs.delete_file(path) {
            Ok(()) | Err(FsError::NotFound(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    // == Set ==
    /// Stores a value with a TTL, overwriting any previous entry.
    ///
    /// The value is encoded before any I/O, so unsupported values and bad
    /// TTLs never leave files behind.
    ///
    /// # Errors
    /// - [`CacheError::InvalidKey`], [`CacheError::UnsupportedValue`],
    ///   [`CacheError::InvalidTtl`] before any I/O
    /// - [`CacheError::WriteFailure`] wrapping the filesystem error otherwise
    pub fn set(&self, key: &str, value: impl Into<CacheValue>, ttl: impl Into<Ttl>) -> Result<()> {
        let key = CacheKey::parse(key)?;
        self.store(&key, &value.into(), ttl.into())
    }

    fn store(&self, key: &CacheKey, value: &CacheValue, ttl: Ttl) -> Result<()> {
        let record = EntryRecord::encode(value, ttl, self.clock.now(), self.object_codec.as_ref())?;
        let bytes = record.to_bytes()?;
        let (dir, path) = self.locate(key);

        self.persist(&dir, &path, &bytes)
            .map_err(|source| CacheError::WriteFailure {
                path: path.clone(),
                source,
            })?;

        self.stats.record_write();
        debug!(
            key = %key,
            kind = %record.value_type,
            expires_at = ?record.expires_at,
            "Cache entry stored"
        );
        Ok(())
    }

    fn persist(&self, dir: &Path, path: &Path, bytes: &[u8]) -> FsResult<()> {
        if !self.fs.dir_exists(dir) {
            ignore_exists(self.fs.create_dir(dir, DEFAULT_DIR_MODE, true))?;
        }

        if self.atomic_writes {
            return self.persist_atomic(path, bytes);
        }

        if !self.fs.file_exists(path) {
            ignore_exists(self.fs.create_file(path))?;
        }
        self.fs.write_file(path, bytes)
    }

    fn persist_atomic(&self, path: &Path, bytes: &[u8]) -> FsResult<()> {
        let tmp = temp_path(path);
        self.fs.create_file(&tmp)?;

        let result = self
            .fs
            .write_file(&tmp, bytes)
            .and_then(|()| self.fs.rename_file(&tmp, path));

        if result.is_err() {
            if let Err(err) = self.fs.delete_file(&tmp) {
                debug!(path = %tmp.display(), error = %err, "Could not remove temporary entry file");
            }
        }
        result
    }

    // == Delete ==
    /// Removes an entry. Deleting an absent key succeeds.
    pub fn delete(&self, key: &str) -> Result<()> {
        let key = CacheKey::parse(key)?;
        self.remove(&key)
    }

    fn remove(&self, key: &CacheKey) -> Result<()> {
        let (_, path) = self.locate(key);
        if !self.fs.file_exists(&path) {
            return Ok(());
        }

        match self.fs.delete_file(&path) {
            Ok(()) => {
                self.stats.record_delete();
                debug!(key = %key, "Cache entry deleted");
                Ok(())
            }
            Err(FsError::NotFound(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    // == Clear ==
    /// Removes every entry of this namespace, leaving its directory empty.
    pub fn clear(&self) -> Result<()> {
        self.fs.remove_dir_recursive(&self.cache_path)?;
        self.ensure_cache_path()?;
        info!(cache_path = %self.cache_path.display(), "Cache cleared");
        Ok(())
    }

    // == Batch Operations ==
    /// Reads several keys. All keys are validated before any I/O.
    pub fn get_many<I, K>(&self, keys: I) -> Result<Vec<(String, Option<CacheValue>)>>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let keys = parse_keys(keys)?;
        keys.into_iter()
            .map(|key| {
                let value = self.lookup(&key)?;
                Ok((key.as_str().to_string(), value))
            })
            .collect()
    }

    /// Stores several values with one TTL. All keys are validated before any
    /// I/O; stops at the first failing write.
    pub fn set_many<I, K, V>(&self, entries: I, ttl: impl Into<Ttl>) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<CacheValue>,
    {
        let ttl = ttl.into();
        let entries = entries
            .into_iter()
            .map(|(key, value)| Ok((CacheKey::parse(key.as_ref())?, value.into())))
            .collect::<Result<Vec<_>>>()?;

        for (key, value) in &entries {
            self.store(key, value, ttl)?;
        }
        Ok(())
    }

    /// Deletes several keys. All keys are validated before any I/O.
    pub fn delete_many<I, K>(&self, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        for key in parse_keys(keys)? {
            self.remove(&key)?;
        }
        Ok(())
    }

    // == Cache Aside ==
    /// Returns the cached value for `key`, or runs `fetch` on a miss.
    ///
    /// The fetched value is stored only when `is_cacheable` approves it, so
    /// the caller keeps the decision of what is worth caching (e.g. only
    /// successful API responses).
    pub fn get_or_fetch<F, P, E>(
        &self,
        key: &str,
        ttl: impl Into<Ttl>,
        fetch: F,
        is_cacheable: P,
    ) -> std::result::Result<CacheValue, E>
    where
        F: FnOnce() -> std::result::Result<CacheValue, E>,
        P: FnOnce(&CacheValue) -> bool,
        E: From<CacheError>,
    {
        if let Some(value) = self.get(key)? {
            return Ok(value);
        }

        let value = fetch()?;
        if is_cacheable(&value) {
            self.set(key, value.clone(), ttl)?;
        } else {
            debug!(key = key, "Fetched value not cacheable, skipping store");
        }
        Ok(value)
    }
}

fn parse_keys<I, K>(keys: I) -> Result<Vec<CacheKey>>
where
    I: IntoIterator<Item = K>,
    K: AsRef<str>,
{
    keys.into_iter()
        .map(|key| CacheKey::parse(key.as_ref()))
        .collect()
}
