//! Cache Maintenance Module
//!
//! Read-only inspection of a single entry and an explicit sweep that removes
//! expired or invalid entry files without waiting for a read to hit them.

use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::cache::entry::EntryRecord;
use crate::cache::key::CacheKey;
use crate::cache::store::FileCache;
use crate::cache::value::{CacheValue, ValueKind};
use crate::error::Result;
use crate::fs::FsError;

// == Entry Info ==
/// Everything stored about one entry, as read from disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryInfo {
    pub key: String,
    pub path: PathBuf,
    pub kind: ValueKind,
    #[serde(serialize_with = "serialize_value")]
    pub value: CacheValue,
    pub created_at: i64,
    pub expires_at: Option<i64>,
    pub is_expired: bool,
    /// Seconds left, None if the entry never expires
    pub ttl_remaining: Option<i64>,
}

fn serialize_value<S: Serializer>(
    value: &CacheValue,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    value.to_json().serialize(serializer)
}

// == Prune Report ==
/// Outcome of [`FileCache::prune_expired`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// Entry files examined
    pub scanned: u64,
    /// Expired entries removed
    pub expired: u64,
    /// Invalid or corrupt entries removed
    pub invalid: u64,
}

impl PruneReport {
    pub fn removed(&self) -> u64 {
        self.expired + self.invalid
    }
}

impl FileCache {
    // == Inspect ==
    /// Reads an entry with its metadata, without the lazy removal `get`
    /// performs. Expired entries are returned with `is_expired` set.
    ///
    /// # Errors
    /// - `InvalidKey` before any I/O
    /// - `InvalidRecord` / `CorruptValue` if the file exists but cannot be
    ///   decoded
    /// - `Io` if reading fails
    pub fn inspect(&self, key: &str) -> Result<Option<EntryInfo>> {
        let key = CacheKey::parse(key)?;
        let (_, path) = self.locate(&key);

        if !self.fs.is_readable_file(&path) {
            return Ok(None);
        }
        let bytes = match self.fs.read_file(&path) {
            Ok(bytes) => bytes,
            Err(FsError::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let record = EntryRecord::from_bytes(&bytes)?;
        let value = record.value(self.object_codec.as_ref())?;
        let now = self.clock.now();

        Ok(Some(EntryInfo {
            key: key.as_str().to_string(),
            path,
            kind: record.value_type,
            value,
            created_at: record.created_at,
            expires_at: record.expires_at,
            is_expired: record.is_expired_at(now),
            ttl_remaining: record.ttl_remaining(now),
        }))
    }

    // == Prune ==
    /// Walks the namespace directory and deletes every expired or invalid
    /// entry file. Files without the entry extension are left alone.
    pub fn prune_expired(&self) -> Result<PruneReport> {
        let mut report = PruneReport::default();
        if self.fs.dir_exists(&self.cache_path) {
            let now = self.clock.now();
            self.prune_dir(&self.cache_path, now, &mut report)?;
        }

        info!(
            scanned = report.scanned,
            expired = report.expired,
            invalid = report.invalid,
            "Pruned cache entries"
        );
        Ok(report)
    }

    fn prune_dir(&self, dir: &Path, now: i64, report: &mut PruneReport) -> Result<()> {
        let children = match self.fs.list_dir(dir) {
            Ok(children) => children,
            Err(FsError::NotFound(_)) => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        for child in children {
            if child.is_dir {
                self.prune_dir(&child.path, now, report)?;
            } else if self.is_entry_file(&child.path) {
                self.prune_file(&child.path, now, report)?;
            }
        }
        Ok(())
    }

    fn is_entry_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(self.file_extension.as_str()))
    }

    fn prune_file(&self, path: &Path, now: i64, report: &mut PruneReport) -> Result<()> {
        if !self.fs.is_readable_file(path) {
            debug!(path = %path.display(), "Skipping unreadable entry file");
            return Ok(());
        }
        let bytes = match self.fs.read_file(path) {
            Ok(bytes) => bytes,
            Err(FsError::NotFound(_)) => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        report.scanned += 1;

        let verdict = EntryRecord::from_bytes(&bytes).and_then(|record| {
            if record.is_expired_at(now) {
                Ok(true)
            } else {
                record.value(self.object_codec.as_ref()).map(|_| false)
            }
        });

        match verdict {
            Ok(false) => {}
            Err(err) if err.is_record_error() && self.is_in_flight(&bytes) => {
                debug!(path = %path.display(), "Skipping entry file being written");
            }
            Ok(true) => {
                self.discard(path)?;
                self.stats.record_expired();
                report.expired += 1;
            }
            Err(err) if err.is_record_error() => {
                warn!(path = %path.display(), error = %err, "Removing invalid cache entry");
                self.discard(path)?;
                self.stats.record_invalid();
                report.invalid += 1;
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }
}
