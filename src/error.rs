//! Error types for the file cache
//!
//! Provides unified error handling using thiserror. Filesystem failures are
//! reported by the port as [`FsError`] and wrapped into [`CacheError`] by the
//! engine so callers depend on a single error surface.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::fs::FsError;

// == Cache Error Enum ==
/// Unified error type for the file cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key does not match `[A-Za-z0-9_.]{1,64}`
    #[error("Invalid cache key: {0:?}")]
    InvalidKey(String),

    /// Cache name does not match `[A-Za-z0-9_-]{1,64}`
    #[error("Invalid cache name: {0:?}")]
    InvalidNamespace(String),

    /// Value cannot be represented in a cache record
    #[error("Unsupported value: {0}")]
    UnsupportedValue(String),

    /// TTL cannot be turned into an expiration timestamp
    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),

    /// Stored record failed structural validation
    #[error("Invalid cache record: {0}")]
    InvalidRecord(String),

    /// Stored composite payload could not be deserialized
    #[error("Corrupt cached value: {0}")]
    CorruptValue(String),

    /// Storage root is not a writable directory
    #[error("Cache storage unavailable at {}: {reason}", path.display())]
    StorageUnavailable { path: PathBuf, reason: String },

    /// Writing an entry failed at the filesystem level
    #[error("Failed to write cache entry {}", path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: FsError,
    },

    /// Any other filesystem failure
    #[error(transparent)]
    Io(#[from] FsError),

    /// Builder or environment configuration is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An async call exceeded its deadline
    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    // == Input Errors ==
    /// Returns true when the error was caused by malformed caller input
    /// rather than by the store being unavailable.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            CacheError::InvalidKey(_)
                | CacheError::InvalidNamespace(_)
                | CacheError::UnsupportedValue(_)
                | CacheError::InvalidTtl(_)
        )
    }

    /// Returns true for errors describing a bad record on disk.
    pub fn is_record_error(&self) -> bool {
        matches!(
            self,
            CacheError::InvalidRecord(_) | CacheError::CorruptValue(_)
        )
    }
}

// == Result Type Alias ==
/// Convenience Result type for the file cache.
pub type Result<T> = std::result::Result<T, CacheError>;
