//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::path::PathBuf;

use crate::cache::{DEFAULT_CACHE_NAME, DEFAULT_FILE_EXTENSION};

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Existing, writable directory holding every cache namespace
    pub storage_path: PathBuf,
    /// Namespace (sub-directory) of this cache
    pub cache_name: String,
    /// Number of nested shard directories below the namespace
    pub shard_levels: usize,
    /// Hash characters used to name each shard directory
    pub shard_width: usize,
    /// Write entries through a temporary file and rename; `false` overwrites in place
    pub atomic_writes: bool,
    /// Suffix of entry files
    pub file_extension: String,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_STORAGE_PATH` - Storage root (default: platform cache dir + `filecache`)
    /// - `CACHE_NAME` - Namespace (default: `simple-file-cache`)
    /// - `CACHE_SHARD_LEVELS` - Shard directory depth (default: 0)
    /// - `CACHE_SHARD_WIDTH` - Characters per shard directory (default: 1)
    /// - `CACHE_ATOMIC_WRITES` - `false`/`0` to overwrite entry files in place (default: true)
    /// - `CACHE_FILE_EXTENSION` - Entry file suffix (default: `.json`)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            storage_path: env::var("CACHE_STORAGE_PATH")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_path),
            cache_name: env::var("CACHE_NAME")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.cache_name),
            shard_levels: env::var("CACHE_SHARD_LEVELS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.shard_levels),
            shard_width: env::var("CACHE_SHARD_WIDTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.shard_width),
            atomic_writes: env::var("CACHE_ATOMIC_WRITES")
                .ok()
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.atomic_writes),
            file_extension: env::var("CACHE_FILE_EXTENSION")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.file_extension),
        }
    }

    /// Platform cache directory joined with `filecache`, or the temp dir
    /// when the platform has none.
    pub fn default_storage_path() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(env::temp_dir)
            .join("filecache")
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_path: Self::default_storage_path(),
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            shard_levels: 0,
            shard_width: 1,
            atomic_writes: true,
            file_extension: DEFAULT_FILE_EXTENSION.to_string(),
        }
    }
}
