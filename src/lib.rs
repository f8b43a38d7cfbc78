//! Filecache - A persistent filesystem-backed key/value cache
//!
//! Stores one JSON record per key under `<storage root>/<cache name>/`,
//! with per-entry TTL expiration enforced lazily on read.

pub mod cache;
pub mod config;
pub mod error;
pub mod fs;

pub use cache::{AsyncFileCache, CacheValue, FileCache, FileCacheBuilder, Sharding, Ttl};
pub use config::Config;
pub use error::{CacheError, Result};
