//! Cache Module
//!
//! Persistent filesystem-backed caching with per-entry TTL expiration.

mod async_cache;
mod clock;
mod codec;
mod entry;
mod key;
mod maintenance;
mod stats;
mod store;
mod value;


// Re-export public types
pub use async_cache::AsyncFileCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{CodecError, JsonObjectCodec, ObjectCodec};
pub use entry::{decode, is_valid, Decoded, EntryRecord, Ttl, SCHEMA_VERSION};
pub use key::{is_valid_key, is_valid_namespace, CacheKey, Namespace};
pub use maintenance::{EntryInfo, PruneReport};
pub use stats::CacheStats;
pub use store::{FileCache, FileCacheBuilder, Sharding};
pub use value::{CacheValue, ValueKind};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 64;

/// Maximum allowed namespace length in bytes
pub const MAX_NAMESPACE_LENGTH: usize = 64;

/// Namespace used when none is configured
pub const DEFAULT_CACHE_NAME: &str = "simple-file-cache";

/// Suffix of entry files
pub const DEFAULT_FILE_EXTENSION: &str = ".json";

/// Length of the hex key digest that names entry files
pub const DIGEST_LENGTH: usize = 64;

/// Suffix of in-flight atomic write files
pub const TEMP_FILE_SUFFIX: &str = ".tmp";
