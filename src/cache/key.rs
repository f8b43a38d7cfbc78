//! Cache Key Module
//!
//! Validated key and namespace types. Both are checked before any
//! filesystem interaction so malformed input never causes partial writes.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::cache::{DEFAULT_CACHE_NAME, MAX_KEY_LENGTH, MAX_NAMESPACE_LENGTH};
use crate::error::{CacheError, Result};

/// True if `key` is 1-64 characters of `[A-Za-z0-9_.]`.
pub fn is_valid_key(key: &str) -> bool {
    (1..=MAX_KEY_LENGTH).contains(&key.len())
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.')
}

/// True if `name` is 1-64 characters of `[A-Za-z0-9_-]`.
pub fn is_valid_namespace(name: &str) -> bool {
    (1..=MAX_NAMESPACE_LENGTH).contains(&name.len())
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

// == Cache Key ==
/// A key that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Validates `key`, failing with [`CacheError::InvalidKey`].
    pub fn parse(key: &str) -> Result<Self> {
        if is_valid_key(key) {
            Ok(Self(key.to_string()))
        } else {
            Err(CacheError::InvalidKey(key.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase hex SHA-256 of the key. Always 64 characters.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CacheKey {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// == Namespace ==
/// A cache name that passed validation; names a directory under the storage root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    /// Validates `name`, failing with [`CacheError::InvalidNamespace`].
    pub fn parse(name: &str) -> Result<Self> {
        if is_valid_namespace(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(CacheError::InvalidNamespace(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self(DEFAULT_CACHE_NAME.to_string())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Namespace {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
