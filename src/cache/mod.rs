//! Response cache with per-entry TTL
//!
//! Cached GET responses live behind the [`Cache`] trait. Engines are looked up
//! by name in a fixed registry ([`open_engine`]); `"file"` stores one file per
//! key on disk and `"memory"` keeps entries for the life of the process.
//!
//! A cache failure is never fatal: reads degrade to a miss and callers fall
//! through to the network.

mod file;
mod memory;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

use crate::config::CacheConfig;

pub use file::FileCache;
pub use memory::MemoryCache;

/// Errors raised by cache engines
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing the cache directory failed
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be serialized for storage
    #[error("Failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The configured engine name is not registered
    #[error("Unknown cache engine: '{0}'. Valid engines: file, memory")]
    UnknownEngine(String),

    /// No cache directory was configured and none could be determined
    #[error("No cache directory available")]
    NoCacheDir,
}

/// Default lifetime of a cache entry
pub fn default_ttl() -> Duration {
    Duration::minutes(2)
}

/// Key/value store with per-entry expiry
pub trait Cache: Send + Sync + std::fmt::Debug {
    /// Returns the stored value, or `None` when missing or expired.
    /// Expired entries are removed on the way.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` until `ttl` from now (the engine default when `None`)
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Removes an entry; missing entries are not an error
    fn delete(&self, key: &str) -> Result<(), CacheError>;

    fn contains(&self, key: &str) -> bool;

    /// Removes every expired entry, returning how many were removed.
    ///
    /// Sweeps only run during even-numbered minutes; at other times this
    /// returns `Ok(0)` without touching the store.
    fn gc(&self) -> Result<usize, CacheError>;

    /// Removes every entry
    fn clear(&self) -> Result<(), CacheError>;
}

impl<'a> dyn Cache + 'a {
    /// Reads and deserializes a value. Entries that no longer deserialize are
    /// dropped and reported as a miss.
    pub fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let text = self.get(key)?;
        match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "discarding unreadable cache entry");
                if let Err(e) = self.delete(key) {
                    warn!(key, error = %e, "failed to remove unreadable cache entry");
                }
                None
            }
        }
    }

    pub fn write_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let text = serde_json::to_string(value)?;
        self.set(key, &text, ttl)
    }
}

/// Derives the cache key for a request: SHA-256 of the URL followed by its
/// serialized query string, hex encoded
pub fn cache_key(url: &str, query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(query.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Whether a garbage-collection sweep may run at `now`
pub(crate) fn gc_window_open(now: DateTime<Utc>) -> bool {
    now.minute() % 2 == 0
}

/// Constructor for a registered engine
pub type EngineConstructor = fn(&CacheConfig) -> Result<Box<dyn Cache>, CacheError>;

const ENGINES: &[(&str, EngineConstructor)] = &[
    ("file", file::open_engine),
    ("memory", memory::open_engine),
];

/// Names of the registered engines
pub fn engines() -> impl Iterator<Item = &'static str> {
    ENGINES.iter().map(|(name, _)| *name)
}

/// Opens the engine named in `config.engine` (case-insensitive)
pub fn open_engine(config: &CacheConfig) -> Result<Box<dyn Cache>, CacheError> {
    let name = config.engine.to_ascii_lowercase();
    let (_, constructor) = ENGINES
        .iter()
        .find(|(engine, _)| *engine == name)
        .ok_or_else(|| CacheError::UnknownEngine(config.engine.clone()))?;
    constructor(config)
}
