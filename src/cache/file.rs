//! File-backed cache engine
//!
//! One file per key inside the cache directory. The first line holds the
//! absolute expiry as a Unix timestamp, the rest of the file is the payload.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use directories::ProjectDirs;
use tempfile::Builder;
use tracing::{debug, warn};

use super::{default_ttl, gc_window_open, Cache, CacheError};
use crate::config::CacheConfig;

/// Extra read attempts when an entry looks half-written
const READ_RETRIES: usize = 3;

/// Pause between read attempts
const READ_RETRY_DELAY: StdDuration = StdDuration::from_millis(20);

/// Prefix of in-progress writes; never treated as entries
const TEMP_PREFIX: &str = ".tmp";

/// Stores cache entries as files in a directory
///
/// Writes go to a temporary file that is renamed over the entry, so
/// concurrent writers to the same key never interleave and readers see either
/// the old or the new entry.
#[derive(Debug, Clone)]
pub struct FileCache {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
    default_ttl: Duration,
}

impl FileCache {
    /// Default cache directory (`~/.cache/instaclient/` on Linux), if a home
    /// directory can be determined
    pub fn default_dir() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "instaclient")?;
        Some(project_dirs.cache_dir().to_path_buf())
    }

    /// Creates a cache over `cache_dir` without touching the filesystem
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            default_ttl: default_ttl(),
        }
    }

    /// Creates the directory if needed and runs a garbage-collection pass
    pub fn open(cache_dir: PathBuf) -> Result<Self, CacheError> {
        let cache = Self::with_dir(cache_dir);
        cache.ensure_dir()?;
        if let Err(e) = cache.gc() {
            warn!(dir = %cache.cache_dir.display(), error = %e, "cache gc failed");
        }
        Ok(cache)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the path to the cache file for the given key
    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(key)
    }

    /// Ensures the cache directory exists
    fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.cache_dir)
    }

    /// [`Cache::set`] with an explicit clock
    pub fn set_at(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        self.ensure_dir()?;

        let expires_at = now + ttl.unwrap_or(self.default_ttl);
        let mut file = Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&self.cache_dir)?;
        write!(file, "{}\n{}", expires_at.timestamp(), value)?;
        file.as_file().sync_all()?;
        file.persist(self.cache_path(key)).map_err(|e| e.error)?;

        debug!(key, expires_at = expires_at.timestamp(), "cache entry stored");
        Ok(())
    }

    /// [`Cache::get`] with an explicit clock
    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<String> {
        let content = self.read_entry(key)?;
        let (expires_at, payload) = parse_entry(&content)?;

        if now.timestamp() >= expires_at {
            debug!(key, "cache entry expired");
            if let Err(e) = self.delete(key) {
                warn!(key, error = %e, "failed to remove expired cache entry");
            }
            return None;
        }

        debug!(key, "cache hit");
        Some(payload.to_string())
    }

    /// [`Cache::gc`] with an explicit clock
    pub fn gc_at(&self, now: DateTime<Utc>) -> Result<usize, CacheError> {
        if !gc_window_open(now) {
            return Ok(0);
        }

        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            if !is_entry_file(&entry) {
                continue;
            }
            let path = entry.path();
            // Another process may have removed it already
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            let expired = parse_entry(&content)
                .map_or(true, |(expires_at, _)| now.timestamp() >= expires_at);
            if expired && remove(&path)? {
                removed += 1;
            }
        }

        debug!(dir = %self.cache_dir.display(), removed, "cache gc finished");
        Ok(removed)
    }

    /// Reads an entry, retrying while it looks half-written
    fn read_entry(&self, key: &str) -> Option<String> {
        let path = self.cache_path(key);

        for attempt in 0..=READ_RETRIES {
            match fs::read_to_string(&path) {
                Ok(content) if content.contains('\n') => return Some(content),
                Ok(_) => debug!(key, attempt, "cache entry incomplete"),
                Err(e) if e.kind() == ErrorKind::NotFound => return None,
                Err(e) => debug!(key, attempt, error = %e, "cache read failed"),
            }
            if attempt < READ_RETRIES {
                thread::sleep(READ_RETRY_DELAY);
            }
        }

        warn!(key, "giving up on unreadable cache entry");
        None
    }
}

impl Cache for FileCache {
    fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, Utc::now())
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.set_at(key, value, ttl, Utc::now())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        remove(&self.cache_path(key))?;
        Ok(())
    }

    fn contains(&self, key: &str) -> bool {
        self.cache_path(key).is_file()
    }

    fn gc(&self) -> Result<usize, CacheError> {
        self.gc_at(Utc::now())
    }

    fn clear(&self) -> Result<(), CacheError> {
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if is_entry_file(&entry) {
                remove(&entry.path())?;
            }
        }
        Ok(())
    }
}

/// Registry constructor for the `"file"` engine
pub(super) fn open_engine(config: &CacheConfig) -> Result<Box<dyn Cache>, CacheError> {
    let dir = config.resolved_dir().ok_or(CacheError::NoCacheDir)?;
    Ok(Box::new(FileCache::open(dir)?.with_ttl(config.ttl)))
}

/// Splits an entry into its expiry timestamp and payload
fn parse_entry(content: &str) -> Option<(i64, &str)> {
    let (expires_at, payload) = content.split_once('\n')?;
    let expires_at = expires_at.trim().parse().ok()?;
    Some((expires_at, payload))
}

fn is_entry_file(entry: &fs::DirEntry) -> bool {
    let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
    is_file && !entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX)
}

/// Removes a file, returning whether it existed
fn remove(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
