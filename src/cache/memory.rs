//! In-process cache engine

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use super::{default_ttl, gc_window_open, Cache, CacheError};
use crate::config::CacheConfig;

/// Keeps entries in a map for the lifetime of the process
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (i64, String)>>,
    default_ttl: Duration,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl: default_ttl(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn set_at(&self, key: &str, value: &str, ttl: Option<Duration>, now: DateTime<Utc>) {
        let expires_at = (now + ttl.unwrap_or(self.default_ttl)).timestamp();
        self.entries
            .lock()
            .insert(key.to_string(), (expires_at, value.to_string()));
    }

    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<String> {
        let mut entries = self.entries.lock();
        let (expires_at, value) = entries.get(key)?;
        if now.timestamp() >= *expires_at {
            entries.remove(key);
            return None;
        }
        Some(value.clone())
    }

    pub fn gc_at(&self, now: DateTime<Utc>) -> usize {
        if !gc_window_open(now) {
            return 0;
        }
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, (expires_at, _)| now.timestamp() < *expires_at);
        before - entries.len()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, Utc::now())
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.set_at(key, value, ttl, Utc::now());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    fn gc(&self) -> Result<usize, CacheError> {
        Ok(self.gc_at(Utc::now()))
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.entries.lock().clear();
        Ok(())
    }
}

/// Registry constructor for the `"memory"` engine
pub(super) fn open_engine(config: &CacheConfig) -> Result<Box<dyn Cache>, CacheError> {
    Ok(Box::new(MemoryCache::new().with_ttl(config.ttl)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn even_minute() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 15, 10, 42, 0).unwrap()
    }

    #[test]
    fn test_expiry() {
        let cache = MemoryCache::new();
        let now = even_minute();
        cache.set_at("k", "v", Some(Duration::seconds(60)), now);

        assert_eq!(cache.get_at("k", now).as_deref(), Some("v"));
        assert!(cache.get_at("k", now + Duration::seconds(60)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_gc_window() {
        let cache = MemoryCache::new();
        let written = even_minute() - Duration::minutes(5);
        cache.set_at("old", "v", Some(Duration::seconds(1)), written);
        cache.set_at("new", "v", Some(Duration::hours(1)), written);

        assert_eq!(cache.gc_at(even_minute() + Duration::minutes(1)), 0);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.gc_at(even_minute()), 1);
        assert!(cache.contains("new"));
    }

    #[test]
    fn test_delete_and_clear() {
        let cache = MemoryCache::new();
        cache.set("a", "1", None).unwrap();
        cache.set("b", "2", None).unwrap();

        cache.delete("a").unwrap();
        cache.delete("a").unwrap();
        assert!(!cache.contains("a"));

        cache.clear().unwrap();
        assert!(cache.is_empty());
    }
}
