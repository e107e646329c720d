//! Local TTL cache
//!
//! Entries expire a fixed time after they were written and are evicted
//! lazily, when a read finds them expired. Writes never fail from the
//! caller's point of view: a full disk or an unwritable directory only
//! costs a cache miss later.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

pub const DEFAULT_TTL_MINUTES: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    pub saved_at: DateTime<Utc>,
    pub value: V,
}

/// Where cache entries live
pub trait CacheBackend<V>: Send + Sync {
    fn load(&self, key: &str) -> Option<CacheEntry<V>>;
    fn store(&self, key: &str, entry: CacheEntry<V>) -> std::io::Result<()>;
    fn remove(&self, key: &str);
}

/// Process-local map
#[derive(Debug, Default)]
pub struct MemoryBackend<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V> MemoryBackend<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone + Send> CacheBackend<V> for MemoryBackend<V> {
    fn load(&self, key: &str) -> Option<CacheEntry<V>> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn store(&self, key: &str, entry: CacheEntry<V>) -> std::io::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| std::io::Error::other("cache lock poisoned"))?;
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }
}

/// One JSON file per entry under a cache directory
#[derive(Debug, Clone)]
pub struct DiskBackend {
    dir: PathBuf,
}

impl DiskBackend {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// `<user cache dir>/ofr`, if the platform has one
    pub fn default_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|d| d.join("ofr"))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        self.dir.join(format!("{:016x}.json", hasher.finish()))
    }
}

impl<V: Serialize + DeserializeOwned + Send> CacheBackend<V> for DiskBackend {
    fn load(&self, key: &str) -> Option<CacheEntry<V>> {
        let bytes = std::fs::read(self.path_for(key)).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Ignoring unreadable cache entry: {}", e);
                None
            }
        }
    }

    fn store(&self, key: &str, entry: CacheEntry<V>) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let bytes = serde_json::to_vec(&entry)?;
        std::fs::write(self.path_for(key), bytes)
    }

    fn remove(&self, key: &str) {
        let _ = std::fs::remove_file(self.path_for(key));
    }
}

pub struct TtlCache<V> {
    backend: Box<dyn CacheBackend<V>>,
    ttl: Duration,
}

impl<V> TtlCache<V> {
    pub fn new(backend: Box<dyn CacheBackend<V>>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Utc::now())
    }

    /// Look up `key` as of `now`, evicting it if it has expired
    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<V> {
        let entry = self.backend.load(key)?;
        if now - entry.saved_at > self.ttl {
            self.backend.remove(key);
            return None;
        }
        Some(entry.value)
    }

    pub fn insert(&self, key: &str, value: V) {
        self.insert_at(key, value, Utc::now());
    }

    pub fn insert_at(&self, key: &str, value: V, now: DateTime<Utc>) {
        let entry = CacheEntry {
            saved_at: now,
            value,
        };
        if let Err(e) = self.backend.store(key, entry) {
            debug!("Cache write for {} failed: {}", key, e);
        }
    }
}

impl<V: Clone + Send + 'static> TtlCache<V> {
    pub fn in_memory() -> Self {
        Self::new(
            Box::new(MemoryBackend::new()),
            Duration::minutes(DEFAULT_TTL_MINUTES),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn t(h: u32, m: u32, s: u32, ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, h, m, s).unwrap() + Duration::milliseconds(ms)
    }

    /// Backend that shares its map with the test so evictions are visible
    struct Shared(Arc<MemoryBackend<String>>);

    impl CacheBackend<String> for Shared {
        fn load(&self, key: &str) -> Option<CacheEntry<String>> {
            self.0.load(key)
        }
        fn store(&self, key: &str, entry: CacheEntry<String>) -> std::io::Result<()> {
            self.0.store(key, entry)
        }
        fn remove(&self, key: &str) {
            CacheBackend::<String>::remove(self.0.as_ref(), key)
        }
    }

    struct Failing;

    impl CacheBackend<String> for Failing {
        fn load(&self, _key: &str) -> Option<CacheEntry<String>> {
            None
        }
        fn store(&self, _key: &str, _entry: CacheEntry<String>) -> std::io::Result<()> {
            Err(std::io::Error::other("quota exceeded"))
        }
        fn remove(&self, _key: &str) {}
    }

    #[test]
    fn test_round_trip_within_ttl() {
        let cache = TtlCache::<String>::in_memory();
        cache.insert_at("hello", "world".to_string(), t(0, 0, 0, 0));
        assert_eq!(cache.get_at("hello", t(0, 9, 59, 0)).as_deref(), Some("world"));
    }

    #[test]
    fn test_missing_key() {
        let cache = TtlCache::<String>::in_memory();
        assert!(cache.get("does-not-exist").is_none());
    }

    #[test]
    fn test_expired_entry_is_evicted_on_read() {
        let map = Arc::new(MemoryBackend::new());
        let cache = TtlCache::new(
            Box::new(Shared(map.clone())),
            Duration::minutes(DEFAULT_TTL_MINUTES),
        );
        cache.insert_at("k", "v".to_string(), t(0, 0, 0, 0));
        assert_eq!(map.len(), 1);

        assert!(cache.get_at("k", t(0, 10, 0, 0)).is_some(), "exactly at TTL is still fresh");
        assert!(cache.get_at("k", t(0, 10, 0, 1)).is_none());
        assert!(map.is_empty(), "expired entry should be removed");
    }

    #[test]
    fn test_write_errors_are_swallowed() {
        let cache = TtlCache::new(Box::new(Failing), Duration::minutes(10));
        cache.insert("k", "v".to_string());
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_disk_backend_round_trip_and_bad_json() {
        let dir = std::env::temp_dir().join(format!("ofr-cache-test-{}", std::process::id()));
        let backend = DiskBackend::new(dir.clone());
        let cache: TtlCache<Vec<u32>> =
            TtlCache::new(Box::new(backend.clone()), Duration::minutes(10));

        cache.insert("https://example.test/a?b=1", vec![1, 2, 3]);
        assert_eq!(cache.get("https://example.test/a?b=1"), Some(vec![1, 2, 3]));

        std::fs::write(backend.path_for("bad"), b"{not-json").unwrap();
        assert!(cache.get("bad").is_none());

        let _ = std::fs::remove_dir_all(dir);
    }
}
