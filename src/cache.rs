use leptos::logging::log;
use lru::LruCache;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::config::DEFAULT_CACHE_CAPACITY;
use crate::query::BookFilter;

/// Cache key for a single book page.
pub fn book_cache_key(id: i64) -> String {
    format!("book:{}", id)
}

/// Cache key for a listing.
pub fn books_cache_key(filter: BookFilter, title: &str) -> String {
    format!("books:{}:{}", filter, title.trim())
}

/// Key-value cache the service reads through and invalidates on writes.
pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn put(&self, key: &str, value: Value, ttl: Duration);

    /// Drops `key`. Returns whether an entry was present.
    fn forget(&self, key: &str) -> bool;
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

/// In-process cache bounded to a fixed number of entries.
///
/// When full, the least recently used entry is dropped to make room. Expired
/// entries are evicted when they are read.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<LruCache<String, Entry>>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl MemoryCache {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A poisoned lock still holds a usable map.
    fn lock(&self) -> MutexGuard<'_, LruCache<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.lock();
        let live = entries
            .get(key)
            .map(|entry| (Instant::now() < entry.expires_at, entry.value.clone()));
        match live {
            Some((true, value)) => Some(value),
            Some((false, _)) => {
                entries.pop(key);
                log!("[CACHE] Expired {}", key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: &str, value: Value, ttl: Duration) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        if let Some((evicted, _)) = self.lock().push(key.to_string(), entry) {
            if evicted != key {
                log!("[CACHE] Evicted {}", evicted);
            }
        }
    }

    fn forget(&self, key: &str) -> bool {
        let removed = self.lock().pop(key).is_some();
        log!("[CACHE] Forget {} (present: {})", key, removed);
        removed
    }
}
