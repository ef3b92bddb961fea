//! Storage client reuse across node invocations.
//!
//! Owned by the host and passed in explicitly. Entries are keyed by credential identity
//! (`ResolvedCredentials::cache_key`: project, source and credential digest), evicted
//! least-recently-used beyond `capacity`, and dropped once idle for longer than
//! `idle_lifetime`.

use super::StorageDownloader;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

const DEFAULT_CAPACITY: usize = 16;
const DEFAULT_IDLE_LIFETIME: Duration = Duration::from_secs(30 * 60);

struct PoolEntry {
    client: Arc<dyn StorageDownloader>,
    last_used: Instant,
}

pub struct StorageClientPool {
    entries: Mutex<LruCache<String, PoolEntry>>,
    idle_lifetime: Duration,
}

impl Default for StorageClientPool {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_IDLE_LIFETIME)
    }
}

impl StorageClientPool {
    pub fn new(capacity: usize, idle_lifetime: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            idle_lifetime,
        }
    }

    /// Cached client for `key`, or a new one from `make`.
    pub fn get_or_insert_with<F>(&self, key: &str, make: F) -> Arc<dyn StorageDownloader>
    where
        F: FnOnce() -> Arc<dyn StorageDownloader>,
    {
        let now = Instant::now();
        let Ok(mut entries) = self.entries.lock() else {
            return make();
        };
        if let Some(entry) = entries.get_mut(key) {
            if now.duration_since(entry.last_used) <= self.idle_lifetime {
                entry.last_used = now;
                return entry.client.clone();
            }
            tracing::debug!(key, "storage client idle too long, replacing");
        }
        let client = make();
        entries.put(
            key.to_string(),
            PoolEntry {
                client: client.clone(),
                last_used: now,
            },
        );
        client
    }

    /// Drop the cached client for `key`, if any.
    pub fn evict(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|mut e| e.pop(key).is_some())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}
