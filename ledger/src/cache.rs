//! Bounded, thread-safe LRU caches.

use crate::block::Block;
use arbor_cryptography::Digest;
use lru::LruCache;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::hash::Hash;

/// A least-recently-used cache guarded by a mutex.
///
/// Values are cloned out on reads so the lock is never held by callers.
pub struct Cache<K: Hash + Eq, V: Clone> {
    inner: Mutex<LruCache<K, V>>,
}

impl<K: Hash + Eq, V: Clone> Cache<K, V> {
    /// Create a cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity.max(1))),
        }
    }

    /// Get a copy of the value at `key`, marking it as recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().get(key).cloned()
    }

    /// Insert `value` at `key`, evicting the least recently used entry if full.
    pub fn put(&self, key: K, value: V) {
        self.inner.lock().put(key, value);
    }

    /// Remove `key`.
    pub fn remove(&self, key: &K) {
        self.inner.lock().pop(key);
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Caches of stored blocks, kept consistent with the store they mirror.
///
/// A reader that misses must hold [BlockCaches::fill] from the moment it reads the store until
/// it has filled the cache. A writer holds [BlockCaches::commit] while it writes to the store
/// and refreshes the caches, so that a reader can never insert a block older than the one
/// committed.
pub struct BlockCaches {
    /// Blocks with their transactions.
    pub blocks: Cache<Digest, Block>,
    /// Header-only blocks.
    pub headers: Cache<Digest, Block>,
    fence: RwLock<()>,
}

impl BlockCaches {
    pub fn new(block_cache_size: usize, header_cache_size: usize) -> Self {
        Self {
            blocks: Cache::new(block_cache_size),
            headers: Cache::new(header_cache_size),
            fence: RwLock::new(()),
        }
    }

    pub fn fill(&self) -> RwLockReadGuard<'_, ()> {
        self.fence.read()
    }

    pub fn commit(&self) -> RwLockWriteGuard<'_, ()> {
        self.fence.write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eviction() {
        let cache = Cache::new(2);
        cache.put(1u64, "one");
        cache.put(2, "two");
        assert_eq!(cache.get(&1), Some("one"));

        // 2 is now the least recently used entry
        cache.put(3, "three");
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some("one"));
        assert_eq!(cache.get(&3), Some("three"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = Cache::new(0);
        cache.put(1u64, 10u64);
        assert_eq!(cache.len(), 1);
        cache.remove(&1);
        assert!(cache.is_empty());

        cache.put(2, 20);
        cache.clear();
        assert!(cache.is_empty());
    }
}
