use std::num::NonZeroUsize;

use lru::LruCache;

/// Default bound on the number of fingerprints retained.
pub const DEFAULT_FINGERPRINT_CAPACITY: usize = 10_000;

/// A bounded set of previously seen item keys, used to suppress duplicate
/// delivery across poll cycles when the remote store cannot acknowledge or
/// remove consumed items.
///
/// The set is an LRU capped at a fixed capacity rather than the unbounded
/// grow-until-stop set this pattern is usually built with. Once the capacity
/// is reached the least-recently-seen key is evicted, which means a
/// sufficiently old item can be redelivered; that is the trade taken against
/// unbounded memory growth. `reset` still clears everything and must be
/// called on consumer stop so a restart does not inherit stale state.
pub struct FingerprintTracker {
    keys: LruCache<String, ()>,
}

impl FingerprintTracker {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .unwrap_or_else(|| NonZeroUsize::new(DEFAULT_FINGERPRINT_CAPACITY).unwrap());

        Self {
            keys: LruCache::new(capacity),
        }
    }

    /// Whether the key has been remembered. Touching a key refreshes its
    /// recency, so keys that keep appearing in fetch results stay retained.
    pub fn seen(&mut self, key: &str) -> bool {
        self.keys.get(key).is_some()
    }

    pub fn remember(&mut self, key: &str) {
        self.keys.put(key.to_owned(), ());
    }

    pub fn reset(&mut self) {
        self.keys.clear();
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Default for FingerprintTracker {
    fn default() -> Self {
        Self::new(DEFAULT_FINGERPRINT_CAPACITY)
    }
}
