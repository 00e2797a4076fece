//! Block Metadata Cache (spec §4.5): a bounded LRU mapping block number to
//! block timestamp, owned exclusively by a single chain's `Poller` — no
//! cross-task sharing needed, so a plain `Mutex` (not an async one) around
//! an `lru::LruCache` is enough.
//!
//! Block timestamps are immutable facts about immutable blocks, so the
//! cache never needs invalidation: a reorg'd block is either refetched
//! under the same number with the same canonical timestamp, or it's a
//! different number entirely. Orphaned entries just age out of the LRU.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

pub struct BlockMetaCache {
    cache: Mutex<LruCache<u64, i64>>,
}

impl BlockMetaCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(100).unwrap());
        Self { cache: Mutex::new(LruCache::new(capacity)) }
    }

    fn get(&self, block_number: u64) -> Option<i64> {
        self.cache.lock().expect("cache lock poisoned").get(&block_number).copied()
    }

    fn insert(&self, block_number: u64, timestamp: i64) {
        self.cache.lock().expect("cache lock poisoned").put(block_number, timestamp);
    }

    pub fn len(&self) -> usize {
        self.cache.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cache hit returns immediately with no RPC call. On a miss, `fetch` is
    /// invoked (expected to be rate-budgeted by the caller, per spec §4.5)
    /// and the result is inserted, evicting the LRU entry if at capacity.
    pub async fn get_or_fetch<F, Fut, E>(&self, block_number: u64, fetch: F) -> Result<i64, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<i64, E>>,
    {
        if let Some(ts) = self.get(block_number) {
            return Ok(ts);
        }
        let ts = fetch().await?;
        self.insert(block_number, ts);
        Ok(ts)
    }
}
