//! Dedup Index (spec §4.3): "have I already persisted this log?"
//!
//! The store's unique constraint on `(chain_id, tx_hash, log_index)` is the
//! source of truth — this in-memory layer is a pre-check optimization, not
//! a correctness requirement. A miss here always falls through to the
//! store's `upsert`, which is idempotent regardless.
//!
//! One instance is owned per chain (natural keys already carry `chain_id`,
//! so there is no cross-chain collision risk, but keeping the index
//! per-poller avoids any cross-task contention per spec §5).

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::types::NaturalKey;

pub struct DedupIndex {
    seen: Mutex<LruCache<NaturalKey, Instant>>,
    ttl: Duration,
}

impl DedupIndex {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(4096).unwrap());
        Self { seen: Mutex::new(LruCache::new(capacity)), ttl }
    }

    /// Convenience constructor: TTL set to `2 * reorg_safety_blocks` seconds
    /// worth of wall time, as recommended in spec §4.3 (`TTL >= 2x
    /// REORG_SAFETY_BLOCKS in wall time`), assuming ~1 block/12s as a
    /// conservative upper bound on block time.
    pub fn for_reorg_window(capacity: usize, reorg_safety_blocks: u64) -> Self {
        let ttl_secs = 2 * reorg_safety_blocks * 12;
        Self::new(capacity, Duration::from_secs(ttl_secs.max(60)))
    }

    /// Safe to call with the same key twice. Returns `false` once the entry
    /// has aged out of its TTL, even if it is still physically present in
    /// the LRU — that just means the caller falls through to the store's
    /// unique constraint, which is always correct.
    pub fn is_known(&self, key: &NaturalKey) -> bool {
        let mut seen = self.seen.lock().expect("dedup lock poisoned");
        match seen.get(key) {
            Some(seen_at) => seen_at.elapsed() < self.ttl,
            None => false,
        }
    }

    pub fn mark_known(&self, key: NaturalKey) {
        self.seen.lock().expect("dedup lock poisoned").put(key, Instant::now());
    }

    pub fn len(&self) -> usize {
        self.seen.lock().expect("dedup lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(log_index: u64) -> NaturalKey {
        NaturalKey { chain_id: 1, tx_hash: "0xabc".into(), log_index }
    }

    #[test]
    fn unknown_key_returns_false() {
        let index = DedupIndex::new(16, Duration::from_secs(60));
        assert!(!index.is_known(&key(0)));
    }

    #[test]
    fn mark_known_is_idempotent() {
        let index = DedupIndex::new(16, Duration::from_secs(60));
        index.mark_known(key(0));
        index.mark_known(key(0));
        assert!(index.is_known(&key(0)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let index = DedupIndex::new(16, Duration::from_millis(1));
        index.mark_known(key(0));
        std::thread::sleep(Duration::from_millis(20));
        assert!(!index.is_known(&key(0)));
    }

    #[test]
    fn bounded_capacity_evicts_oldest() {
        let index = DedupIndex::new(2, Duration::from_secs(60));
        index.mark_known(key(0));
        index.mark_known(key(1));
        index.mark_known(key(2));
        assert_eq!(index.len(), 2);
        assert!(!index.is_known(&key(0)));
    }

    #[test]
    fn for_reorg_window_scales_ttl_with_safety_blocks() {
        let index = DedupIndex::for_reorg_window(16, 10);
        assert_eq!(index.ttl, Duration::from_secs(240));
    }
}
