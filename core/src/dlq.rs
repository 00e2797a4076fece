//! Dead Letter Queue (spec §4.7): bounded in-memory retry queue for
//! transiently-failed persistence attempts. Not persistent by design — a
//! crashed DLQ loses at most the items it was holding, which the next
//! poll cycle re-fetches and re-persists via the checkpoint lookback
//! window (spec §9 open question 4).

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::Utc;
use tracing::warn;

use crate::types::{DlqItem, Transfer};

pub struct DeadLetterQueue {
    items: Mutex<VecDeque<DlqItem>>,
    capacity: usize,
    max_retries: u32,
}

impl DeadLetterQueue {
    pub fn new(capacity: usize, max_retries: u32) -> Self {
        Self { items: Mutex::new(VecDeque::with_capacity(capacity.min(1024))), capacity, max_retries }
    }

    /// Enqueue a transfer whose persistence failed transiently. On overflow,
    /// the oldest item is evicted to make room (spec §4.7).
    pub fn enqueue(&self, chain_id: u64, transfer: Transfer, error: String) {
        let mut items = self.items.lock().expect("dlq lock poisoned");
        if items.len() >= self.capacity {
            if let Some(dropped) = items.pop_front() {
                warn!(
                    chain_id = dropped.chain_id,
                    natural_key = %dropped.transfer.natural_key(),
                    "DLQ at capacity, evicting oldest item"
                );
            }
        }
        items.push_back(DlqItem {
            chain_id,
            transfer,
            first_error: error,
            first_seen_at: Utc::now(),
            retry_count: 0,
        });
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("dlq lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain a snapshot of the current queue for the retry loop to process.
    /// Items are removed here; callers that still want them retried must
    /// re-enqueue via [`Self::requeue`].
    fn drain_snapshot(&self) -> Vec<DlqItem> {
        let mut items = self.items.lock().expect("dlq lock poisoned");
        items.drain(..).collect()
    }

    fn requeue(&self, item: DlqItem) {
        self.items.lock().expect("dlq lock poisoned").push_back(item);
    }

    /// Run one retry pass: attempt each item via `retry_one`; items that
    /// succeed are dropped, items that fail have `retry_count` incremented
    /// and are requeued unless they've hit `max_retries`, in which case
    /// they're dropped and logged (spec §4.7).
    pub async fn retry_pass<F, Fut>(&self, retry_one: F) -> DlqRetryStats
    where
        F: Fn(Transfer) -> Fut,
        Fut: std::future::Future<Output = Result<(), String>>,
    {
        let snapshot = self.drain_snapshot();
        let mut stats = DlqRetryStats::default();

        for mut item in snapshot {
            match retry_one(item.transfer.clone()).await {
                Ok(()) => {
                    stats.succeeded += 1;
                    crate::metrics::transfer_persisted(item.chain_id);
                }
                Err(e) => {
                    item.retry_count += 1;
                    if item.retry_count >= self.max_retries {
                        warn!(
                            chain_id = item.chain_id,
                            natural_key = %item.transfer.natural_key(),
                            retry_count = item.retry_count,
                            first_error = %item.first_error,
                            last_error = %e,
                            "DLQ item exhausted retry budget, dropping"
                        );
                        stats.dropped += 1;
                        crate::metrics::dlq_dropped(item.chain_id);
                    } else {
                        stats.requeued += 1;
                        self.requeue(item);
                    }
                }
            }
        }

        crate::metrics::dlq_depth(self.len());
        stats
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DlqRetryStats {
    pub succeeded: usize,
    pub requeued: usize,
    pub dropped: usize,
}

#[cfg(test)]
fn sample_transfer(log_index: u64) -> Transfer {
    Transfer {
        id: None,
        chain_id: 1,
        tx_hash: "0xdead".into(),
        log_index,
        token: "0xtoken".into(),
        from_addr: "0xfrom".into(),
        to_addr: "0xto".into(),
        value: "0x1".into(),
        block_number: 100,
        block_timestamp: 0,
        swap_type: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn enqueue_respects_capacity_with_oldest_eviction() {
        let dlq = DeadLetterQueue::new(2, 3);
        dlq.enqueue(1, sample_transfer(0), "e0".into());
        dlq.enqueue(1, sample_transfer(1), "e1".into());
        dlq.enqueue(1, sample_transfer(2), "e2".into());
        assert_eq!(dlq.len(), 2);
    }

    #[tokio::test]
    async fn retry_pass_drops_on_success() {
        let dlq = DeadLetterQueue::new(10, 3);
        dlq.enqueue(1, sample_transfer(0), "boom".into());

        let stats = dlq.retry_pass(|_| async { Ok(()) }).await;
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.requeued, 0);
        assert!(dlq.is_empty());
    }

    #[tokio::test]
    async fn retry_pass_requeues_until_max_retries_then_drops() {
        let dlq = DeadLetterQueue::new(10, 2);
        dlq.enqueue(1, sample_transfer(0), "boom".into());

        let attempts = AtomicUsize::new(0);
        let stats1 = dlq
            .retry_pass(|_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err("still down".to_string()) }
            })
            .await;
        assert_eq!(stats1.requeued, 1);
        assert_eq!(dlq.len(), 1);

        let stats2 = dlq.retry_pass(|_| async { Err("still down".to_string()) }).await;
        assert_eq!(stats2.dropped, 1);
        assert!(dlq.is_empty());
    }
}
