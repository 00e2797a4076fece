//! Transfer Store (spec §4.2): durable, ordered, uniquely-keyed persistence
//! plus the indexed reads the Query Facade needs.
//!
//! Defined as a trait so the ingestion and read paths can be exercised
//! against an in-memory implementation in tests without a live database —
//! the same seam the pack uses to parametrize indexer logic over a generic
//! `Provider`/`DatabaseConnection` (see `blockscout` `base_indexer.rs`'s
//! `Indexer<P: Provider, L: IndexerLogic>`).

pub mod postgres;

#[cfg(any(test, feature = "test-util"))]
pub mod memory;

use async_trait::async_trait;

use crate::error::{PollError, QueryError};
use crate::types::{BatchQuery, Direction, StreamResult, Transfer};

/// Hard cap on `by_*` result sets (spec §4.2).
pub const MAX_BY_LIMIT: usize = 1000;
/// Hard cap on a single `stream` call's page size (spec §4.2, §6.2).
pub const MAX_STREAM_LIMIT: usize = 1000;
/// Hard cap on a single `batch` call's per-address page size (spec §6.2).
pub const MAX_BATCH_LIMIT: usize = 100;
/// Hard cap on the number of addresses in one `batch` call (spec §4.2).
pub const MAX_BATCH_QUERIES: usize = 500;

#[async_trait]
pub trait TransferStore: Send + Sync {
    /// Insert a transfer, or no-op if its natural key already exists.
    /// Returns the persisted row (with its assigned `id`) either way —
    /// `upsert(r); upsert(r)` must yield the same id both times.
    async fn upsert(&self, transfer: Transfer) -> Result<Transfer, PollError>;

    async fn get_checkpoint(&self, chain_id: u64) -> Result<Option<u64>, PollError>;

    /// Must be durable before returning (spec §4.6).
    async fn save_checkpoint(&self, chain_id: u64, block_number: u64) -> Result<(), PollError>;

    /// Rows sorted by `block_timestamp DESC`, ties broken by `id DESC`.
    /// `addr` must already be lowercased by the caller.
    async fn by_from(&self, chain_id: u64, addr: &str, limit: usize) -> Result<Vec<Transfer>, QueryError>;
    async fn by_to(&self, chain_id: u64, addr: &str, limit: usize) -> Result<Vec<Transfer>, QueryError>;
    async fn by_both(
        &self,
        chain_id: u64,
        from: &str,
        to: &str,
        limit: usize,
    ) -> Result<Vec<Transfer>, QueryError>;

    /// Rows with `id > since_id`, ordered by `id` ascending. Fetches
    /// `limit + 1` internally and derives `has_more` from the extra row
    /// (spec §4.2).
    async fn stream(
        &self,
        chain_id: u64,
        addr: Option<&str>,
        direction: Direction,
        since_id: i64,
        limit: usize,
    ) -> Result<StreamResult, QueryError>;

    /// Whether the store is currently able to accept writes. The poller
    /// checks this before starting a tick (spec §4.1).
    async fn is_healthy(&self) -> bool;
}

/// Union of `by_from` and `by_to`, deduplicated by id, sorted by
/// `block_timestamp DESC` (ties by `id DESC`). Implemented once here in
/// terms of the trait's required methods so every backend gets it for free.
pub async fn by_address(
    store: &dyn TransferStore,
    chain_id: u64,
    addr: &str,
    limit: usize,
) -> Result<Vec<Transfer>, QueryError> {
    let (from_rows, to_rows) =
        futures::try_join!(store.by_from(chain_id, addr, limit), store.by_to(chain_id, addr, limit))?;

    let mut merged = std::collections::HashMap::new();
    for row in from_rows.into_iter().chain(to_rows) {
        if let Some(id) = row.id {
            merged.entry(id).or_insert(row);
        }
    }

    let mut rows: Vec<Transfer> = merged.into_values().collect();
    rows.sort_by(|a, b| b.block_timestamp.cmp(&a.block_timestamp).then(b.id.cmp(&a.id)));
    rows.truncate(limit);
    Ok(rows)
}

/// Executes every sub-query concurrently, capped at `MAX_BATCH_QUERIES`
/// entries per call (spec §4.2, §6.2).
pub async fn batch(
    store: &dyn TransferStore,
    chain_id: u64,
    queries: Vec<BatchQuery>,
    direction: Direction,
    limit: usize,
) -> Result<std::collections::HashMap<String, StreamResult>, QueryError> {
    if queries.len() > MAX_BATCH_QUERIES {
        return Err(QueryError::BatchTooLarge { requested: queries.len(), cap: MAX_BATCH_QUERIES });
    }

    let futs = queries.into_iter().map(|q| async move {
        let result = store.stream(chain_id, Some(&q.addr), direction, q.since_id, limit).await;
        result.map(|r| (q.addr, r))
    });

    let results = futures::future::try_join_all(futs).await?;
    Ok(results.into_iter().collect())
}
