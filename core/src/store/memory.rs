//! In-memory `TransferStore` used by tests to exercise the poller and query
//! facade without a live Postgres instance (spec §8 scenarios).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{PollError, QueryError};
use crate::types::{Direction, NaturalKey, StreamResult, Transfer};

use super::{TransferStore, MAX_BY_LIMIT, MAX_STREAM_LIMIT};

#[derive(Default)]
struct Inner {
    rows: Vec<Transfer>,
    by_key: HashMap<NaturalKey, usize>,
    checkpoints: HashMap<u64, u64>,
    next_id: i64,
    healthy: bool,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self { inner: Mutex::new(Inner { next_id: 1, healthy: true, ..Default::default() }) }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook to simulate the store going unavailable mid-run.
    pub fn set_healthy(&self, healthy: bool) {
        self.inner.lock().unwrap().healthy = healthy;
    }

    pub fn row_count(&self) -> usize {
        self.inner.lock().unwrap().rows.len()
    }
}

#[async_trait]
impl TransferStore for MemoryStore {
    async fn upsert(&self, mut transfer: Transfer) -> Result<Transfer, PollError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.healthy {
            return Err(PollError::TransientStore(sqlx::Error::PoolClosed));
        }

        let key = transfer.natural_key();
        if let Some(&idx) = inner.by_key.get(&key) {
            return Ok(inner.rows[idx].clone());
        }

        let id = inner.next_id;
        inner.next_id += 1;
        transfer.id = Some(id);
        inner.rows.push(transfer.clone());
        inner.by_key.insert(key, inner.rows.len() - 1);
        Ok(transfer)
    }

    async fn get_checkpoint(&self, chain_id: u64) -> Result<Option<u64>, PollError> {
        Ok(self.inner.lock().unwrap().checkpoints.get(&chain_id).copied())
    }

    async fn save_checkpoint(&self, chain_id: u64, block_number: u64) -> Result<(), PollError> {
        self.inner.lock().unwrap().checkpoints.insert(chain_id, block_number);
        Ok(())
    }

    async fn by_from(&self, chain_id: u64, addr: &str, limit: usize) -> Result<Vec<Transfer>, QueryError> {
        let limit = limit.min(MAX_BY_LIMIT);
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<Transfer> = inner
            .rows
            .iter()
            .filter(|t| t.chain_id == chain_id && t.from_addr == addr)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.block_timestamp.cmp(&a.block_timestamp).then(b.id.cmp(&a.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn by_to(&self, chain_id: u64, addr: &str, limit: usize) -> Result<Vec<Transfer>, QueryError> {
        let limit = limit.min(MAX_BY_LIMIT);
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<Transfer> = inner
            .rows
            .iter()
            .filter(|t| t.chain_id == chain_id && t.to_addr == addr)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.block_timestamp.cmp(&a.block_timestamp).then(b.id.cmp(&a.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn by_both(
        &self,
        chain_id: u64,
        from: &str,
        to: &str,
        limit: usize,
    ) -> Result<Vec<Transfer>, QueryError> {
        let limit = limit.min(MAX_BY_LIMIT);
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<Transfer> = inner
            .rows
            .iter()
            .filter(|t| t.chain_id == chain_id && t.from_addr == from && t.to_addr == to)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.block_timestamp.cmp(&a.block_timestamp).then(b.id.cmp(&a.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn stream(
        &self,
        chain_id: u64,
        addr: Option<&str>,
        direction: Direction,
        since_id: i64,
        limit: usize,
    ) -> Result<StreamResult, QueryError> {
        let limit = limit.min(MAX_STREAM_LIMIT);
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<Transfer> = inner
            .rows
            .iter()
            .filter(|t| {
                t.chain_id == chain_id
                    && t.id.map(|id| id > since_id).unwrap_or(false)
                    && match (addr, direction) {
                        (Some(a), Direction::From) => t.from_addr == a,
                        (Some(a), Direction::To) => t.to_addr == a,
                        (Some(a), Direction::Both) => t.from_addr == a || t.to_addr == a,
                        (None, _) => true,
                    }
            })
            .cloned()
            .collect();
        rows.sort_by_key(|t| t.id);

        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let next_since_id = rows.last().and_then(|t| t.id).unwrap_or(since_id);

        Ok(StreamResult { transfers: rows, next_since_id, has_more })
    }

    async fn is_healthy(&self) -> bool {
        self.inner.lock().unwrap().healthy
    }
}
