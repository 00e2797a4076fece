//! Query Facade (spec §4.9, §6.2): stateless read operations over the
//! Transfer Store. Accepts addresses in any case, validates and lowercases
//! them, and enforces the read-path limit caps before ever touching the
//! store — reader mistakes come back as a structured `QueryError`, never a
//! panic or a half-applied query.

use std::collections::HashMap;

use alloy::primitives::Address;

use crate::error::QueryError;
use crate::store::{self, TransferStore, MAX_BATCH_LIMIT, MAX_BATCH_QUERIES, MAX_BY_LIMIT, MAX_STREAM_LIMIT};
use crate::types::{BatchQuery, Direction, StreamResult, Transfer};

/// Parse and lowercase an address argument. Any case is accepted; anything
/// that doesn't parse as a 20-byte hex address is rejected (spec §6.2).
fn normalize_address(addr: &str) -> Result<String, QueryError> {
    addr.parse::<Address>()
        .map(|a| format!("{a:#x}"))
        .map_err(|_| QueryError::InvalidAddress(addr.to_string()))
}

fn check_limit(requested: usize, cap: usize) -> Result<usize, QueryError> {
    if requested > cap {
        Err(QueryError::LimitTooLarge { requested, cap })
    } else {
        Ok(requested)
    }
}

pub struct QueryFacade {
    store: std::sync::Arc<dyn TransferStore>,
}

impl QueryFacade {
    pub fn new(store: std::sync::Arc<dyn TransferStore>) -> Self {
        Self { store }
    }

    pub async fn by_from(&self, chain_id: u64, addr: &str, limit: usize) -> Result<Vec<Transfer>, QueryError> {
        let addr = normalize_address(addr)?;
        let limit = check_limit(limit, MAX_BY_LIMIT)?;
        self.store.by_from(chain_id, &addr, limit).await
    }

    pub async fn by_to(&self, chain_id: u64, addr: &str, limit: usize) -> Result<Vec<Transfer>, QueryError> {
        let addr = normalize_address(addr)?;
        let limit = check_limit(limit, MAX_BY_LIMIT)?;
        self.store.by_to(chain_id, &addr, limit).await
    }

    pub async fn by_both(
        &self,
        chain_id: u64,
        from: &str,
        to: &str,
        limit: usize,
    ) -> Result<Vec<Transfer>, QueryError> {
        let from = normalize_address(from)?;
        let to = normalize_address(to)?;
        let limit = check_limit(limit, MAX_BY_LIMIT)?;
        self.store.by_both(chain_id, &from, &to, limit).await
    }

    /// Union of `by_from` and `by_to`, deduplicated by id, sorted by
    /// `block_timestamp DESC` (spec §4.2, §6.2).
    pub async fn by_address(&self, chain_id: u64, addr: &str, limit: usize) -> Result<Vec<Transfer>, QueryError> {
        let addr = normalize_address(addr)?;
        let limit = check_limit(limit, MAX_BY_LIMIT)?;
        store::by_address(self.store.as_ref(), chain_id, &addr, limit).await
    }

    pub async fn stream(
        &self,
        chain_id: u64,
        addr: Option<&str>,
        direction: Direction,
        since_id: i64,
        limit: usize,
    ) -> Result<StreamResult, QueryError> {
        let addr = addr.map(normalize_address).transpose()?;
        let limit = check_limit(limit, MAX_STREAM_LIMIT)?;
        self.store.stream(chain_id, addr.as_deref(), direction, since_id, limit).await
    }

    /// Executed concurrently per address, capped at `MAX_BATCH_QUERIES`
    /// entries and `MAX_BATCH_LIMIT` per-address page size (spec §4.2,
    /// §6.2).
    pub async fn batch(
        &self,
        chain_id: u64,
        queries: Vec<(String, i64)>,
        direction: Direction,
        limit: usize,
    ) -> Result<HashMap<String, StreamResult>, QueryError> {
        if queries.len() > MAX_BATCH_QUERIES {
            return Err(QueryError::BatchTooLarge { requested: queries.len(), cap: MAX_BATCH_QUERIES });
        }
        let limit = check_limit(limit, MAX_BATCH_LIMIT)?;

        let normalized = queries
            .into_iter()
            .map(|(addr, since_id)| normalize_address(&addr).map(|addr| BatchQuery { addr, since_id }))
            .collect::<Result<Vec<_>, _>>()?;

        store::batch(self.store.as_ref(), chain_id, normalized, direction, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;

    fn sample(chain_id: u64, log_index: u64, from: &str, to: &str, ts: i64) -> Transfer {
        Transfer {
            id: None,
            chain_id,
            tx_hash: format!("0x{log_index:064x}"),
            log_index,
            token: "0xtoken".into(),
            from_addr: from.into(),
            to_addr: to.into(),
            value: "0x1".into(),
            block_number: 100 + log_index,
            block_timestamp: ts,
            swap_type: None,
        }
    }

    fn facade() -> (QueryFacade, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (QueryFacade::new(store.clone()), store)
    }

    #[tokio::test]
    async fn invalid_address_is_rejected() {
        let (facade, _store) = facade();
        let err = facade.by_from(1, "not-an-address", 10).await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn limit_above_cap_is_rejected() {
        let (facade, _store) = facade();
        let addr = "0xffffffffffffffffffffffffffffffffffffff";
        let err = facade.by_from(1, addr, 5000).await.unwrap_err();
        assert!(matches!(err, QueryError::LimitTooLarge { .. }));
    }

    #[tokio::test]
    async fn address_case_is_normalized_before_lookup() {
        let (facade, store) = facade();
        let lower = "0xffffffffffffffffffffffffffffffffffffff";
        store.upsert(sample(1, 0, lower, "0xother", 10)).await.unwrap();

        let upper = "0xFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF";
        let rows = facade.by_from(1, upper, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn batch_rejects_more_than_cap_queries() {
        let (facade, _store) = facade();
        let addr = "0xffffffffffffffffffffffffffffffffffffff".to_string();
        let queries = vec![(addr, 0); MAX_BATCH_QUERIES + 1];
        let err = facade.batch(1, queries, Direction::Both, 10).await.unwrap_err();
        assert!(matches!(err, QueryError::BatchTooLarge { .. }));
    }
}
