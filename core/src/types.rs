use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Natural key identity of a transfer: `(chain_id, tx_hash, log_index)`.
/// A second attempt to persist the same tuple must be a no-op, never a
/// duplicate row and never an error.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    pub chain_id: u64,
    pub tx_hash: String,
    pub log_index: u64,
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.chain_id, self.tx_hash, self.log_index)
    }
}

/// Downstream enrichment tag. Written by a separate collaborator, never by
/// this crate — persisted purely as a nullable passthrough column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapType {
    Fusion,
    FusionPlus,
    CryptoToFiat,
}

/// A single ERC20 `Transfer` log, decoded and persisted.
///
/// `id` is assigned by the store at persist time and is the cursor
/// pagination key; it is `None` until the store assigns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: Option<i64>,
    pub chain_id: u64,
    pub tx_hash: String,
    pub log_index: u64,
    pub token: String,
    pub from_addr: String,
    pub to_addr: String,
    pub value: String,
    pub block_number: u64,
    pub block_timestamp: i64,
    pub swap_type: Option<SwapType>,
}

impl Transfer {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            chain_id: self.chain_id,
            tx_hash: self.tx_hash.clone(),
            log_index: self.log_index,
        }
    }
}

/// Direction filter for reads: which address column(s) must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    From,
    To,
    Both,
}

/// A single entry of a `batch` query: an address plus its resume cursor.
#[derive(Debug, Clone)]
pub struct BatchQuery {
    pub addr: String,
    pub since_id: i64,
}

/// Result of a `stream` read: a page of transfers ordered by `id` ascending,
/// plus the cursor to resume from and whether more rows remain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamResult {
    pub transfers: Vec<Transfer>,
    pub next_since_id: i64,
    pub has_more: bool,
}

/// Durable per-chain resumption point. Every block `<= last_safe_block` has
/// had its `Transfer` logs persisted, modulo the reorg lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub chain_id: u64,
    pub last_safe_block: u64,
}

/// An event whose persistence failed transiently and is queued for retry.
#[derive(Debug, Clone)]
pub struct DlqItem {
    pub chain_id: u64,
    pub transfer: Transfer,
    pub first_error: String,
    pub first_seen_at: DateTime<Utc>,
    pub retry_count: u32,
}
