//! PostgreSQL-backed `TransferStore` (spec §4.2, §6.3). Grounded on the
//! `sqlx::PgPool` usage throughout the pack's indexer examples (`poller.rs`,
//! `chain.rs`): dynamic `sqlx::query`/`query_as`, no compile-time query
//! macros (those require a live `DATABASE_URL` at build time, which this
//! workspace cannot assume).

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::error::{IndexerError, PollError, QueryError};
use crate::types::{Direction, StreamResult, SwapType, Transfer};

use super::{TransferStore, MAX_BY_LIMIT, MAX_STREAM_LIMIT};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self, IndexerError> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await
            .map_err(|e| IndexerError::StoreUnavailable(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Verify schema/indexes exist, creating them if absent (spec §4.8 step
    /// 1). Safe to call on every boot — every statement is `IF NOT EXISTS`.
    pub async fn ensure_schema(&self) -> Result<(), IndexerError> {
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| {
            IndexerError::SchemaInit(sqlx::Error::Migrate(Box::new(e)))
        })
    }

    fn row_to_transfer(row: &sqlx::postgres::PgRow) -> Result<Transfer, sqlx::Error> {
        let swap_type: Option<String> = row.try_get("swap_type")?;
        Ok(Transfer {
            id: Some(row.try_get::<i64, _>("id")?),
            chain_id: row.try_get::<i64, _>("chain_id")? as u64,
            tx_hash: row.try_get("tx_hash")?,
            log_index: row.try_get::<i64, _>("log_index")? as u64,
            token: row.try_get("token")?,
            from_addr: row.try_get("from_addr")?,
            to_addr: row.try_get("to_addr")?,
            value: row.try_get("value")?,
            block_number: row.try_get::<i64, _>("block_number")? as u64,
            block_timestamp: row.try_get("block_timestamp")?,
            swap_type: swap_type.and_then(|s| parse_swap_type(&s)),
        })
    }
}

fn parse_swap_type(s: &str) -> Option<SwapType> {
    match s {
        "fusion" => Some(SwapType::Fusion),
        "fusion_plus" => Some(SwapType::FusionPlus),
        "crypto_to_fiat" => Some(SwapType::CryptoToFiat),
        _ => None,
    }
}

fn swap_type_str(swap_type: Option<SwapType>) -> Option<&'static str> {
    swap_type.map(|s| match s {
        SwapType::Fusion => "fusion",
        SwapType::FusionPlus => "fusion_plus",
        SwapType::CryptoToFiat => "crypto_to_fiat",
    })
}

fn classify_store_error(e: sqlx::Error) -> PollError {
    match &e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            PollError::TransientStore(e)
        }
        _ => PollError::PermanentStore(e),
    }
}

#[async_trait]
impl TransferStore for PostgresStore {
    async fn upsert(&self, transfer: Transfer) -> Result<Transfer, PollError> {
        // The `DO UPDATE SET chain_id = transfers.chain_id` is a no-op
        // write that exists purely to make `RETURNING` fire on conflict
        // too, so a duplicate natural key returns the *existing* row
        // (same id, no reassignment) instead of nothing.
        let row = sqlx::query(
            r#"
            INSERT INTO transfers
                (chain_id, tx_hash, log_index, token, from_addr, to_addr, value,
                 block_number, block_timestamp, swap_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (chain_id, tx_hash, log_index)
            DO UPDATE SET chain_id = transfers.chain_id
            RETURNING id, chain_id, tx_hash, log_index, token, from_addr, to_addr,
                      value, block_number, block_timestamp, swap_type
            "#,
        )
        .bind(transfer.chain_id as i64)
        .bind(&transfer.tx_hash)
        .bind(transfer.log_index as i64)
        .bind(&transfer.token)
        .bind(&transfer.from_addr)
        .bind(&transfer.to_addr)
        .bind(&transfer.value)
        .bind(transfer.block_number as i64)
        .bind(transfer.block_timestamp)
        .bind(swap_type_str(transfer.swap_type))
        .fetch_one(&self.pool)
        .await
        .map_err(classify_store_error)?;

        Self::row_to_transfer(&row).map_err(classify_store_error)
    }

    async fn get_checkpoint(&self, chain_id: u64) -> Result<Option<u64>, PollError> {
        let row = sqlx::query("SELECT last_safe_block FROM checkpoints WHERE chain_id = $1")
            .bind(chain_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_store_error)?;

        Ok(row.map(|r| r.get::<i64, _>("last_safe_block") as u64))
    }

    async fn save_checkpoint(&self, chain_id: u64, block_number: u64) -> Result<(), PollError> {
        sqlx::query(
            r#"
            INSERT INTO checkpoints (chain_id, last_safe_block)
            VALUES ($1, $2)
            ON CONFLICT (chain_id) DO UPDATE SET last_safe_block = $2
            "#,
        )
        .bind(chain_id as i64)
        .bind(block_number as i64)
        .execute(&self.pool)
        .await
        .map_err(classify_store_error)?;

        Ok(())
    }

    async fn by_from(&self, chain_id: u64, addr: &str, limit: usize) -> Result<Vec<Transfer>, QueryError> {
        let limit = limit.min(MAX_BY_LIMIT);
        let rows = sqlx::query(
            r#"
            SELECT id, chain_id, tx_hash, log_index, token, from_addr, to_addr,
                   value, block_number, block_timestamp, swap_type
            FROM transfers
            WHERE chain_id = $1 AND from_addr = $2
            ORDER BY block_timestamp DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(chain_id as i64)
        .bind(addr)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| QueryError::Store(e.to_string()))?;

        rows.iter().map(Self::row_to_transfer).collect::<Result<_, _>>().map_err(|e| QueryError::Store(e.to_string()))
    }

    async fn by_to(&self, chain_id: u64, addr: &str, limit: usize) -> Result<Vec<Transfer>, QueryError> {
        let limit = limit.min(MAX_BY_LIMIT);
        let rows = sqlx::query(
            r#"
            SELECT id, chain_id, tx_hash, log_index, token, from_addr, to_addr,
                   value, block_number, block_timestamp, swap_type
            FROM transfers
            WHERE chain_id = $1 AND to_addr = $2
            ORDER BY block_timestamp DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(chain_id as i64)
        .bind(addr)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| QueryError::Store(e.to_string()))?;

        rows.iter().map(Self::row_to_transfer).collect::<Result<_, _>>().map_err(|e| QueryError::Store(e.to_string()))
    }

    async fn by_both(
        &self,
        chain_id: u64,
        from: &str,
        to: &str,
        limit: usize,
    ) -> Result<Vec<Transfer>, QueryError> {
        let limit = limit.min(MAX_BY_LIMIT);
        let rows = sqlx::query(
            r#"
            SELECT id, chain_id, tx_hash, log_index, token, from_addr, to_addr,
                   value, block_number, block_timestamp, swap_type
            FROM transfers
            WHERE chain_id = $1 AND from_addr = $2 AND to_addr = $3
            ORDER BY block_timestamp DESC, id DESC
            LIMIT $4
            "#,
        )
        .bind(chain_id as i64)
        .bind(from)
        .bind(to)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| QueryError::Store(e.to_string()))?;

        rows.iter().map(Self::row_to_transfer).collect::<Result<_, _>>().map_err(|e| QueryError::Store(e.to_string()))
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
        // Fetch one extra row to derive `has_more` without a second COUNT
        // query (spec §4.2).
        let fetch_limit = (limit + 1) as i64;

        let rows = match (addr, direction) {
            (Some(addr), Direction::From) => sqlx::query(
                r#"
                SELECT id, chain_id, tx_hash, log_index, token, from_addr, to_addr,
                       value, block_number, block_timestamp, swap_type
                FROM transfers
                WHERE chain_id = $1 AND from_addr = $2 AND id > $3
                ORDER BY id ASC
                LIMIT $4
                "#,
            )
            .bind(chain_id as i64)
            .bind(addr)
            .bind(since_id)
            .bind(fetch_limit)
            .fetch_all(&self.pool)
            .await,
            (Some(addr), Direction::To) => sqlx::query(
                r#"
                SELECT id, chain_id, tx_hash, log_index, token, from_addr, to_addr,
                       value, block_number, block_timestamp, swap_type
                FROM transfers
                WHERE chain_id = $1 AND to_addr = $2 AND id > $3
                ORDER BY id ASC
                LIMIT $4
                "#,
            )
            .bind(chain_id as i64)
            .bind(addr)
            .bind(since_id)
            .bind(fetch_limit)
            .fetch_all(&self.pool)
            .await,
            (Some(addr), Direction::Both) => sqlx::query(
                r#"
                SELECT id, chain_id, tx_hash, log_index, token, from_addr, to_addr,
                       value, block_number, block_timestamp, swap_type
                FROM transfers
                WHERE chain_id = $1 AND (from_addr = $2 OR to_addr = $2) AND id > $3
                ORDER BY id ASC
                LIMIT $4
                "#,
            )
            .bind(chain_id as i64)
            .bind(addr)
            .bind(since_id)
            .bind(fetch_limit)
            .fetch_all(&self.pool)
            .await,
            (None, _) => sqlx::query(
                r#"
                SELECT id, chain_id, tx_hash, log_index, token, from_addr, to_addr,
                       value, block_number, block_timestamp, swap_type
                FROM transfers
                WHERE chain_id = $1 AND id > $2
                ORDER BY id ASC
                LIMIT $3
                "#,
            )
            .bind(chain_id as i64)
            .bind(since_id)
            .bind(fetch_limit)
            .fetch_all(&self.pool)
            .await,
        }
        .map_err(|e| QueryError::Store(e.to_string()))?;

        let has_more = rows.len() > limit;
        let mut transfers: Vec<Transfer> = rows
            .iter()
            .take(limit)
            .map(Self::row_to_transfer)
            .collect::<Result<_, _>>()
            .map_err(|e| QueryError::Store(e.to_string()))?;
        transfers.truncate(limit);

        let next_since_id = transfers.last().and_then(|t| t.id).unwrap_or(since_id);

        Ok(StreamResult { transfers, next_since_id, has_more })
    }

    async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}
