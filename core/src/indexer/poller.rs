//! Per-Chain Poller (spec §4.1): one independent worker per configured
//! chain, owning the ingestion state machine. Grounded on the tick-loop
//! shape of the pack's `flare-emissary` `poller.rs` (a `sqlx::PgPool` +
//! checkpoint-upsert poll loop) and `stableguard`'s `chain.rs`
//! (backfill-then-live loop with a `CancellationToken` shutdown).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::B256;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::BlockMetaCache;
use crate::dedup::DedupIndex;
use crate::dlq::DeadLetterQueue;
use crate::error::PollError;
use crate::provider::ChainRpc;
use crate::store::TransferStore;
use crate::types::Transfer;

use super::decode::decode_transfer_log;
use super::reorg::warn_if_shallow;

pub struct PollerConfig {
    pub chain_id: u64,
    pub network: String,
    pub poll_interval: Duration,
    pub confirmation_blocks: u64,
    pub reorg_safety_blocks: u64,
    pub max_blocks_per_query: u64,
    pub max_startup_backfill: u64,
    pub block_cache_size: usize,
}

/// Outcome of decoding and attempting to persist a single log, used by
/// `tick_inner` to decide whether the checkpoint for this tick may advance.
enum ProcessOutcome {
    Persisted,
    DedupHit,
    Dropped,
    DeferredToDlq,
}

/// Drives one chain forward from its checkpoint, never skipping a block,
/// never double-counting a log, never losing events to transient failure.
///
/// Generic over `R: ChainRpc` rather than `alloy::providers::Provider`
/// directly: the poller only ever needs the four read calls named on that
/// trait, so tests drive it with a small scriptable mock instead of a full
/// `Provider` implementation.
pub struct Poller<R> {
    config: PollerConfig,
    provider: Arc<R>,
    store: Arc<dyn TransferStore>,
    dlq: Arc<DeadLetterQueue>,
    dedup: DedupIndex,
    block_cache: BlockMetaCache,
    last_processed: AtomicU64,
    polling: AtomicBool,
    last_tip_hash: Mutex<Option<B256>>,
}

impl<R> Poller<R>
where
    R: ChainRpc + 'static,
{
    pub fn new(
        config: PollerConfig,
        provider: Arc<R>,
        store: Arc<dyn TransferStore>,
        dlq: Arc<DeadLetterQueue>,
    ) -> Self {
        warn_if_shallow(config.chain_id, &config.network, config.reorg_safety_blocks);
        let dedup = DedupIndex::for_reorg_window(16_384, config.reorg_safety_blocks);
        let block_cache = BlockMetaCache::new(config.block_cache_size);

        Self {
            config,
            provider,
            store,
            dlq,
            dedup,
            block_cache,
            last_processed: AtomicU64::new(0),
            polling: AtomicBool::new(false),
            last_tip_hash: Mutex::new(None),
        }
    }

    /// The last block number this poller has durably checkpointed, for
    /// tests and diagnostics.
    pub fn last_processed(&self) -> u64 {
        self.last_processed.load(Ordering::SeqCst)
    }

    /// Load the durable checkpoint (or 0 if this chain has never been
    /// polled) and apply the catch-up guard (spec §4.1) before the first
    /// tick ever runs.
    pub async fn init_checkpoint(&self) -> Result<(), PollError> {
        let checkpoint = self.store.get_checkpoint(self.config.chain_id).await?;
        let mut last_processed = checkpoint.unwrap_or(0);

        if let Ok(head) = self.provider.head_block_number(self.config.chain_id).await {
            if head.saturating_sub(last_processed) > self.config.max_startup_backfill {
                let jumped_to = head.saturating_sub(self.config.reorg_safety_blocks);
                warn!(
                    chain_id = self.config.chain_id,
                    network = %self.config.network,
                    old_checkpoint = last_processed,
                    head,
                    jumped_to,
                    "startup gap exceeds MAX_STARTUP_BACKFILL, skipping ahead"
                );
                self.store.save_checkpoint(self.config.chain_id, jumped_to).await?;
                last_processed = jumped_to;
            }
        }

        self.last_processed.store(last_processed, Ordering::SeqCst);
        Ok(())
    }

    /// Run the periodic tick loop until `cancel` fires. Cooperative
    /// shutdown: a tick already in flight runs to completion (spec §5).
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(chain_id = self.config.chain_id, network = %self.config.network, "poller stopping");
                    break;
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    self.tick().await;
                }
            }
        }
    }

    /// One poll cycle. Skips silently if already polling or the store is
    /// unhealthy (spec §4.1).
    pub async fn tick(&self) {
        if self.polling.swap(true, Ordering::SeqCst) {
            debug!(chain_id = self.config.chain_id, "tick skipped: previous cycle still in flight");
            return;
        }

        let start = std::time::Instant::now();
        if let Err(e) = self.tick_inner().await {
            warn!(chain_id = self.config.chain_id, error = %e, "poll cycle aborted");
        }
        crate::metrics::poll_cycle_duration(self.config.chain_id, start.elapsed().as_secs_f64());

        self.polling.store(false, Ordering::SeqCst);
    }

    async fn tick_inner(&self) -> Result<(), PollError> {
        if !self.store.is_healthy().await {
            debug!(chain_id = self.config.chain_id, "tick skipped: store unhealthy");
            return Ok(());
        }

        self.observe_reorg().await;

        let head = self
            .provider
            .head_block_number(self.config.chain_id)
            .await
            .map_err(|e| PollError::TransientUpstream(e.to_string()))?;

        let last_processed = self.last_processed.load(Ordering::SeqCst);
        let to_block = head.saturating_sub(self.config.confirmation_blocks);
        // Re-query the last REORG_SAFETY_BLOCKS already-processed blocks on
        // every tick so a log that survives a reorg re-enters under the
        // same natural key (spec §4.1 "Reorg safety").
        let from_block = (last_processed + 1).saturating_sub(self.config.reorg_safety_blocks).max(1);

        if from_block > to_block {
            return Ok(());
        }

        let to_block = to_block.min(from_block + self.config.max_blocks_per_query - 1);

        let logs = self
            .provider
            .transfer_logs(self.config.chain_id, from_block, to_block)
            .await
            .map_err(|e| PollError::TransientUpstream(e.to_string()))?;

        debug!(
            chain_id = self.config.chain_id,
            from_block, to_block, log_count = logs.len(),
            "poll range fetched"
        );

        let mut any_deferred = false;
        for log in &logs {
            if matches!(self.process(log).await, ProcessOutcome::DeferredToDlq) {
                any_deferred = true;
            }
        }

        if any_deferred {
            warn!(
                chain_id = self.config.chain_id,
                to_block, "checkpoint withheld: at least one log this tick was deferred to the DLQ"
            );
        } else {
            self.advance_checkpoint(to_block).await;
        }

        self.remember_tip_hash(to_block).await;
        Ok(())
    }

    /// Compare the hash of the previously recorded tip block against its
    /// current hash. A mismatch means the chain reorged since the last
    /// tick; the exact fork depth isn't walked back (spec §1's Non-goals
    /// exclude reorg reconciliation), so `REORG_SAFETY_BLOCKS` — the width
    /// of the window this poller re-scans on every tick to recover from
    /// exactly this case — is recorded as the observed depth.
    async fn observe_reorg(&self) {
        let last_processed = self.last_processed.load(Ordering::SeqCst);
        if last_processed == 0 {
            return;
        }

        let previous_hash = *self.last_tip_hash.lock().expect("poller mutex poisoned");
        let Some(previous_hash) = previous_hash else { return };

        match self.provider.block_hash(self.config.chain_id, last_processed).await {
            Ok(current_hash) if current_hash != previous_hash => {
                warn!(
                    chain_id = self.config.chain_id,
                    network = %self.config.network,
                    block_number = last_processed,
                    "reorg observed: checkpointed block's hash changed since last tick"
                );
                crate::metrics::record_reorg(&self.config.network, self.config.reorg_safety_blocks);
            }
            Ok(_) => {}
            Err(e) => {
                debug!(chain_id = self.config.chain_id, error = %e, "could not verify tip hash this tick");
            }
        }
    }

    async fn remember_tip_hash(&self, to_block: u64) {
        if let Ok(hash) = self.provider.block_hash(self.config.chain_id, to_block).await {
            *self.last_tip_hash.lock().expect("poller mutex poisoned") = Some(hash);
        }
    }

    /// Retry once inline on transient failure; never advance
    /// `last_processed` without a durable checkpoint write (spec §7).
    async fn advance_checkpoint(&self, to_block: u64) {
        for attempt in 0..2 {
            match self.store.save_checkpoint(self.config.chain_id, to_block).await {
                Ok(()) => {
                    self.last_processed.store(to_block, Ordering::SeqCst);
                    crate::metrics::checkpoint_saved(self.config.chain_id, to_block);
                    return;
                }
                Err(e) if attempt == 0 => {
                    warn!(chain_id = self.config.chain_id, error = %e, "checkpoint save failed, retrying once");
                }
                Err(e) => {
                    error!(
                        chain_id = self.config.chain_id, error = %e,
                        "checkpoint save failed twice, range {to_block} will be re-polled next tick"
                    );
                }
            }
        }
    }

    #[tracing::instrument(skip(self, log), fields(chain_id = self.config.chain_id))]
    async fn process(&self, log: &alloy::rpc::types::Log) -> ProcessOutcome {
        let decoded = match decode_transfer_log(log) {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "skipping malformed log");
                return ProcessOutcome::Dropped;
            }
        };

        let transfer = Transfer {
            id: None,
            chain_id: self.config.chain_id,
            tx_hash: decoded.tx_hash,
            log_index: decoded.log_index,
            token: decoded.token,
            from_addr: decoded.from_addr,
            to_addr: decoded.to_addr,
            value: decoded.value,
            block_number: decoded.block_number,
            block_timestamp: 0,
            swap_type: None,
        };

        let key = transfer.natural_key();
        if self.dedup.is_known(&key) {
            crate::metrics::transfer_dedup_hit(self.config.chain_id);
            return ProcessOutcome::DedupHit;
        }

        let chain_id = self.config.chain_id;
        let block_number = transfer.block_number;
        let provider = &self.provider;
        let block_timestamp = self
            .block_cache
            .get_or_fetch(block_number, || async move {
                provider.block_timestamp(chain_id, block_number).await
            })
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, block_number, "falling back to wall clock for block timestamp");
                chrono::Utc::now().timestamp()
            });

        let mut transfer = transfer;
        transfer.block_timestamp = block_timestamp;

        match self.store.upsert(transfer.clone()).await {
            Ok(_) => {
                self.dedup.mark_known(key);
                crate::metrics::transfer_persisted(self.config.chain_id);
                ProcessOutcome::Persisted
            }
            Err(PollError::TransientStore(e)) => {
                warn!(error = %e, "transient store error, enqueueing to DLQ");
                crate::metrics::store_write_error(self.config.chain_id, false);
                self.dlq.enqueue(self.config.chain_id, transfer, e.to_string());
                ProcessOutcome::DeferredToDlq
            }
            Err(e) => {
                error!(error = %e, "permanent store error, dropping log");
                crate::metrics::store_write_error(self.config.chain_id, true);
                ProcessOutcome::Dropped
            }
        }
    }
}
