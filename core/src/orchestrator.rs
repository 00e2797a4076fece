//! Orchestrator (spec §4.8): boots workers, installs shutdown hooks,
//! exposes query handles to the read adapter. Grounded on the boot
//! sequence shape of `stableguard`'s `chain.rs` (construct store, spawn one
//! task per chain, `CancellationToken` for cooperative shutdown).

use std::sync::Arc;
use std::time::Duration;

use alloy::providers::ProviderBuilder;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Settings;
use crate::dlq::DeadLetterQueue;
use crate::error::IndexerError;
use crate::indexer::poller::{Poller, PollerConfig};
use crate::provider::JsonRpcCachedProvider;
use crate::query::QueryFacade;
use crate::rate_limit::RateBudget;
use crate::store::postgres::PostgresStore;
use crate::store::TransferStore;

/// Owns every running poller plus the shared collaborators (spec §2, §4.8).
/// Dropping it does not stop anything — call [`Orchestrator::shutdown`]
/// first.
pub struct Orchestrator {
    store: Arc<dyn TransferStore>,
    dlq: Arc<DeadLetterQueue>,
    cancel: CancellationToken,
    poller_handles: Vec<JoinHandle<()>>,
    dlq_handle: Option<JoinHandle<()>>,
}

impl Orchestrator {
    /// Boot sequence (spec §4.8): open the store, verify schema, construct
    /// shared collaborators, start one poller per configured network, start
    /// the DLQ retry timer.
    pub async fn boot(settings: &Settings) -> Result<(Self, QueryFacade), IndexerError> {
        let pg = PostgresStore::connect(&settings.store_url).await?;
        pg.ensure_schema().await?;
        let store: Arc<dyn TransferStore> = Arc::new(pg);

        let rate_budget = RateBudget::new(settings.rate_capacity, settings.rate_refill_per_sec);
        let dlq = Arc::new(DeadLetterQueue::new(settings.dlq_capacity, settings.dlq_max_retries));
        let cancel = CancellationToken::new();

        let mut poller_handles = Vec::with_capacity(settings.networks.len());
        for network in &settings.networks {
            let rpc_url = network
                .rpc_endpoint
                .parse()
                .map_err(|e| IndexerError::Config(format!("invalid rpc_endpoint for {}: {e}", network.name)))?;
            let inner = ProviderBuilder::new().on_http(rpc_url);
            let provider = Arc::new(JsonRpcCachedProvider::new(inner, rate_budget.clone()));

            let poller_config = PollerConfig {
                chain_id: network.chain_id,
                network: network.name.clone(),
                poll_interval: Duration::from_millis(settings.poll_interval_ms),
                confirmation_blocks: settings.confirmation_blocks,
                reorg_safety_blocks: settings.reorg_safety_blocks,
                max_blocks_per_query: settings.max_blocks_per_query,
                max_startup_backfill: settings.max_startup_backfill,
                block_cache_size: settings.block_cache_size,
            };

            let poller = Arc::new(Poller::new(poller_config, provider, store.clone(), dlq.clone()));
            poller
                .init_checkpoint()
                .await
                .map_err(|e| IndexerError::RpcUnreachable { chain_id: network.chain_id, source: e.into() })?;

            info!(chain_id = network.chain_id, network = %network.name, "poller starting");
            let cancel_child = cancel.child_token();
            poller_handles.push(tokio::spawn(async move { poller.run(cancel_child).await }));
        }

        let dlq_handle = Some(spawn_dlq_retry_loop(
            dlq.clone(),
            store.clone(),
            Duration::from_millis(settings.dlq_retry_interval_ms),
            cancel.child_token(),
        ));

        let facade = QueryFacade::new(store.clone());
        Ok((Self { store, dlq, cancel, poller_handles, dlq_handle }, facade))
    }

    /// Signal all pollers to stop, wait for in-flight cycles to drain
    /// (bounded by one `POLL_INTERVAL`), flush DLQ retry attempts once,
    /// close the store (spec §4.8 step 5).
    pub async fn shutdown(mut self, drain_timeout: Duration) {
        self.cancel.cancel();

        let drain = futures::future::join_all(self.poller_handles.drain(..));
        if tokio::time::timeout(drain_timeout, drain).await.is_err() {
            tracing::warn!("pollers did not drain within the shutdown timeout");
        }

        if let Some(handle) = self.dlq_handle.take() {
            let _ = tokio::time::timeout(drain_timeout, handle).await;
        }

        let _ = self
            .dlq
            .retry_pass(|transfer| {
                let store = self.store.clone();
                async move { store.upsert(transfer).await.map(|_| ()).map_err(|e| e.to_string()) }
            })
            .await;

        info!("orchestrator shutdown complete");
    }
}

fn spawn_dlq_retry_loop(
    dlq: Arc<DeadLetterQueue>,
    store: Arc<dyn TransferStore>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {
                    let stats = dlq
                        .retry_pass(|transfer| {
                            let store = store.clone();
                            async move { store.upsert(transfer).await.map(|_| ()).map_err(|e| e.to_string()) }
                        })
                        .await;
                    if stats.succeeded > 0 || stats.dropped > 0 {
                        info!(
                            succeeded = stats.succeeded,
                            requeued = stats.requeued,
                            dropped = stats.dropped,
                            "DLQ retry pass complete"
                        );
                    }
                }
            }
        }
    })
}
