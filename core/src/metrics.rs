//! Thin facade over the `metrics` crate, grouping the counters/histograms
//! this indexer records. No exporter is attached here — wiring one up is
//! the job of whatever process boots the orchestrator; the HTTP surface
//! that would serve `/metrics` is out of scope for this crate.

use metrics::{counter, gauge, histogram};

pub fn transfer_persisted(chain_id: u64) {
    counter!("transfers_persisted_total", "chain_id" => chain_id.to_string()).increment(1);
}

pub fn transfer_dedup_hit(chain_id: u64) {
    counter!("transfers_dedup_hits_total", "chain_id" => chain_id.to_string()).increment(1);
}

pub fn poll_cycle_duration(chain_id: u64, seconds: f64) {
    histogram!("poll_cycle_duration_seconds", "chain_id" => chain_id.to_string()).record(seconds);
}

pub fn rpc_call(chain_id: u64, method: &'static str) {
    counter!("rpc_calls_total", "chain_id" => chain_id.to_string(), "method" => method)
        .increment(1);
}

pub fn rpc_error(chain_id: u64, method: &'static str) {
    counter!("rpc_errors_total", "chain_id" => chain_id.to_string(), "method" => method)
        .increment(1);
}

pub fn dlq_depth(depth: usize) {
    gauge!("dlq_depth").set(depth as f64);
}

pub fn dlq_dropped(chain_id: u64) {
    counter!("dlq_dropped_total", "chain_id" => chain_id.to_string()).increment(1);
}

pub fn store_write_error(chain_id: u64, permanent: bool) {
    let kind = if permanent { "permanent" } else { "transient" };
    counter!("store_write_errors_total", "chain_id" => chain_id.to_string(), "kind" => kind)
        .increment(1);
}

pub fn record_reorg(network: &str, depth: u64) {
    counter!("reorgs_total", "network" => network.to_string()).increment(1);
    histogram!("reorg_depth_blocks", "network" => network.to_string()).record(depth as f64);
}

pub fn checkpoint_saved(chain_id: u64, block_number: u64) {
    gauge!("checkpoint_last_safe_block", "chain_id" => chain_id.to_string())
        .set(block_number as f64);
}
