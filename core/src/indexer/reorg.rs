//! Reorg-safety helpers for the per-chain poller (spec §4.1, §4.2 "Reorg
//! safety").
//!
//! This crate does not delete orphaned rows on reorg — that is an explicit
//! Non-goal (spec §1). Reorg tolerance instead comes from re-querying the
//! last `REORG_SAFETY_BLOCKS` blocks on every tick: any log that survives
//! the reorg re-enters under the same natural key (an upsert no-op), and
//! logs from orphaned blocks simply stop reappearing. Orphan rows are left
//! in place by design (spec §4.1, §9 open question 2).

use tracing::warn;

/// A recommended minimum reorg-safety window for a given chain, used only
/// as an operator-facing hint: the configured `REORG_SAFETY_BLOCKS` (spec
/// §6.4) is the single source of truth the poller actually uses. Chain id 1
/// (Ethereum mainnet) finalizes deeper than most L2s/sidechains, so a
/// shallower-than-usual configured window is worth flagging.
pub fn suggested_reorg_safety_blocks(chain_id: u64) -> u64 {
    if chain_id == 1 {
        12
    } else {
        64
    }
}

/// Warn once at poller startup if the globally configured reorg window is
/// shallower than this chain would typically want. Does not change
/// behavior — the configured value remains authoritative, per the single
/// `REORG_SAFETY_BLOCKS` knob in spec §6.4.
pub fn warn_if_shallow(chain_id: u64, network: &str, configured: u64) {
    let suggested = suggested_reorg_safety_blocks(chain_id);
    if configured < suggested {
        warn!(
            chain_id,
            network,
            configured,
            suggested,
            "configured REORG_SAFETY_BLOCKS is shallower than typically recommended for this chain"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mainnet_gets_a_shallower_floor_than_others() {
        assert_eq!(suggested_reorg_safety_blocks(1), 12);
        assert_eq!(suggested_reorg_safety_blocks(3), 64);
        assert_eq!(suggested_reorg_safety_blocks(42), 64);
    }

    #[test]
    fn warn_if_shallow_does_not_panic_on_either_branch() {
        warn_if_shallow(1, "ethereum", 12);
        warn_if_shallow(1, "ethereum", 3);
        warn_if_shallow(137, "polygon", 64);
    }
}
