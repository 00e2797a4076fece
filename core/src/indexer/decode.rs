//! Log -> `Transfer` decoding (spec §4.1 "process(log)"). Bit-exact with
//! the spec's address-extraction rule: the from/to addresses are the last
//! 20 bytes of their respective indexed topics, lowercased.

use alloy::primitives::Address;
use alloy::rpc::types::Log;

use crate::error::PollError;

/// Everything decoded out of a single log, before the block timestamp
/// (resolved separately via the block cache) and chain id are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLog {
    pub token: String,
    pub from_addr: String,
    pub to_addr: String,
    pub value: String,
    pub tx_hash: String,
    pub log_index: u64,
    pub block_number: u64,
}

/// Decode a raw log into a `DecodedLog`. Logs with fewer than 3 topics are
/// not a standard ERC20 `Transfer` and must be skipped (spec §4.1) —
/// surfaced as `PollError::MalformedLog` so the caller logs-and-continues
/// rather than treating it as a transient failure.
pub fn decode_transfer_log(log: &Log) -> Result<DecodedLog, PollError> {
    let topics = log.topics();
    if topics.len() < 3 {
        return Err(PollError::MalformedLog(format!(
            "expected >= 3 topics, got {}",
            topics.len()
        )));
    }

    let from_addr = Address::from_word(topics[1]);
    let to_addr = Address::from_word(topics[2]);

    let tx_hash = log
        .transaction_hash
        .ok_or_else(|| PollError::MalformedLog("log missing transaction_hash".into()))?;
    let log_index = log
        .log_index
        .ok_or_else(|| PollError::MalformedLog("log missing log_index".into()))?;
    let block_number = log
        .block_number
        .ok_or_else(|| PollError::MalformedLog("log missing block_number".into()))?;

    Ok(DecodedLog {
        token: format!("{:#x}", log.inner.address),
        from_addr: format!("{from_addr:#x}"),
        to_addr: format!("{to_addr:#x}"),
        value: format!("{:#x}", log.inner.data.data),
        tx_hash: format!("{tx_hash:#x}"),
        log_index,
        block_number,
    })
}
