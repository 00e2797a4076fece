use thiserror::Error;

/// Errors that abort a component outright. Surfaced from startup and from
/// paths §7 of the spec calls "fatal" — the CLI exits non-zero on these so a
/// process supervisor restarts the service.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("transfer store unreachable: {0}")]
    StoreUnavailable(String),

    #[error("failed to initialize schema/indexes: {0}")]
    SchemaInit(#[source] sqlx::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("rpc endpoint unreachable for chain {chain_id}: {source}")]
    RpcUnreachable {
        chain_id: u64,
        #[source]
        source: anyhow::Error,
    },
}

/// Per-tick / per-log error taxonomy (spec §7). The poller matches on the
/// variant to decide retry-next-tick, DLQ, or skip-and-log; this type never
/// escapes a single poll cycle.
#[derive(Debug, Error)]
pub enum PollError {
    /// Network flap, rate limit, provider 5xx, timeout. Skip this tick,
    /// retry on the next one. Never propagated further than the caller of
    /// the single RPC step.
    #[error("transient upstream error: {0}")]
    TransientUpstream(String),

    /// Log shape the core cannot decode (too few topics, bad hex). Skip the
    /// single log, continue with the next.
    #[error("malformed log: {0}")]
    MalformedLog(String),

    /// Store connection drop, deadlock, temporary unavailability during a
    /// write. Caller enqueues the event in the DLQ and continues polling.
    #[error("transient store error: {0}")]
    TransientStore(#[source] sqlx::Error),

    /// Schema mismatch, store-side quota exhaustion. Logged and counted,
    /// never retried via the DLQ (it would fill without hope).
    #[error("permanent store error: {0}")]
    PermanentStore(#[source] sqlx::Error),
}

/// Errors surfaced to a reader of the query facade. Bad input never crashes
/// the ingestor; it comes back as a structured value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("limit {requested} exceeds cap {cap}")]
    LimitTooLarge { requested: usize, cap: usize },

    #[error("batch of {requested} queries exceeds cap {cap}")]
    BatchTooLarge { requested: usize, cap: usize },

    #[error("underlying store error: {0}")]
    Store(String),
}
