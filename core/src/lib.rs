//! Core of the multi-chain ERC20 Transfer indexer: per-chain polling
//! ingestion, a durable Transfer Store, and a read-side Query Facade.
//!
//! The HTTP/REST adapter, process supervision, and the static network
//! catalog's source of truth are out of scope for this crate — it exposes
//! a typed boot/query surface for a thin binary (or any other host) to
//! drive.

pub mod cache;
pub mod config;
pub mod dedup;
pub mod dlq;
pub mod error;
pub mod indexer;
pub mod metrics;
pub mod orchestrator;
pub mod provider;
pub mod query;
pub mod rate_limit;
pub mod store;
pub mod types;

pub use config::Settings;
pub use error::{IndexerError, PollError, QueryError};
pub use orchestrator::Orchestrator;
pub use query::QueryFacade;
pub use types::{BatchQuery, Checkpoint, Direction, DlqItem, NaturalKey, StreamResult, SwapType, Transfer};
