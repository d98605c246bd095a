//! Records produced by the pipeline and handed to consumers.

pub mod conversions;
pub mod snapshot;

pub use snapshot::{
    ChainResult, ChainSnapshot, ContractHolderRecord, DiscoverySummary, LogEvent,
    PoolClassification, PoolKind, PoolPrice,
};
