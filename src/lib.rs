//! # Multichain Token SDK
//!
//! Supply, contract-holder and pool price aggregation for one token deployed identically on
//! several EVM chains. Every chain is read independently; a failing chain, chunk, address or
//! pool degrades its own result and never aborts the others.
//!
//! ## Overview
//!
//! For each configured chain the SDK:
//!
//! - **Supply**: reads total supply and the operating wallet balance (circulating = total - operating)
//! - **Discovery**: scans recent Transfer logs in bounded chunks to find token recipients
//! - **Classification**: separates contracts from externally-owned accounts
//! - **Detection**: probes the largest contract holders for known pool interfaces
//! - **Pricing**: quotes each pool against a reference fiat rate and reports peg deviation
//!
//! ## Architecture
//!
//! ### RPC Layer
//! [`rpc_client::ChainRpc`] is the only way components touch a node. Calls are time-bounded and
//! never retried at this layer.
//!
//! ### Discovery Layer
//! [`log_scanner`], [`address_classifier`] and [`pool_detector`] each apply their own retry and
//! omission policy and report omissions as explicit outcome values.
//!
//! ### Pricing Layer
//! [`price_oracle`] yields one reference rate per batch; [`pricing`] turns pool state into
//! [`types::PoolPrice`] records.
//!
//! ### Pipeline Layer
//! [`pipeline::ChainPipeline`] runs light, full and prices-only refreshes for one chain;
//! [`orchestrator::MultiChainOrchestrator`] fans out across chains and tags each result.

// Core Types
/// Records handed to consumers and unit conversions
pub mod types;
/// Error taxonomy
pub mod errors;

// RPC Layer
/// Time-bounded node access
pub mod rpc_client;

// Discovery Layer
/// Chunked Transfer log scanning
pub mod log_scanner;
/// Contract vs. account classification
pub mod address_classifier;
/// Pool interface probing
pub mod pool_detector;

// Pricing Layer
/// Reference fiat rate
pub mod price_oracle;
/// Pool price and peg deviation
pub mod pricing;

// Pipeline Layer
/// Per-chain refresh pipeline
pub mod pipeline;
/// Multi-chain fan-out
pub mod orchestrator;

// Infrastructure
/// Metrics and observability
pub mod metrics;
/// General utilities
pub mod utils;

// Contracts (Public ABIs Only)
/// Smart contract ABIs (read-only)
pub mod contracts;

// Settings & Configuration
/// Configuration management
pub mod settings;

// Re-exports for convenience
pub use errors::{ChainFetchError, PricingError, RpcError};
pub use orchestrator::MultiChainOrchestrator;
pub use pipeline::ChainPipeline;
pub use rpc_client::ChainRpc;
pub use settings::Settings;
pub use types::{ChainResult, ChainSnapshot};
