use chrono::{DateTime, Utc};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::utils::BlockRange;

/// One transfer record read from the tracked token's logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub block_number: u64,
}

/// Pool family a contract holder was classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolKind {
    /// Two-reserve pool (`getReserves`)
    DexV2,
    /// Single-pool concentrated liquidity state (`slot0`)
    DexV3,
    /// Singleton pool manager holding many pools
    DexV4,
    Lending,
    Bridge,
    Unknown,
}

impl PoolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolKind::DexV2 => "DEX_V2",
            PoolKind::DexV3 => "DEX_V3",
            PoolKind::DexV4 => "DEX_V4",
            PoolKind::Lending => "LENDING",
            PoolKind::Bridge => "BRIDGE",
            PoolKind::Unknown => "UNKNOWN",
        }
    }

    /// Kinds the price calculator has an algorithm for.
    pub fn is_priceable(&self) -> bool {
        matches!(self, PoolKind::DexV2 | PoolKind::DexV3)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolClassification {
    pub kind: PoolKind,
    pub protocol: Option<String>,
}

impl PoolClassification {
    pub fn unknown() -> Self {
        Self {
            kind: PoolKind::Unknown,
            protocol: None,
        }
    }

    pub fn new(kind: PoolKind, protocol: impl Into<String>) -> Self {
        Self {
            kind,
            protocol: Some(protocol.into()),
        }
    }
}

/// A contract holding the tracked token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractHolderRecord {
    pub address: Address,
    /// Balance in token units
    pub balance: f64,
    /// Share of total supply, 0..=100
    pub percentage: f64,
    pub kind: PoolKind,
    pub protocol: Option<String>,
}

/// Displayable price of one AMM pool against the reference rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolPrice {
    pub pool_address: Address,
    pub protocol: String,
    pub pair_token: String,
    /// 1 pair token = `display_price` tracked tokens
    pub display_price: f64,
    /// e.g. "1 USDC = 151.52 JPYC"
    pub display_format: String,
    /// 1 tracked token = `token_usd_price` USD (approximate for volatile pair tokens)
    pub token_usd_price: f64,
    pub theoretical_price: f64,
    pub peg_deviation_percent: f64,
    /// Tracked-token balance held by the pool, in token units
    pub liquidity: f64,
}

/// How complete a full-mode discovery pass was.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverySummary {
    /// Block range covered by the log scan; `None` when the head could not be read
    pub scanned: Option<BlockRange>,
    pub chunks: usize,
    pub omitted_chunks: usize,
    pub transfer_events: usize,
    pub candidates: usize,
    pub contracts: usize,
    pub unresolved_addresses: usize,
}

/// Per-chain result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub chain: String,
    pub total_supply: f64,
    pub operating_balance: f64,
    pub circulating_supply: f64,
    /// Top holders by balance, descending
    pub contract_holders: Vec<ContractHolderRecord>,
    pub pool_prices: Vec<PoolPrice>,
    pub discovery: Option<DiscoverySummary>,
    pub fetched_at: DateTime<Utc>,
}

/// Unit of partial failure handed to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChainResult {
    Success { snapshot: ChainSnapshot },
    Failure { chain: String, error: String },
}

impl ChainResult {
    pub fn chain(&self) -> &str {
        match self {
            ChainResult::Success { snapshot } => &snapshot.chain,
            ChainResult::Failure { chain, .. } => chain,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ChainResult::Success { .. })
    }

    pub fn snapshot(&self) -> Option<&ChainSnapshot> {
        match self {
            ChainResult::Success { snapshot } => Some(snapshot),
            ChainResult::Failure { .. } => None,
        }
    }
}
