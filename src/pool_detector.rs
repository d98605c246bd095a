//! # Pool Type Detector
//!
//! Classifies a contract holder by probing it against known pool interface shapes.
//!
//! Probes run in a fixed order and the first match wins:
//!
//! 1. [`Probe::KnownManager`] - address is on the chain's pool-manager allow-list
//! 2. [`Probe::Reserves`] - `getReserves()` answers, two-reserve pool
//! 3. [`Probe::Slot0`] - `slot0()` answers, single-pool concentrated liquidity state
//!
//! A failing probe yields [`ProbeOutcome::NotThisShape`]; nothing is propagated. When no
//! probe matches the contract is classified as [`PoolKind::Unknown`].

use ethers::types::Address;
use futures::future::join_all;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::rpc_client::ChainRpc;
use crate::settings::ChainEndpoint;
use crate::types::{PoolClassification, PoolKind};

pub const POOL_MANAGER_LABEL: &str = "Uniswap V4 PoolManager";
pub const POOL_MANAGER_PROTOCOL: &str = "Uniswap V4";
pub const SLOT0_PROTOCOL: &str = "Uniswap V3";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    KnownManager,
    Reserves,
    Slot0,
}

pub const PROBE_ORDER: [Probe; 3] = [Probe::KnownManager, Probe::Reserves, Probe::Slot0];

#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Matched(PoolClassification),
    NotThisShape { reason: String },
}

/// Label for two-reserve pools; each chain hosts different deployments of that interface.
pub fn v2_protocol_label(chain: &str) -> &'static str {
    match chain {
        "Ethereum" => "Uniswap V2 / SushiSwap",
        "Polygon" => "QuickSwap / SushiSwap",
        "Avalanche" => "Trader Joe / Pangolin",
        _ => "Unknown DEX",
    }
}

pub struct PoolTypeDetector {
    rpc: Arc<dyn ChainRpc>,
    chain: String,
    pool_managers: Vec<Address>,
}

impl PoolTypeDetector {
    pub fn new(rpc: Arc<dyn ChainRpc>, chain: impl Into<String>, pool_managers: Vec<Address>) -> Self {
        Self {
            rpc,
            chain: chain.into(),
            pool_managers,
        }
    }

    pub fn for_chain(rpc: Arc<dyn ChainRpc>, endpoint: &ChainEndpoint) -> Self {
        Self::new(rpc, endpoint.name.clone(), endpoint.pool_managers.clone())
    }

    pub async fn detect(&self, address: Address) -> PoolClassification {
        self.detect_with_trace(address).await.0
    }

    /// Like [`detect`](Self::detect) but also returns every probe that was run.
    pub async fn detect_with_trace(
        &self,
        address: Address,
    ) -> (PoolClassification, Vec<(Probe, ProbeOutcome)>) {
        let mut trace = Vec::with_capacity(PROBE_ORDER.len());
        for probe in PROBE_ORDER {
            let outcome = self.run_probe(probe, address).await;
            match &outcome {
                ProbeOutcome::Matched(classification) => {
                    let classification = classification.clone();
                    trace.push((probe, outcome));
                    return (classification, trace);
                }
                ProbeOutcome::NotThisShape { reason } => {
                    debug!(
                        "[{}] {:?} is not {:?}: {}",
                        self.chain, address, probe, reason
                    );
                }
            }
            trace.push((probe, outcome));
        }
        (PoolClassification::unknown(), trace)
    }

    async fn run_probe(&self, probe: Probe, address: Address) -> ProbeOutcome {
        match probe {
            Probe::KnownManager => {
                if self.pool_managers.contains(&address) {
                    ProbeOutcome::Matched(PoolClassification::new(
                        PoolKind::DexV4,
                        POOL_MANAGER_LABEL,
                    ))
                } else {
                    ProbeOutcome::NotThisShape {
                        reason: "not a known pool manager".into(),
                    }
                }
            }
            Probe::Reserves => match self.rpc.reserves(address).await {
                Ok(_) => ProbeOutcome::Matched(PoolClassification::new(
                    PoolKind::DexV2,
                    v2_protocol_label(&self.chain),
                )),
                Err(e) => ProbeOutcome::NotThisShape {
                    reason: e.to_string(),
                },
            },
            Probe::Slot0 => match self.rpc.sqrt_price_x96(address).await {
                Ok(_) => {
                    ProbeOutcome::Matched(PoolClassification::new(PoolKind::DexV3, SLOT0_PROTOCOL))
                }
                Err(e) => ProbeOutcome::NotThisShape {
                    reason: e.to_string(),
                },
            },
        }
    }

    /// Detects `addresses` in concurrent batches with a pause between batches.
    /// Output order matches input order.
    pub async fn detect_all(
        &self,
        addresses: &[Address],
        batch_size: usize,
        batch_delay: Duration,
    ) -> Vec<PoolClassification> {
        let batches = addresses.chunks(batch_size.max(1));
        let total = batches.len();
        let mut out = Vec::with_capacity(addresses.len());
        for (i, batch) in batches.enumerate() {
            out.extend(join_all(batch.iter().map(|a| self.detect(*a))).await);
            if i + 1 < total && !batch_delay.is_zero() {
                sleep(batch_delay).await;
            }
        }
        let pools = out.iter().filter(|c| c.kind != PoolKind::Unknown).count();
        info!(
            "[{}] Detected {} pools among {} contracts",
            self.chain,
            pools,
            out.len()
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v2_labels_follow_chain_identity() {
        assert_eq!(v2_protocol_label("Ethereum"), "Uniswap V2 / SushiSwap");
        assert_eq!(v2_protocol_label("Polygon"), "QuickSwap / SushiSwap");
        assert_eq!(v2_protocol_label("Avalanche"), "Trader Joe / Pangolin");
        assert_eq!(v2_protocol_label("Gnosis"), "Unknown DEX");
    }

    #[test]
    fn known_manager_is_probed_first() {
        assert_eq!(PROBE_ORDER[0], Probe::KnownManager);
        assert_eq!(PROBE_ORDER[2], Probe::Slot0);
    }
}
