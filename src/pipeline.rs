//! # Chain Aggregation Pipeline
//!
//! Produces one [`ChainSnapshot`] per run for a single chain.
//!
//! ## Modes
//!
//! - **Light**: supply figures plus the balances of known pool managers. No log scan, no
//!   classification, no prices.
//! - **Full**: supply figures, then discovery over the chain's scan window:
//!   recipients of Transfer events (minus the zero address and the operating wallet) plus the
//!   pool managers are classified, contract balances are read, the top holders are
//!   detected and every priceable pool is priced.
//! - **Prices**: supply figures re-read and pools re-priced from a prior snapshot's
//!   holder list.
//!
//! Total supply and the operating balance are the only required reads. When they exhaust
//! their attempts the run fails with [`ChainFetchError`]; every other step degrades to
//! fewer holders or fewer prices.

use chrono::Utc;
use ethers::types::{Address, U256};
use futures::future::join_all;
use indexmap::IndexSet;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_retry::Retry;

use crate::address_classifier::AddressClassifier;
use crate::errors::{ChainFetchError, RpcError};
use crate::log_scanner::{LogScanner, ScanReport};
use crate::pool_detector::{PoolTypeDetector, POOL_MANAGER_PROTOCOL};
use crate::price_oracle::ReferenceRate;
use crate::pricing::PoolPriceCalculator;
use crate::rpc_client::ChainRpc;
use crate::settings::{ChainEndpoint, Settings};
use crate::types::conversions::token_units;
use crate::types::{
    ChainSnapshot, ContractHolderRecord, DiscoverySummary, PoolKind, PoolPrice,
};
use crate::utils::linear_backoff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    Light,
    Full,
    Prices,
}

impl RefreshMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshMode::Light => "light",
            RefreshMode::Full => "full",
            RefreshMode::Prices => "prices",
        }
    }
}

/// Required reads of one run, in token units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupplyFigures {
    pub total_supply: f64,
    pub operating_balance: f64,
}

impl SupplyFigures {
    pub fn circulating_supply(&self) -> f64 {
        self.total_supply - self.operating_balance
    }

    /// Share of total supply held by `balance`, 0 when total supply is 0.
    pub fn percentage_of(&self, balance: f64) -> f64 {
        if self.total_supply > 0.0 {
            balance / self.total_supply * 100.0
        } else {
            0.0
        }
    }
}

pub struct ChainPipeline {
    endpoint: ChainEndpoint,
    rpc: Arc<dyn ChainRpc>,
    settings: Arc<Settings>,
}

impl ChainPipeline {
    pub fn new(endpoint: ChainEndpoint, rpc: Arc<dyn ChainRpc>, settings: Arc<Settings>) -> Self {
        Self {
            endpoint,
            rpc,
            settings,
        }
    }

    pub fn chain(&self) -> &str {
        &self.endpoint.name
    }

    /// Pool-manager holders carry no price, so no reference rate is needed.
    pub async fn run_light(&self) -> Result<ChainSnapshot, ChainFetchError> {
        let chain = self.chain();
        info!("[{}] Light refresh", chain);
        let supply = self.read_supply().await?;

        let token = self.settings.token.address;
        let balances = join_all(
            self.endpoint
                .pool_managers
                .iter()
                .map(|manager| async move { (*manager, self.rpc.balance_of(token, *manager).await) }),
        )
        .await;

        let mut holders = Vec::new();
        for (manager, result) in balances {
            match result {
                Ok(raw) if !raw.is_zero() => {
                    if let Some(balance) = self.units(raw) {
                        holders.push(ContractHolderRecord {
                            address: manager,
                            balance,
                            percentage: supply.percentage_of(balance),
                            kind: PoolKind::DexV4,
                            protocol: Some(POOL_MANAGER_PROTOCOL.to_string()),
                        });
                    }
                }
                Ok(_) => debug!("[{}] Pool manager {:?} holds no tokens", chain, manager),
                Err(e) => warn!(
                    "[{}] Could not read pool manager {:?} balance: {}",
                    chain, manager, e
                ),
            }
        }
        sort_by_balance(&mut holders);

        info!(
            "[{}] Light refresh done: supply {:.2}, {} pool manager holders",
            chain,
            supply.total_supply,
            holders.len()
        );
        Ok(self.snapshot(supply, holders, Vec::new(), None))
    }

    pub async fn run_full(&self, rate: ReferenceRate) -> Result<ChainSnapshot, ChainFetchError> {
        let chain = self.chain();
        info!("[{}] Full refresh", chain);
        let supply = self.read_supply().await?;
        let scan = &self.settings.scan;

        // 1. transfer recipients over the scan window
        let scanner = LogScanner::for_chain(
            Arc::clone(&self.rpc),
            self.settings.token.address,
            &self.endpoint,
            scan,
        );
        let report = match scanner.scan_recent(self.endpoint.scan_window()).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("[{}] Could not read current block, skipping log scan: {}", chain, e);
                None
            }
        };
        let candidates = self.collect_candidates(report.as_ref());

        // 2. contracts among candidates
        let classifier = AddressClassifier::from_settings(Arc::clone(&self.rpc), scan);
        let classifications = classifier.classify_all(&candidates).await;
        let unresolved = classifications.iter().filter(|c| c.is_unresolved()).count();
        let contracts: Vec<Address> = classifications
            .iter()
            .filter(|c| c.is_contract())
            .map(|c| c.address)
            .collect();

        // 3. balances, top holders
        let mut balances = self.read_balances(&contracts).await;
        balances.sort_by(|a, b| b.1.cmp(&a.1));
        balances.truncate(scan.top_holders);

        // 4. pool detection
        let detector = PoolTypeDetector::for_chain(Arc::clone(&self.rpc), &self.endpoint);
        let top: Vec<Address> = balances.iter().map(|(addr, _)| *addr).collect();
        let classes = detector
            .detect_all(
                &top,
                scan.detect_batch_size,
                Duration::from_millis(scan.detect_batch_delay_ms),
            )
            .await;

        let holders: Vec<ContractHolderRecord> = balances
            .iter()
            .zip(classes)
            .filter_map(|((address, raw), class)| {
                let balance = self.units(*raw)?;
                Some(ContractHolderRecord {
                    address: *address,
                    balance,
                    percentage: supply.percentage_of(balance),
                    kind: class.kind,
                    protocol: class.protocol,
                })
            })
            .collect();

        // 5. prices
        let pool_prices = self.price_pools(&holders, rate).await;

        let discovery = DiscoverySummary {
            scanned: report.as_ref().map(|r| r.range),
            chunks: report.as_ref().map_or(0, |r| r.chunks.len()),
            omitted_chunks: report.as_ref().map_or(0, |r| r.omitted_count()),
            transfer_events: report.as_ref().map_or(0, |r| r.event_count()),
            candidates: candidates.len(),
            contracts: contracts.len(),
            unresolved_addresses: unresolved,
        };
        info!(
            "[{}] Full refresh done: {} events, {} candidates, {} contracts, {} holders, {} prices ({} chunks omitted)",
            chain,
            discovery.transfer_events,
            discovery.candidates,
            discovery.contracts,
            holders.len(),
            pool_prices.len(),
            discovery.omitted_chunks
        );
        Ok(self.snapshot(supply, holders, pool_prices, Some(discovery)))
    }

    /// Re-reads supply and re-prices the pools of `prior`, keeping its holder list.
    pub async fn refresh_prices(
        &self,
        prior: &ChainSnapshot,
        rate: ReferenceRate,
    ) -> Result<ChainSnapshot, ChainFetchError> {
        let supply = self.read_supply().await?;
        let pool_prices = self.price_pools(&prior.contract_holders, rate).await;
        debug!(
            "[{}] Prices refreshed: {} of {} holders priced",
            self.chain(),
            pool_prices.len(),
            prior.contract_holders.len()
        );
        Ok(self.snapshot(
            supply,
            prior.contract_holders.clone(),
            pool_prices,
            prior.discovery.clone(),
        ))
    }

    /// Total supply and operating balance, each retried with linear backoff.
    pub async fn read_supply(&self) -> Result<SupplyFigures, ChainFetchError> {
        let token = self.settings.token.address;
        let wallet = self.settings.token.operating_wallet;
        let (total, operating) = tokio::try_join!(
            self.required_read("total supply", || self.rpc.total_supply(token)),
            self.required_read("operating balance", || self.rpc.balance_of(token, wallet)),
        )?;

        let decimals = self.settings.token.decimals;
        let total_supply = token_units(total, decimals)
            .map_err(|e| self.decode_error("total supply", "totalSupply", e.to_string()))?;
        let operating_balance = token_units(operating, decimals)
            .map_err(|e| self.decode_error("operating balance", "balanceOf", e.to_string()))?;
        Ok(SupplyFigures {
            total_supply,
            operating_balance,
        })
    }

    async fn required_read<F, Fut>(&self, what: &'static str, read: F) -> Result<U256, ChainFetchError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<U256, RpcError>>,
    {
        let rpc = &self.settings.rpc;
        let strategy = linear_backoff(
            Duration::from_millis(rpc.required_read_backoff_ms),
            rpc.required_read_attempts,
        );
        Retry::spawn(strategy, read).await.map_err(|source| {
            warn!("[{}] Failed to fetch {}: {}", self.chain(), what, source);
            ChainFetchError::RequiredRead {
                chain: self.chain().to_string(),
                what,
                source,
            }
        })
    }

    fn decode_error(&self, what: &'static str, method: &'static str, message: String) -> ChainFetchError {
        ChainFetchError::RequiredRead {
            chain: self.chain().to_string(),
            what,
            source: RpcError::Decode { method, message },
        }
    }

    /// Distinct recipients in first-seen order, then the known pool managers.
    fn collect_candidates(&self, report: Option<&ScanReport>) -> Vec<Address> {
        let wallet = self.settings.token.operating_wallet;
        let mut candidates: IndexSet<Address> = report
            .into_iter()
            .flat_map(|r| r.events())
            .map(|event| event.to)
            .filter(|to| !to.is_zero() && *to != wallet)
            .collect();
        candidates.extend(self.endpoint.pool_managers.iter().copied());
        candidates.into_iter().collect()
    }

    /// Non-zero balances of `contracts`; failed reads are left out.
    async fn read_balances(&self, contracts: &[Address]) -> Vec<(Address, U256)> {
        let scan = &self.settings.scan;
        let token = self.settings.token.address;
        let delay = Duration::from_millis(scan.balance_batch_delay_ms);
        let batches = contracts.chunks(scan.balance_batch_size.max(1));
        let total = batches.len();
        let mut out = Vec::new();

        for (i, batch) in batches.enumerate() {
            let results = join_all(
                batch
                    .iter()
                    .map(|addr| async move { (*addr, self.rpc.balance_of(token, *addr).await) }),
            )
            .await;
            for (addr, result) in results {
                match result {
                    Ok(balance) if !balance.is_zero() => out.push((addr, balance)),
                    Ok(_) => {}
                    Err(e) => debug!("[{}] Balance of {:?} unavailable: {}", self.chain(), addr, e),
                }
            }
            if i + 1 < total && !delay.is_zero() {
                sleep(delay).await;
            }
        }
        out
    }

    async fn price_pools(&self, holders: &[ContractHolderRecord], rate: ReferenceRate) -> Vec<PoolPrice> {
        let calculator = PoolPriceCalculator::from_settings(Arc::clone(&self.rpc), &self.settings, rate);
        calculator
            .price_all(holders, self.endpoint.price_delay())
            .await
            .into_iter()
            .filter_map(|outcome| outcome.price())
            .collect()
    }

    fn units(&self, raw: U256) -> Option<f64> {
        token_units(raw, self.settings.token.decimals).ok()
    }

    fn snapshot(
        &self,
        supply: SupplyFigures,
        contract_holders: Vec<ContractHolderRecord>,
        pool_prices: Vec<PoolPrice>,
        discovery: Option<DiscoverySummary>,
    ) -> ChainSnapshot {
        ChainSnapshot {
            chain: self.endpoint.name.clone(),
            total_supply: supply.total_supply,
            operating_balance: supply.operating_balance,
            circulating_supply: supply.circulating_supply(),
            contract_holders,
            pool_prices,
            discovery,
            fetched_at: Utc::now(),
        }
    }
}

fn sort_by_balance(holders: &mut [ContractHolderRecord]) {
    holders.sort_by(|a, b| b.balance.total_cmp(&a.balance));
}
