//! # Multi-Chain Orchestrator
//!
//! The `MultiChainOrchestrator` runs the [`ChainPipeline`] of every configured chain
//! concurrently and merges the outcomes into one [`ChainResult`] per chain.
//!
//! ## Overview
//!
//! Each batch:
//! - Fetches the reference rate once, before fanning out
//! - Spawns one task per chain; chains share nothing but the rate value
//! - Converts a chain's error (or a panicked task) into a failure-tagged result
//! - Returns results in configuration order
//! - Aborts outstanding chain tasks when the refresh future is dropped, so an external
//!   deadline around a refresh also bounds the work it started
//!
//! ## Usage
//!
//! ```rust,no_run
//! use multichain_token_sdk::orchestrator::MultiChainOrchestrator;
//! use multichain_token_sdk::settings::Settings;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let orchestrator = MultiChainOrchestrator::from_settings(Settings::new()?)?;
//!
//! let full = orchestrator.refresh_full().await;
//! let polled = orchestrator.refresh_prices(&full).await;
//! # Ok(())
//! # }
//! ```

use log::{error, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use crate::errors::ChainFetchError;
use crate::metrics;
use crate::pipeline::{ChainPipeline, RefreshMode};
use crate::price_oracle::{PriceOracleAdapter, ReferenceRate};
use crate::rpc_client::{self, ChainRpc};
use crate::settings::{ChainEndpoint, Settings};
use crate::types::{ChainResult, ChainSnapshot};

/// One configured chain with its client.
#[derive(Clone)]
pub struct ChainTarget {
    pub endpoint: ChainEndpoint,
    pub rpc: Arc<dyn ChainRpc>,
}

pub struct MultiChainOrchestrator {
    targets: Vec<ChainTarget>,
    oracle: PriceOracleAdapter,
    settings: Arc<Settings>,
}

impl MultiChainOrchestrator {
    /// Connects every configured chain over HTTP. The oracle reads through the client of
    /// the configured reference chain.
    pub fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let timeout = settings.rpc.timeout();
        let targets = settings
            .chains
            .iter()
            .map(|endpoint| {
                Ok(ChainTarget {
                    endpoint: endpoint.clone(),
                    rpc: rpc_client::connect(endpoint, timeout)?,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self::new(settings, targets))
    }

    pub fn new(settings: Settings, targets: Vec<ChainTarget>) -> Self {
        let oracle_rpc = targets
            .iter()
            .find(|t| t.endpoint.name == settings.oracle.chain)
            .map(|t| Arc::clone(&t.rpc));
        let oracle = PriceOracleAdapter::new(
            oracle_rpc,
            settings.oracle.feed_address,
            settings.oracle.fallback_rate,
        );
        Self::with_oracle(settings, targets, oracle)
    }

    pub fn with_oracle(
        settings: Settings,
        targets: Vec<ChainTarget>,
        oracle: PriceOracleAdapter,
    ) -> Self {
        Self {
            targets,
            oracle,
            settings: Arc::new(settings),
        }
    }

    pub fn chains(&self) -> impl Iterator<Item = &ChainEndpoint> {
        self.targets.iter().map(|t| &t.endpoint)
    }

    pub async fn refresh_light(&self) -> Vec<ChainResult> {
        let rate = self.oracle.reference_rate().await;
        self.run_all(RefreshMode::Light, rate).await
    }

    pub async fn refresh_full(&self) -> Vec<ChainResult> {
        let rate = self.oracle.reference_rate().await;
        self.run_all(RefreshMode::Full, rate).await
    }

    /// Re-reads supply and re-prices pools for every prior success.
    ///
    /// Prior failures are passed through. A chain whose supply re-read fails keeps its
    /// prior result. A prior result for a chain that is no longer configured becomes a
    /// failure.
    pub async fn refresh_prices(&self, prior: &[ChainResult]) -> Vec<ChainResult> {
        let rate = self.oracle.reference_rate().await;
        let started = Instant::now();
        let mode = RefreshMode::Prices.as_str();

        let mut tasks = ChainTasks::with_capacity(prior.len());
        for result in prior {
            let handle = match result {
                ChainResult::Success { snapshot } => self.target(&snapshot.chain).map(|target| {
                    let pipeline = self.pipeline(target);
                    let snapshot = snapshot.clone();
                    tokio::spawn(timed(async move { pipeline.refresh_prices(&snapshot, rate).await }))
                }),
                ChainResult::Failure { .. } => None,
            };
            tasks.push(handle);
        }

        let mut results = Vec::with_capacity(prior.len());
        for (i, previous) in prior.iter().enumerate() {
            let chain = previous.chain().to_string();
            let next = match (previous, tasks.join(i).await) {
                (ChainResult::Failure { .. }, _) => previous.clone(),
                (ChainResult::Success { .. }, None) => {
                    let err = ChainFetchError::UnknownChain { chain: chain.clone() };
                    warn!("[{}] {}", chain, err);
                    ChainResult::Failure {
                        chain,
                        error: err.to_string(),
                    }
                }
                (ChainResult::Success { .. }, Some(joined)) => match joined {
                    Ok((Ok(snapshot), took)) => {
                        metrics::record_chain_refresh(&chain, mode, true, took);
                        ChainResult::Success { snapshot }
                    }
                    Ok((Err(e), took)) => {
                        warn!("[{}] Price refresh failed, keeping previous data: {}", chain, e);
                        metrics::record_chain_refresh(&chain, mode, false, took);
                        previous.clone()
                    }
                    Err(join_err) => {
                        error!(
                            "[{}] Price refresh task failed, keeping previous data: {}",
                            chain, join_err
                        );
                        metrics::record_chain_refresh(&chain, mode, false, started.elapsed());
                        previous.clone()
                    }
                },
            };
            results.push(next);
        }
        results
    }

    async fn run_all(&self, mode: RefreshMode, rate: ReferenceRate) -> Vec<ChainResult> {
        info!(
            "Starting {} refresh of {} chains (reference rate {:.4}, {:?})",
            mode.as_str(),
            self.targets.len(),
            rate.value,
            rate.source
        );
        let started = Instant::now();

        let mut tasks = ChainTasks::with_capacity(self.targets.len());
        for target in &self.targets {
            let pipeline = self.pipeline(target);
            tasks.push(Some(tokio::spawn(timed(async move {
                if mode == RefreshMode::Light {
                    pipeline.run_light().await
                } else {
                    pipeline.run_full(rate).await
                }
            }))));
        }

        let mut results = Vec::with_capacity(self.targets.len());
        for (i, target) in self.targets.iter().enumerate() {
            let chain = target.endpoint.name.clone();
            let (result, took) = match tasks.join(i).await {
                Some(Ok((Ok(snapshot), took))) => (ChainResult::Success { snapshot }, took),
                Some(Ok((Err(e), took))) => {
                    error!("[{}] {} refresh failed: {}", chain, mode.as_str(), e);
                    let failure = ChainResult::Failure {
                        chain: chain.clone(),
                        error: e.to_string(),
                    };
                    (failure, took)
                }
                Some(Err(join_err)) => {
                    error!("[{}] {} refresh task aborted: {}", chain, mode.as_str(), join_err);
                    let failure = ChainResult::Failure {
                        chain: chain.clone(),
                        error: format!("refresh task aborted: {}", join_err),
                    };
                    (failure, started.elapsed())
                }
                // every slot was spawned above
                None => continue,
            };
            metrics::record_chain_refresh(&chain, mode.as_str(), result.is_success(), took);
            results.push(result);
        }

        let ok = results.iter().filter(|r| r.is_success()).count();
        info!(
            "{} refresh finished in {:?}: {}/{} chains succeeded",
            mode.as_str(),
            started.elapsed(),
            ok,
            results.len()
        );
        results
    }

    fn target(&self, chain: &str) -> Option<&ChainTarget> {
        self.targets.iter().find(|t| t.endpoint.name == chain)
    }

    fn pipeline(&self, target: &ChainTarget) -> ChainPipeline {
        ChainPipeline::new(
            target.endpoint.clone(),
            Arc::clone(&target.rpc),
            Arc::clone(&self.settings),
        )
    }
}

type ChainRun = (Result<ChainSnapshot, ChainFetchError>, Duration);

/// Runs `fut` and reports how long it took, measured inside the task.
async fn timed<F>(fut: F) -> ChainRun
where
    F: Future<Output = Result<ChainSnapshot, ChainFetchError>>,
{
    let started = Instant::now();
    let result = fut.await;
    (result, started.elapsed())
}

/// Spawned per-chain runs, one optional slot per input position.
///
/// Dropping it aborts every task that has not been joined, so a caller that gives up on
/// a refresh (for example through `tokio::time::timeout`) stops all chain work with it.
struct ChainTasks {
    handles: Vec<Option<JoinHandle<ChainRun>>>,
}

impl ChainTasks {
    fn with_capacity(n: usize) -> Self {
        Self {
            handles: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, handle: Option<JoinHandle<ChainRun>>) {
        self.handles.push(handle);
    }

    /// Waits for the task at `index`; `None` when that slot never spawned one.
    async fn join(&mut self, index: usize) -> Option<Result<ChainRun, JoinError>> {
        let handle = self.handles.get_mut(index)?.as_mut()?;
        let joined = handle.await;
        self.handles[index] = None;
        Some(joined)
    }
}

impl Drop for ChainTasks {
    fn drop(&mut self) {
        for handle in self.handles.iter().flatten() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn failing(chain: &str) -> Result<ChainSnapshot, ChainFetchError> {
        Err(ChainFetchError::UnknownChain {
            chain: chain.to_string(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn duration_is_measured_inside_each_task() {
        let mut tasks = ChainTasks::with_capacity(2);
        for (chain, ms) in [("Ethereum", 300u64), ("Polygon", 40)] {
            tasks.push(Some(tokio::spawn(timed(async move {
                sleep(Duration::from_millis(ms)).await;
                failing(chain)
            }))));
        }

        // the slow chain is joined first, the fast one still reports its own time
        let (_, slow) = tasks.join(0).await.expect("spawned").expect("joined");
        let (_, fast) = tasks.join(1).await.expect("spawned").expect("joined");
        assert!(slow >= Duration::from_millis(300) && slow < Duration::from_millis(305));
        assert!(fast >= Duration::from_millis(40) && fast < Duration::from_millis(45));
    }

    #[tokio::test]
    async fn empty_slot_joins_to_none() {
        let mut tasks = ChainTasks::with_capacity(1);
        tasks.push(None);
        assert!(tasks.join(0).await.is_none());
        assert!(tasks.join(3).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_tasks_aborts_them() {
        let mut tasks = ChainTasks::with_capacity(1);
        let handle = tokio::spawn(timed(async {
            sleep(Duration::from_secs(60)).await;
            failing("Avalanche")
        }));
        let abort = handle.abort_handle();
        tasks.push(Some(handle));
        drop(tasks);

        sleep(Duration::from_millis(1)).await;
        assert!(abort.is_finished());
    }
}
