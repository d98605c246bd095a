//! # Chain RPC Client
//!
//! Thin wrapper around one node endpoint. Every other component reads chain state through
//! the [`ChainRpc`] trait, never through a raw provider.
//!
//! Each call is bounded by a timeout and fails with an [`RpcError`]. There is no retry at
//! this layer: log scans, code lookups and required reads each apply their own policy.

use async_trait::async_trait;
use ethers::contract::parse_log;
use ethers::prelude::{Http, Middleware, Provider};
use ethers::types::{Address, BlockNumber, Bytes, Filter, I256, U256};
use log::debug;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::contracts::{AggregatorV3Interface, Erc20, IUniswapV2Pair, IUniswapV3Pool, TransferFilter};
use crate::errors::{RpcError, RpcResult};
use crate::metrics;
use crate::types::LogEvent;

/// Hashed into topic0 by `Filter::event`.
pub const TRANSFER_EVENT_SIGNATURE: &str = "Transfer(address,address,uint256)";

/// Latest answer of a fixed-point price feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedAnswer {
    pub answer: I256,
    pub decimals: u8,
}

/// Read-only view of one chain.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Name used in logs and metrics.
    fn chain_name(&self) -> &str;

    async fn block_number(&self) -> RpcResult<u64>;

    /// Deployed bytecode; empty for externally-owned accounts.
    async fn code_at(&self, address: Address) -> RpcResult<Bytes>;

    /// Transfer events emitted by `token` within `[from_block, to_block]`.
    async fn transfer_logs(
        &self,
        token: Address,
        from_block: u64,
        to_block: u64,
    ) -> RpcResult<Vec<LogEvent>>;

    async fn total_supply(&self, token: Address) -> RpcResult<U256>;

    async fn balance_of(&self, token: Address, holder: Address) -> RpcResult<U256>;

    async fn token_decimals(&self, token: Address) -> RpcResult<u8>;

    async fn token_symbol(&self, token: Address) -> RpcResult<String>;

    /// `(token0, token1)` of a two-token pool.
    async fn pool_tokens(&self, pool: Address) -> RpcResult<(Address, Address)>;

    /// `(reserve0, reserve1)` of a two-reserve pool.
    async fn reserves(&self, pool: Address) -> RpcResult<(U256, U256)>;

    /// `sqrtPriceX96` from a single-pool state slot.
    async fn sqrt_price_x96(&self, pool: Address) -> RpcResult<U256>;

    async fn feed_answer(&self, feed: Address) -> RpcResult<FeedAnswer>;
}

/// [`ChainRpc`] backed by an ethers HTTP provider.
#[derive(Clone)]
pub struct EthersRpcClient {
    chain: String,
    provider: Arc<Provider<Http>>,
    call_timeout: Duration,
}

impl EthersRpcClient {
    pub fn new(chain: impl Into<String>, rpc_url: &str, call_timeout: Duration) -> anyhow::Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| anyhow::anyhow!("invalid rpc url {}: {}", rpc_url, e))?;
        Ok(Self {
            chain: chain.into(),
            provider: Arc::new(provider),
            call_timeout,
        })
    }

    /// Runs one round trip under the call timeout and records it.
    async fn bounded<T, E, F>(&self, method: &'static str, fut: F) -> RpcResult<T>
    where
        E: std::fmt::Display,
        F: Future<Output = Result<T, E>>,
    {
        let start = Instant::now();
        let result = match timeout(self.call_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(RpcError::Transport {
                method,
                message: e.to_string(),
            }),
            Err(_) => Err(RpcError::Timeout {
                method,
                after: self.call_timeout,
            }),
        };
        let duration = start.elapsed();
        metrics::record_rpc_call(&self.chain, method, duration, result.is_ok());
        debug!(
            "[RPC_TRACE] {} -> {}: duration={:?}, ok={}",
            self.chain,
            method,
            duration,
            result.is_ok()
        );
        result
    }
}

#[async_trait]
impl ChainRpc for EthersRpcClient {
    fn chain_name(&self) -> &str {
        &self.chain
    }

    async fn block_number(&self) -> RpcResult<u64> {
        let block = self
            .bounded("eth_blockNumber", self.provider.get_block_number())
            .await?;
        Ok(block.as_u64())
    }

    async fn code_at(&self, address: Address) -> RpcResult<Bytes> {
        self.bounded("eth_getCode", self.provider.get_code(address, None))
            .await
    }

    async fn transfer_logs(
        &self,
        token: Address,
        from_block: u64,
        to_block: u64,
    ) -> RpcResult<Vec<LogEvent>> {
        let filter = Filter::new()
            .address(token)
            .event(TRANSFER_EVENT_SIGNATURE)
            .from_block(BlockNumber::Number(from_block.into()))
            .to_block(BlockNumber::Number(to_block.into()));
        let logs = self
            .bounded("eth_getLogs", self.provider.get_logs(&filter))
            .await?;

        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            let block_number = log.block_number.map(|b| b.as_u64()).unwrap_or(from_block);
            match parse_log::<TransferFilter>(log) {
                Ok(transfer) => events.push(LogEvent {
                    from: transfer.from,
                    to: transfer.to,
                    amount: transfer.value,
                    block_number,
                }),
                Err(e) => debug!(
                    "[{}] Skipping undecodable Transfer log at block {}: {}",
                    self.chain, block_number, e
                ),
            }
        }
        Ok(events)
    }

    async fn total_supply(&self, token: Address) -> RpcResult<U256> {
        let erc20 = Erc20::new(token, Arc::clone(&self.provider));
        let call = erc20.total_supply();
        self.bounded("totalSupply", call.call()).await
    }

    async fn balance_of(&self, token: Address, holder: Address) -> RpcResult<U256> {
        let erc20 = Erc20::new(token, Arc::clone(&self.provider));
        let call = erc20.balance_of(holder);
        self.bounded("balanceOf", call.call()).await
    }

    async fn token_decimals(&self, token: Address) -> RpcResult<u8> {
        let erc20 = Erc20::new(token, Arc::clone(&self.provider));
        let call = erc20.decimals();
        self.bounded("decimals", call.call()).await
    }

    async fn token_symbol(&self, token: Address) -> RpcResult<String> {
        let erc20 = Erc20::new(token, Arc::clone(&self.provider));
        let call = erc20.symbol();
        self.bounded("symbol", call.call()).await
    }

    async fn pool_tokens(&self, pool: Address) -> RpcResult<(Address, Address)> {
        // token0()/token1() share selectors across both pool shapes
        let pair = IUniswapV2Pair::new(pool, Arc::clone(&self.provider));
        let token0_call = pair.token_0();
        let token1_call = pair.token_1();
        let (token0, token1) = tokio::try_join!(
            self.bounded("token0", token0_call.call()),
            self.bounded("token1", token1_call.call()),
        )?;
        Ok((token0, token1))
    }

    async fn reserves(&self, pool: Address) -> RpcResult<(U256, U256)> {
        let pair = IUniswapV2Pair::new(pool, Arc::clone(&self.provider));
        let call = pair.get_reserves();
        let (reserve0, reserve1, _timestamp) = self.bounded("getReserves", call.call()).await?;
        Ok((U256::from(reserve0), U256::from(reserve1)))
    }

    async fn sqrt_price_x96(&self, pool: Address) -> RpcResult<U256> {
        let v3 = IUniswapV3Pool::new(pool, Arc::clone(&self.provider));
        let call = v3.slot_0();
        let slot0 = self.bounded("slot0", call.call()).await?;
        Ok(slot0.0)
    }

    async fn feed_answer(&self, feed: Address) -> RpcResult<FeedAnswer> {
        let aggregator = AggregatorV3Interface::new(feed, Arc::clone(&self.provider));
        let round_call = aggregator.latest_round_data();
        let decimals_call = aggregator.decimals();
        let (round, decimals) = tokio::try_join!(
            self.bounded("latestRoundData", round_call.call()),
            self.bounded("decimals", decimals_call.call()),
        )?;
        Ok(FeedAnswer {
            answer: round.1,
            decimals,
        })
    }
}

/// Builds the default client for one configured chain.
pub fn connect(
    endpoint: &crate::settings::ChainEndpoint,
    call_timeout: Duration,
) -> anyhow::Result<Arc<dyn ChainRpc>> {
    let client = EthersRpcClient::new(endpoint.name.clone(), &endpoint.rpc_url, call_timeout)?;
    Ok(Arc::new(client))
}
