//! In-memory chain used by the integration tests.
//!
//! Unset state behaves like a real node would for a plain account: empty code, zero
//! balances, and failing pool calls. Failures are injected per method.

#![allow(dead_code)]

use async_trait::async_trait;
use ethers::types::{Address, Bytes, I256, U256};
use multichain_token_sdk::errors::{RpcError, RpcResult};
use multichain_token_sdk::rpc_client::{ChainRpc, FeedAnswer};
use multichain_token_sdk::settings::{ChainEndpoint, Settings};
use multichain_token_sdk::types::LogEvent;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

pub fn units(amount: u64, decimals: u8) -> U256 {
    U256::from(amount) * U256::exp10(decimals as usize)
}

pub fn token() -> Address {
    addr(0x1000)
}

pub fn operating_wallet() -> Address {
    addr(0x2000)
}

pub fn usdc() -> Address {
    addr(0x3000)
}

pub fn weth() -> Address {
    addr(0x4000)
}

pub fn contract_code() -> Bytes {
    Bytes::from(vec![0x60, 0x80, 0x60, 0x40])
}

fn transport(method: &'static str) -> RpcError {
    RpcError::Transport {
        method,
        message: "injected failure".to_string(),
    }
}

fn missing(method: &'static str) -> RpcError {
    RpcError::Transport {
        method,
        message: "execution reverted".to_string(),
    }
}

#[derive(Default)]
struct State {
    head: u64,
    codes: HashMap<Address, Bytes>,
    logs: Vec<LogEvent>,
    balances: HashMap<(Address, Address), U256>,
    supplies: HashMap<Address, U256>,
    decimals: HashMap<Address, u8>,
    symbols: HashMap<Address, String>,
    pool_tokens: HashMap<Address, (Address, Address)>,
    reserves: HashMap<Address, (U256, U256)>,
    sqrt_prices: HashMap<Address, U256>,
    feed: Option<FeedAnswer>,

    // failures; a count of usize::MAX never runs out
    failing_log_ranges: HashMap<(u64, u64), usize>,
    failing_codes: HashMap<Address, usize>,
    failing_balances: HashMap<(Address, Address), usize>,
    fail_supply: bool,
    fail_block_number: bool,

    log_calls: Vec<(u64, u64)>,
    code_calls: HashMap<Address, usize>,
}

fn take_failure<K: std::hash::Hash + Eq>(map: &mut HashMap<K, usize>, key: &K) -> bool {
    match map.get_mut(key) {
        Some(0) | None => false,
        Some(n) => {
            if *n != usize::MAX {
                *n -= 1;
            }
            true
        }
    }
}

pub struct FakeChain {
    name: String,
    state: Mutex<State>,
}

impl FakeChain {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(State::default()),
        }
    }

    pub fn into_arc(self) -> Arc<dyn ChainRpc> {
        Arc::new(self)
    }

    fn with(self, f: impl FnOnce(&mut State)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn head(self, block: u64) -> Self {
        self.with(|s| s.head = block)
    }

    /// Tracked token with the given total supply and operating balance (18 decimals).
    pub fn supply(self, total: u64, operating: u64) -> Self {
        self.with(|s| {
            s.supplies.insert(token(), units(total, 18));
            s.balances
                .insert((token(), operating_wallet()), units(operating, 18));
            s.decimals.insert(token(), 18);
            s.symbols.insert(token(), "JPYC".into());
        })
    }

    pub fn erc20(self, address: Address, symbol: &str, decimals: u8) -> Self {
        self.with(|s| {
            s.codes.insert(address, contract_code());
            s.symbols.insert(address, symbol.to_string());
            s.decimals.insert(address, decimals);
        })
    }

    pub fn contract(self, address: Address) -> Self {
        self.with(|s| {
            s.codes.insert(address, contract_code());
        })
    }

    /// Recorded code is empty, as for an externally-owned account.
    pub fn account(self, address: Address) -> Self {
        self.with(|s| {
            s.codes.insert(address, Bytes::new());
        })
    }

    pub fn holding(self, holder: Address, amount: U256) -> Self {
        self.with(|s| {
            s.balances.insert((token(), holder), amount);
        })
    }

    pub fn transfer(self, from: Address, to: Address, amount: U256, block: u64) -> Self {
        self.with(|s| {
            s.logs.push(LogEvent {
                from,
                to,
                amount,
                block_number: block,
            })
        })
    }

    /// Two-reserve pool holding the tracked token.
    pub fn v2_pool(
        self,
        pool: Address,
        token0: Address,
        token1: Address,
        reserve0: U256,
        reserve1: U256,
    ) -> Self {
        self.with(|s| {
            s.codes.insert(pool, contract_code());
            s.pool_tokens.insert(pool, (token0, token1));
            s.reserves.insert(pool, (reserve0, reserve1));
            let own = if token0 == token() { reserve0 } else { reserve1 };
            s.balances.insert((token(), pool), own);
        })
    }

    /// Single-state pool; `token_balance` is the tracked token held by the pool.
    pub fn v3_pool(
        self,
        pool: Address,
        token0: Address,
        token1: Address,
        sqrt_price_x96: U256,
        token_balance: U256,
    ) -> Self {
        self.with(|s| {
            s.codes.insert(pool, contract_code());
            s.pool_tokens.insert(pool, (token0, token1));
            s.sqrt_prices.insert(pool, sqrt_price_x96);
            s.balances.insert((token(), pool), token_balance);
        })
    }

    pub fn feed(self, answer: i64, decimals: u8) -> Self {
        self.with(|s| {
            s.feed = Some(FeedAnswer {
                answer: I256::from(answer),
                decimals,
            })
        })
    }

    pub fn fail_log_range(self, from: u64, to: u64, times: usize) -> Self {
        self.with(|s| {
            s.failing_log_ranges.insert((from, to), times);
        })
    }

    pub fn fail_code(self, address: Address, times: usize) -> Self {
        self.with(|s| {
            s.failing_codes.insert(address, times);
        })
    }

    pub fn fail_balance(self, holder: Address, times: usize) -> Self {
        self.with(|s| {
            s.failing_balances.insert((token(), holder), times);
        })
    }

    pub fn fail_supply(self) -> Self {
        self.with(|s| s.fail_supply = true)
    }

    pub fn fail_block_number(self) -> Self {
        self.with(|s| s.fail_block_number = true)
    }

    pub fn set_reserves(&self, pool: Address, reserve0: U256, reserve1: U256) {
        self.state.lock().unwrap().reserves.insert(pool, (reserve0, reserve1));
    }

    pub fn set_fail_supply(&self, fail: bool) {
        self.state.lock().unwrap().fail_supply = fail;
    }

    pub fn log_calls(&self) -> Vec<(u64, u64)> {
        self.state.lock().unwrap().log_calls.clone()
    }

    pub fn code_calls(&self, address: Address) -> usize {
        self.state
            .lock()
            .unwrap()
            .code_calls
            .get(&address)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ChainRpc for FakeChain {
    fn chain_name(&self) -> &str {
        &self.name
    }

    async fn block_number(&self) -> RpcResult<u64> {
        let s = self.state.lock().unwrap();
        if s.fail_block_number {
            return Err(transport("eth_blockNumber"));
        }
        Ok(s.head)
    }

    async fn code_at(&self, address: Address) -> RpcResult<Bytes> {
        let mut s = self.state.lock().unwrap();
        *s.code_calls.entry(address).or_insert(0) += 1;
        if take_failure(&mut s.failing_codes, &address) {
            return Err(transport("eth_getCode"));
        }
        Ok(s.codes.get(&address).cloned().unwrap_or_default())
    }

    async fn transfer_logs(
        &self,
        token: Address,
        from_block: u64,
        to_block: u64,
    ) -> RpcResult<Vec<LogEvent>> {
        let mut s = self.state.lock().unwrap();
        s.log_calls.push((from_block, to_block));
        if take_failure(&mut s.failing_log_ranges, &(from_block, to_block)) {
            return Err(transport("eth_getLogs"));
        }
        if token != self::token() {
            return Ok(Vec::new());
        }
        Ok(s.logs
            .iter()
            .filter(|e| e.block_number >= from_block && e.block_number <= to_block)
            .cloned()
            .collect())
    }

    async fn total_supply(&self, token: Address) -> RpcResult<U256> {
        let s = self.state.lock().unwrap();
        if s.fail_supply {
            return Err(RpcError::Timeout {
                method: "totalSupply",
                after: std::time::Duration::from_secs(10),
            });
        }
        Ok(s.supplies.get(&token).copied().unwrap_or_default())
    }

    async fn balance_of(&self, token: Address, holder: Address) -> RpcResult<U256> {
        let mut s = self.state.lock().unwrap();
        if take_failure(&mut s.failing_balances, &(token, holder)) {
            return Err(transport("balanceOf"));
        }
        Ok(s.balances.get(&(token, holder)).copied().unwrap_or_default())
    }

    async fn token_decimals(&self, token: Address) -> RpcResult<u8> {
        let s = self.state.lock().unwrap();
        s.decimals.get(&token).copied().ok_or_else(|| missing("decimals"))
    }

    async fn token_symbol(&self, token: Address) -> RpcResult<String> {
        let s = self.state.lock().unwrap();
        s.symbols.get(&token).cloned().ok_or_else(|| missing("symbol"))
    }

    async fn pool_tokens(&self, pool: Address) -> RpcResult<(Address, Address)> {
        let s = self.state.lock().unwrap();
        s.pool_tokens.get(&pool).copied().ok_or_else(|| missing("token0"))
    }

    async fn reserves(&self, pool: Address) -> RpcResult<(U256, U256)> {
        let s = self.state.lock().unwrap();
        s.reserves.get(&pool).copied().ok_or_else(|| missing("getReserves"))
    }

    async fn sqrt_price_x96(&self, pool: Address) -> RpcResult<U256> {
        let s = self.state.lock().unwrap();
        s.sqrt_prices.get(&pool).copied().ok_or_else(|| missing("slot0"))
    }

    async fn feed_answer(&self, _feed: Address) -> RpcResult<FeedAnswer> {
        let s = self.state.lock().unwrap();
        s.feed.ok_or_else(|| missing("latestRoundData"))
    }
}

/// Settings for `chains` with every pause set to zero.
pub fn fast_settings(chains: Vec<ChainEndpoint>) -> Settings {
    let mut settings = Settings::default();
    settings.token.address = token();
    settings.token.operating_wallet = operating_wallet();
    settings.scan = settings.scan.without_delays();
    settings.rpc.required_read_backoff_ms = 0;
    if let Some(first) = chains.first() {
        settings.oracle.chain = first.name.clone();
    }
    settings.chains = chains;
    settings
}

/// Endpoint with zero price delay and the given chunk size and window.
pub fn endpoint(name: &str, max_block_range: u64, scan_window: u64) -> ChainEndpoint {
    let mut endpoint = ChainEndpoint::new(name, 1, "http://localhost:8545");
    endpoint.max_block_range = Some(max_block_range);
    endpoint.scan_window = Some(scan_window);
    endpoint.price_delay_ms = Some(0);
    endpoint
}

/// sqrtPriceX96 encoding `reserve1 / reserve0` (raw units).
pub fn sqrt_price_for(reserve0: U256, reserve1: U256) -> U256 {
    let to_f64 = |v: U256| v.to_string().parse::<f64>().unwrap();
    let q96 = 2f64.powi(96);
    let sqrt = (to_f64(reserve1) / to_f64(reserve0)).sqrt() * q96;
    U256::from_dec_str(&format!("{:.0}", sqrt)).unwrap()
}
