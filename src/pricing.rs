//! # Pool Price Calculator
//!
//! Derives a displayable quote for a classified pool and compares it with the theoretical
//! price implied by the reference rate.
//!
//! Two algorithms, selected by [`PoolKind`]:
//!
//! - **Reserve ratio** ([`PoolKind::DexV2`]): `pairPerToken = pairReserve / tokenReserve`,
//!   both scaled by their own decimals. Liquidity is the tracked-token reserve.
//! - **Square-root price** ([`PoolKind::DexV3`]): `(sqrtPriceX96 / 2^96)^2` scaled by
//!   `10^(decimals0 - decimals1)` gives token1 per token0, used directly when the tracked
//!   token is token0 and inverted otherwise. Liquidity is the tracked token's balance held
//!   by the pool.
//!
//! Both then quote `displayPrice = 1 / pairPerToken`, i.e. "1 pair token = N tracked tokens".
//!
//! Any failure produces [`PricingOutcome::Omitted`]; the pool simply drops out of the list.
//! No pricing algorithm exists for pool-manager kinds.

use ethers::types::{Address, U256};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::contracts::i_uniswap_v3_pool::validate_sqrt_price;
use crate::errors::PricingError;
use crate::metrics;
use crate::price_oracle::ReferenceRate;
use crate::rpc_client::ChainRpc;
use crate::settings::Settings;
use crate::types::conversions::{token_units, u256_to_f64};
use crate::types::{ContractHolderRecord, PoolKind, PoolPrice};

/// 2^96 as f64
const Q96: f64 = 79_228_162_514_264_337_593_543_950_336.0;

/// How a pair token relates to the reference rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairClass {
    FiatPegged,
    VolatileMajor,
}

pub fn pair_class(symbol: &str) -> PairClass {
    match symbol.to_ascii_uppercase().as_str() {
        "WETH" | "ETH" => PairClass::VolatileMajor,
        // USDC, USDT, DAI and anything unrecognised
        _ => PairClass::FiatPegged,
    }
}

/// Expected tracked tokens per pair token. `major_asset_usd` is a static approximation.
pub fn theoretical_price(pair_symbol: &str, reference_rate: f64, major_asset_usd: f64) -> f64 {
    match pair_class(pair_symbol) {
        PairClass::FiatPegged => reference_rate,
        PairClass::VolatileMajor => reference_rate * major_asset_usd,
    }
}

/// USD value of one tracked token, approximated through the pair token.
pub fn token_usd_price(pair_symbol: &str, pair_per_token: f64, major_asset_usd: f64) -> f64 {
    match pair_class(pair_symbol) {
        PairClass::FiatPegged => pair_per_token,
        PairClass::VolatileMajor => pair_per_token * major_asset_usd,
    }
}

pub fn peg_deviation_percent(display_price: f64, theoretical_price: f64) -> f64 {
    (display_price - theoretical_price) / theoretical_price * 100.0
}

pub fn display_price(pair_per_token: f64) -> Result<f64, PricingError> {
    finite_positive(1.0 / pair_per_token)
}

pub fn display_format(pair_symbol: &str, display_price: f64, token_symbol: &str) -> String {
    format!("1 {} = {:.2} {}", pair_symbol, display_price, token_symbol)
}

pub fn pair_per_token_from_reserves(
    token_reserve: U256,
    pair_reserve: U256,
    token_decimals: u8,
    pair_decimals: u8,
) -> Result<f64, PricingError> {
    if token_reserve.is_zero() {
        return Err(PricingError::ZeroTokenReserve);
    }
    let token = token_units(token_reserve, token_decimals).map_err(|_| PricingError::InvalidPrice)?;
    let pair = token_units(pair_reserve, pair_decimals).map_err(|_| PricingError::InvalidPrice)?;
    if token <= 0.0 {
        return Err(PricingError::ZeroTokenReserve);
    }
    finite_positive(pair / token)
}

pub fn pair_per_token_from_sqrt_price(
    sqrt_price_x96: U256,
    token_is_token0: bool,
    decimals0: u8,
    decimals1: u8,
) -> Result<f64, PricingError> {
    let ratio = u256_to_f64(sqrt_price_x96) / Q96;
    let raw = ratio * ratio;
    let token1_per_token0 = raw * 10f64.powi(decimals0 as i32 - decimals1 as i32);
    let pair_per_token = if token_is_token0 {
        token1_per_token0
    } else {
        1.0 / token1_per_token0
    };
    finite_positive(pair_per_token)
}

fn finite_positive(value: f64) -> Result<f64, PricingError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(PricingError::InvalidPrice)
    }
}

/// Price of one holder, or the reason it has none.
#[derive(Debug, Clone, PartialEq)]
pub enum PricingOutcome {
    Priced(PoolPrice),
    Omitted {
        pool: Address,
        reason: PricingError,
    },
}

impl PricingOutcome {
    pub fn price(self) -> Option<PoolPrice> {
        match self {
            PricingOutcome::Priced(price) => Some(price),
            PricingOutcome::Omitted { .. } => None,
        }
    }
}

/// Pool state read from chain before orientation.
struct PairQuote {
    pair_symbol: String,
    pair_per_token: f64,
    liquidity: f64,
}

pub struct PoolPriceCalculator {
    rpc: Arc<dyn ChainRpc>,
    token: Address,
    token_symbol: String,
    token_decimals: u8,
    rate: ReferenceRate,
    major_asset_usd: f64,
}

impl PoolPriceCalculator {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        token: Address,
        token_symbol: impl Into<String>,
        token_decimals: u8,
        rate: ReferenceRate,
        major_asset_usd: f64,
    ) -> Self {
        Self {
            rpc,
            token,
            token_symbol: token_symbol.into(),
            token_decimals,
            rate,
            major_asset_usd,
        }
    }

    pub fn from_settings(rpc: Arc<dyn ChainRpc>, settings: &Settings, rate: ReferenceRate) -> Self {
        Self::new(
            rpc,
            settings.token.address,
            settings.token.symbol.clone(),
            settings.token.decimals,
            rate,
            settings.oracle.assumed_major_asset_usd,
        )
    }

    pub async fn price(&self, holder: &ContractHolderRecord) -> PricingOutcome {
        let quote = match holder.kind {
            PoolKind::DexV2 => self.quote_reserves(holder.address).await,
            PoolKind::DexV3 => self.quote_sqrt_price(holder.address).await,
            other => Err(PricingError::Unsupported(other)),
        };

        match quote.and_then(|q| self.build(holder, q)) {
            Ok(price) => PricingOutcome::Priced(price),
            Err(reason) => self.omit(holder.address, reason),
        }
    }

    /// One outcome per holder, in order. Priceable pools are fetched one at a time with
    /// `delay` between them; other kinds are omitted without a round trip or a pause.
    pub async fn price_all(
        &self,
        holders: &[ContractHolderRecord],
        delay: Duration,
    ) -> Vec<PricingOutcome> {
        let mut out = Vec::with_capacity(holders.len());
        let mut fetched = 0usize;
        for holder in holders {
            if !holder.kind.is_priceable() {
                out.push(self.omit(holder.address, PricingError::Unsupported(holder.kind)));
                continue;
            }
            if fetched > 0 && !delay.is_zero() {
                sleep(delay).await;
            }
            fetched += 1;
            out.push(self.price(holder).await);
        }
        out
    }

    fn omit(&self, pool: Address, reason: PricingError) -> PricingOutcome {
        let chain = self.rpc.chain_name();
        if matches!(reason, PricingError::Unsupported(_)) {
            debug!("[{}] No pricing for {:?}: {}", chain, pool, reason);
        } else {
            warn!("[{}] Omitting price for {:?}: {}", chain, pool, reason);
        }
        metrics::increment_omitted_price(chain, reason.reason());
        PricingOutcome::Omitted { pool, reason }
    }

    fn build(&self, holder: &ContractHolderRecord, quote: PairQuote) -> Result<PoolPrice, PricingError> {
        let display = display_price(quote.pair_per_token)?;
        let theoretical = theoretical_price(&quote.pair_symbol, self.rate.value, self.major_asset_usd);
        if !(theoretical.is_finite() && theoretical > 0.0) {
            return Err(PricingError::InvalidPrice);
        }
        Ok(PoolPrice {
            pool_address: holder.address,
            protocol: holder
                .protocol
                .clone()
                .unwrap_or_else(|| holder.kind.as_str().to_string()),
            display_format: display_format(&quote.pair_symbol, display, &self.token_symbol),
            token_usd_price: token_usd_price(
                &quote.pair_symbol,
                quote.pair_per_token,
                self.major_asset_usd,
            ),
            pair_token: quote.pair_symbol,
            display_price: display,
            theoretical_price: theoretical,
            peg_deviation_percent: peg_deviation_percent(display, theoretical),
            liquidity: quote.liquidity,
        })
    }

    /// Which side holds the tracked token, plus the other token's address.
    async fn locate_token(&self, pool: Address) -> Result<(bool, Address), PricingError> {
        let (token0, token1) = self.rpc.pool_tokens(pool).await?;
        if token0 == self.token {
            Ok((true, token1))
        } else if token1 == self.token {
            Ok((false, token0))
        } else {
            Err(PricingError::TokenNotInPool)
        }
    }

    async fn pair_metadata(&self, pair: Address) -> Result<(String, u8), PricingError> {
        let (symbol, decimals) = tokio::try_join!(
            self.rpc.token_symbol(pair),
            self.rpc.token_decimals(pair)
        )?;
        Ok((symbol, decimals))
    }

    async fn quote_reserves(&self, pool: Address) -> Result<PairQuote, PricingError> {
        let (token_is_0, pair) = self.locate_token(pool).await?;
        let (reserve0, reserve1) = self.rpc.reserves(pool).await?;
        let (pair_symbol, pair_decimals) = self.pair_metadata(pair).await?;

        let (token_reserve, pair_reserve) = if token_is_0 {
            (reserve0, reserve1)
        } else {
            (reserve1, reserve0)
        };
        let pair_per_token = pair_per_token_from_reserves(
            token_reserve,
            pair_reserve,
            self.token_decimals,
            pair_decimals,
        )?;
        let liquidity =
            token_units(token_reserve, self.token_decimals).map_err(|_| PricingError::InvalidPrice)?;
        Ok(PairQuote {
            pair_symbol,
            pair_per_token,
            liquidity,
        })
    }

    async fn quote_sqrt_price(&self, pool: Address) -> Result<PairQuote, PricingError> {
        let (token_is_0, pair) = self.locate_token(pool).await?;
        let sqrt_price = self.rpc.sqrt_price_x96(pool).await?;
        validate_sqrt_price(sqrt_price, &pool).map_err(|_| PricingError::InvalidPrice)?;
        let (pair_symbol, pair_decimals) = self.pair_metadata(pair).await?;

        let (decimals0, decimals1) = if token_is_0 {
            (self.token_decimals, pair_decimals)
        } else {
            (pair_decimals, self.token_decimals)
        };
        let pair_per_token =
            pair_per_token_from_sqrt_price(sqrt_price, token_is_0, decimals0, decimals1)?;
        let balance = self.rpc.balance_of(self.token, pool).await?;
        let liquidity =
            token_units(balance, self.token_decimals).map_err(|_| PricingError::InvalidPrice)?;
        Ok(PairQuote {
            pair_symbol,
            pair_per_token,
            liquidity,
        })
    }
}
