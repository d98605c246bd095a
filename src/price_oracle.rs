//! Reference fiat rate from a fixed-point aggregator feed on one designated chain.
//!
//! The feed quotes the rate in the opposite direction (USD per token-fiat unit), so the
//! scaled answer is inverted. Any failure falls back to a static rate; callers always
//! receive a usable, strictly positive value.

use ethers::types::{Address, I256};
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;

use crate::metrics;
use crate::rpc_client::ChainRpc;
use crate::types::conversions::token_units;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    Oracle,
    Fallback,
}

impl RateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateSource::Oracle => "oracle",
            RateSource::Fallback => "fallback",
        }
    }
}

/// Rate shared by every chain and pool of one batch run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReferenceRate {
    pub value: f64,
    pub source: RateSource,
}

impl ReferenceRate {
    pub fn fallback(value: f64) -> Self {
        Self {
            value,
            source: RateSource::Fallback,
        }
    }
}

/// Scales a feed answer and inverts it. `None` for non-positive or non-finite results.
pub fn rate_from_answer(answer: I256, decimals: u8) -> Option<f64> {
    if answer <= I256::zero() {
        return None;
    }
    let scaled = token_units(answer.into_raw(), decimals).ok()?;
    if !(scaled.is_finite() && scaled > 0.0) {
        return None;
    }
    let rate = 1.0 / scaled;
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

pub struct PriceOracleAdapter {
    rpc: Option<Arc<dyn ChainRpc>>,
    feed: Address,
    fallback_rate: f64,
}

impl PriceOracleAdapter {
    /// `rpc` is the reference chain's client; `None` always yields the fallback.
    pub fn new(rpc: Option<Arc<dyn ChainRpc>>, feed: Address, fallback_rate: f64) -> Self {
        Self {
            rpc,
            feed,
            fallback_rate,
        }
    }

    pub async fn reference_rate(&self) -> ReferenceRate {
        let rate = match self.read_feed().await {
            Ok(value) => {
                info!("Reference rate from oracle: {:.4}", value);
                ReferenceRate {
                    value,
                    source: RateSource::Oracle,
                }
            }
            Err(reason) => {
                warn!(
                    "Oracle unavailable ({}), using fallback rate {}",
                    reason, self.fallback_rate
                );
                ReferenceRate::fallback(self.fallback_rate)
            }
        };
        metrics::set_reference_rate(rate.value, rate.source.as_str());
        rate
    }

    async fn read_feed(&self) -> Result<f64, String> {
        let rpc = self
            .rpc
            .as_ref()
            .ok_or_else(|| "reference chain not configured".to_string())?;
        let answer = rpc
            .feed_answer(self.feed)
            .await
            .map_err(|e| format!("[{}] {}", rpc.chain_name(), e))?;
        rate_from_answer(answer.answer, answer.decimals)
            .ok_or_else(|| format!("malformed feed answer {}", answer.answer))
    }
}
