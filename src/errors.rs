//! Error taxonomy shared by every pipeline stage.
//!
//! - [`RpcError`]: one failed round trip against a node (timeout, transport, decode).
//!   Always transient from the caller's point of view; retry policy belongs to the caller.
//! - [`ChainFetchError`]: a chain-scoped failure that aborts one chain's run.
//! - [`PricingError`]: why a pool was left out of the price list. Never surfaced to consumers.

use std::time::Duration;

use crate::types::PoolKind;

/// A single RPC call that did not produce a usable answer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RpcError {
    #[error("{method} timed out after {after:?}")]
    Timeout { method: &'static str, after: Duration },
    #[error("{method} failed: {message}")]
    Transport { method: &'static str, message: String },
    #[error("{method} returned an undecodable response: {message}")]
    Decode { method: &'static str, message: String },
}

pub type RpcResult<T> = Result<T, RpcError>;

/// Fatal for one chain's run; the orchestrator turns it into a failed `ChainResult`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChainFetchError {
    #[error("failed to fetch {what} for {chain}: {source}")]
    RequiredRead {
        chain: String,
        what: &'static str,
        #[source]
        source: RpcError,
    },
    #[error("chain {chain} is not configured")]
    UnknownChain { chain: String },
}

/// Reason a pool produced no price.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PricingError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("tracked token reserve is zero")]
    ZeroTokenReserve,
    #[error("tracked token is not one of the pool's tokens")]
    TokenNotInPool,
    #[error("price is not a finite positive number")]
    InvalidPrice,
    #[error("no pricing algorithm for pool kind {0:?}")]
    Unsupported(PoolKind),
}

impl PricingError {
    /// Short label used for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            PricingError::Rpc(_) => "rpc",
            PricingError::ZeroTokenReserve => "zero_reserve",
            PricingError::TokenNotInPool => "token_not_in_pool",
            PricingError::InvalidPrice => "invalid_price",
            PricingError::Unsupported(_) => "unsupported",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_fetch_error_names_chain_and_read() {
        let err = ChainFetchError::RequiredRead {
            chain: "Polygon".to_string(),
            what: "total supply",
            source: RpcError::Timeout {
                method: "totalSupply",
                after: Duration::from_secs(10),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("Polygon"));
        assert!(msg.contains("total supply"));
        assert!(msg.contains("timed out"));
    }

    #[test]
    fn pricing_error_reasons_are_stable() {
        assert_eq!(PricingError::ZeroTokenReserve.reason(), "zero_reserve");
        assert_eq!(PricingError::Unsupported(PoolKind::DexV4).reason(), "unsupported");
        let rpc = PricingError::from(RpcError::Transport {
            method: "slot0",
            message: "execution reverted".into(),
        });
        assert_eq!(rpc.reason(), "rpc");
    }
}
