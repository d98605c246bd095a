//! Integration tests for the per-chain pipeline against an in-memory chain.

mod common;

use common::*;
use multichain_token_sdk::errors::ChainFetchError;
use multichain_token_sdk::pipeline::ChainPipeline;
use multichain_token_sdk::price_oracle::{RateSource, ReferenceRate};
use multichain_token_sdk::pricing::peg_deviation_percent;
use multichain_token_sdk::settings::Settings;
use multichain_token_sdk::types::{ChainSnapshot, PoolKind};
use std::sync::Arc;

const RATE: ReferenceRate = ReferenceRate {
    value: 150.0,
    source: RateSource::Oracle,
};

struct World {
    chain: Arc<FakeChain>,
    pipeline: ChainPipeline,
}

fn v2_pool() -> ethers::types::Address {
    addr(0xb1)
}
fn v3_pool() -> ethers::types::Address {
    addr(0xb2)
}
fn vault() -> ethers::types::Address {
    addr(0xb3)
}
fn drained() -> ethers::types::Address {
    addr(0xb4)
}
fn user() -> ethers::types::Address {
    addr(0xa1)
}
fn old_holder() -> ethers::types::Address {
    addr(0xc1)
}
fn manager() -> ethers::types::Address {
    addr(0xd1)
}

/// Ethereum-like chain: head 10 000, window 5 000, chunks of 1 000.
fn world(configure: impl FnOnce(FakeChain) -> FakeChain) -> World {
    let mut endpoint = endpoint("Ethereum", 1_000, 5_000);
    endpoint.pool_managers = vec![manager()];
    let settings: Settings = fast_settings(vec![endpoint.clone()]);

    let fake = FakeChain::new("Ethereum")
        .head(10_000)
        .supply(1_000_000_000, 100_000_000)
        .erc20(usdc(), "USDC", 6)
        .account(user())
        // 150M tracked tokens against 1M USDC in both pool shapes
        .v2_pool(
            v2_pool(),
            token(),
            usdc(),
            units(150_000_000, 18),
            units(1_000_000, 6),
        )
        .v3_pool(
            v3_pool(),
            usdc(),
            token(),
            sqrt_price_for(units(1_000_000, 6), units(150_000_000, 18)),
            units(50_000_000, 18),
        )
        .contract(vault())
        .holding(vault(), units(10_000_000, 18))
        .contract(drained())
        .contract(old_holder())
        .holding(old_holder(), units(99_000_000, 18))
        .contract(manager())
        .holding(manager(), units(5_000_000, 18))
        .transfer(operating_wallet(), user(), units(1, 18), 5_100)
        .transfer(user(), operating_wallet(), units(1, 18), 5_200)
        .transfer(operating_wallet(), user(), units(1, 18), 6_300)
        .transfer(operating_wallet(), v2_pool(), units(1, 18), 7_400)
        .transfer(operating_wallet(), v3_pool(), units(1, 18), 8_500)
        .transfer(operating_wallet(), vault(), units(1, 18), 9_600)
        .transfer(operating_wallet(), drained(), units(1, 18), 9_700)
        .transfer(user(), ethers::types::Address::zero(), units(1, 18), 9_800)
        .transfer(operating_wallet(), old_holder(), units(1, 18), 100);
    let chain = Arc::new(configure(fake));

    let pipeline = ChainPipeline::new(endpoint, chain.clone(), Arc::new(settings));
    World { chain, pipeline }
}

fn assert_close(a: f64, b: f64, tol: f64) {
    assert!((a - b).abs() <= tol, "{} vs {}", a, b);
}

fn assert_snapshot_invariants(snapshot: &ChainSnapshot) {
    assert_eq!(
        snapshot.circulating_supply,
        snapshot.total_supply - snapshot.operating_balance
    );
    for holder in &snapshot.contract_holders {
        assert!((0.0..=100.0).contains(&holder.percentage));
    }
    for price in &snapshot.pool_prices {
        assert!(price.theoretical_price > 0.0);
        assert_close(
            price.peg_deviation_percent,
            peg_deviation_percent(price.display_price, price.theoretical_price),
            1e-9,
        );
    }
}

#[tokio::test]
async fn full_refresh_discovers_and_prices_pools() {
    let w = world(|c| c);
    let snapshot = w.pipeline.run_full(RATE).await.expect("full run");
    assert_snapshot_invariants(&snapshot);

    assert_eq!(snapshot.chain, "Ethereum");
    assert_eq!(snapshot.total_supply, 1_000_000_000.0);
    assert_eq!(snapshot.operating_balance, 100_000_000.0);
    assert_eq!(snapshot.circulating_supply, 900_000_000.0);

    let holders: Vec<_> = snapshot
        .contract_holders
        .iter()
        .map(|h| (h.address, h.kind))
        .collect();
    assert_eq!(
        holders,
        vec![
            (v2_pool(), PoolKind::DexV2),
            (v3_pool(), PoolKind::DexV3),
            (vault(), PoolKind::Unknown),
            (manager(), PoolKind::DexV4),
        ]
    );
    assert_close(snapshot.contract_holders[0].percentage, 15.0, 1e-9);
    assert_close(snapshot.contract_holders[3].percentage, 0.5, 1e-9);
    assert_eq!(
        snapshot.contract_holders[0].protocol.as_deref(),
        Some("Uniswap V2 / SushiSwap")
    );

    assert_eq!(snapshot.pool_prices.len(), 2);
    let v2 = &snapshot.pool_prices[0];
    assert_eq!(v2.pool_address, v2_pool());
    assert_eq!(v2.pair_token, "USDC");
    assert_close(v2.display_price, 150.0, 1e-9);
    assert_eq!(v2.display_format, "1 USDC = 150.00 JPYC");
    assert_eq!(v2.theoretical_price, 150.0);
    assert_close(v2.peg_deviation_percent, 0.0, 1e-9);
    assert_close(v2.liquidity, 150_000_000.0, 1e-3);

    let v3 = &snapshot.pool_prices[1];
    assert_eq!(v3.pool_address, v3_pool());
    assert_eq!(v3.protocol, "Uniswap V3");
    assert_close(v3.display_price, v2.display_price, 1e-6);
    assert_close(v3.liquidity, 50_000_000.0, 1e-3);

    let discovery = snapshot.discovery.expect("discovery summary");
    let scanned = discovery.scanned.expect("scanned range");
    assert_eq!((scanned.from, scanned.to), (5_000, 10_000));
    assert_eq!(discovery.chunks, 6);
    assert_eq!(discovery.omitted_chunks, 0);
    assert_eq!(discovery.transfer_events, 8);
    // user, v2, v3, vault, drained, manager
    assert_eq!(discovery.candidates, 6);
    assert_eq!(discovery.contracts, 5);
    assert_eq!(discovery.unresolved_addresses, 0);
}

#[tokio::test]
async fn repeated_recipient_is_checked_once() {
    let w = world(|c| c);
    w.pipeline.run_full(RATE).await.expect("full run");
    assert_eq!(w.chain.code_calls(user()), 1);
    assert_eq!(w.chain.code_calls(operating_wallet()), 0);
    assert_eq!(w.chain.code_calls(ethers::types::Address::zero()), 0);
    assert_eq!(w.chain.code_calls(old_holder()), 0);
}

#[tokio::test]
async fn omitted_chunk_reduces_completeness_only() {
    // the v2 pool's only transfer is in 7000..=7999
    let w = world(|c| c.fail_log_range(7_000, 7_999, usize::MAX));
    let snapshot = w.pipeline.run_full(RATE).await.expect("full run");

    let discovery = snapshot.discovery.as_ref().expect("discovery summary");
    assert_eq!(discovery.omitted_chunks, 1);
    assert!(snapshot.contract_holders.iter().all(|h| h.address != v2_pool()));
    assert_eq!(snapshot.pool_prices.len(), 1);
    assert_eq!(snapshot.pool_prices[0].pool_address, v3_pool());
}

#[tokio::test]
async fn unresolved_address_is_not_a_holder() {
    let w = world(|c| c.fail_code(vault(), usize::MAX));
    let snapshot = w.pipeline.run_full(RATE).await.expect("full run");

    assert!(snapshot.contract_holders.iter().all(|h| h.address != vault()));
    assert_eq!(snapshot.discovery.as_ref().map(|d| d.unresolved_addresses), Some(1));
}

#[tokio::test]
async fn failed_balance_read_drops_only_that_holder() {
    let w = world(|c| c.fail_balance(vault(), usize::MAX));
    let snapshot = w.pipeline.run_full(RATE).await.expect("full run");
    assert_eq!(snapshot.contract_holders.len(), 3);
    assert_eq!(snapshot.pool_prices.len(), 2);
}

#[tokio::test]
async fn unreadable_head_skips_discovery_but_keeps_supply() {
    let w = world(|c| c.fail_block_number());
    let snapshot = w.pipeline.run_full(RATE).await.expect("full run");

    assert_eq!(snapshot.circulating_supply, 900_000_000.0);
    // only the configured pool manager is left as a candidate
    assert_eq!(snapshot.contract_holders.len(), 1);
    assert_eq!(snapshot.contract_holders[0].kind, PoolKind::DexV4);
    assert!(snapshot.pool_prices.is_empty());

    let discovery = snapshot.discovery.expect("discovery summary");
    assert_eq!(discovery.scanned, None);
    assert_eq!((discovery.chunks, discovery.transfer_events), (0, 0));
    assert_eq!(discovery.candidates, 1);
}

#[tokio::test]
async fn light_refresh_reports_pool_managers_only() {
    let w = world(|c| c);
    let snapshot = w.pipeline.run_light().await.expect("light run");
    assert_snapshot_invariants(&snapshot);

    assert!(w.chain.log_calls().is_empty());
    assert_eq!(w.chain.code_calls(manager()), 0);
    assert_eq!(snapshot.contract_holders.len(), 1);
    let holder = &snapshot.contract_holders[0];
    assert_eq!(holder.address, manager());
    assert_eq!(holder.kind, PoolKind::DexV4);
    assert_eq!(holder.protocol.as_deref(), Some("Uniswap V4"));
    assert_eq!(holder.balance, 5_000_000.0);
    assert!(snapshot.pool_prices.is_empty());
    assert!(snapshot.discovery.is_none());
}

#[tokio::test]
async fn light_refresh_skips_empty_managers() {
    let w = world(|c| c.holding(manager(), ethers::types::U256::zero()));
    let snapshot = w.pipeline.run_light().await.expect("light run");
    assert!(snapshot.contract_holders.is_empty());
}

#[tokio::test]
async fn supply_failure_fails_the_chain() {
    let w = world(|c| c.fail_supply());
    let err = w.pipeline.run_full(RATE).await.unwrap_err();
    match err {
        ChainFetchError::RequiredRead { chain, what, .. } => {
            assert_eq!(chain, "Ethereum");
            assert_eq!(what, "total supply");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(w.pipeline.run_light().await.is_err());
}

#[tokio::test]
async fn operating_balance_failure_fails_the_chain() {
    let w = world(|c| c.fail_balance(operating_wallet(), usize::MAX));
    let err = w.pipeline.run_light().await.unwrap_err();
    assert!(err.to_string().contains("operating balance"), "{}", err);
}

#[tokio::test]
async fn transient_supply_failure_is_retried() {
    let w = world(|c| c.fail_balance(operating_wallet(), 2));
    let snapshot = w.pipeline.run_light().await.expect("third attempt succeeds");
    assert_eq!(snapshot.operating_balance, 100_000_000.0);
}

#[tokio::test]
async fn refresh_prices_reuses_prior_holders() {
    let w = world(|c| c);
    let prior = w.pipeline.run_full(RATE).await.expect("full run");
    let scans = w.chain.log_calls().len();

    // pool moves to 1 USDC = 151.5 tokens
    w.chain
        .set_reserves(v2_pool(), units(151_500_000, 18), units(1_000_000, 6));
    let refreshed = w.pipeline.refresh_prices(&prior, RATE).await.expect("refresh");
    assert_snapshot_invariants(&refreshed);

    assert_eq!(w.chain.log_calls().len(), scans);
    assert_eq!(refreshed.contract_holders, prior.contract_holders);
    assert_eq!(refreshed.discovery, prior.discovery);
    let v2 = refreshed
        .pool_prices
        .iter()
        .find(|p| p.pool_address == v2_pool())
        .expect("v2 price");
    assert_close(v2.display_price, 151.5, 1e-9);
    assert_close(v2.peg_deviation_percent, 1.0, 1e-9);
}

#[tokio::test]
async fn refresh_prices_fails_on_supply_error() {
    let w = world(|c| c);
    let prior = w.pipeline.run_full(RATE).await.expect("full run");
    w.chain.set_fail_supply(true);
    assert!(w.pipeline.refresh_prices(&prior, RATE).await.is_err());
}

#[tokio::test]
async fn weth_pair_uses_assumed_major_price() {
    let weth_pool = addr(0xb5);
    // 1 WETH = 450 000 tokens
    let w = world(|c| {
        c.erc20(weth(), "WETH", 18)
            .v2_pool(
                weth_pool,
                token(),
                weth(),
                units(450_000_000, 18),
                units(1_000, 18),
            )
            .transfer(operating_wallet(), weth_pool, units(1, 18), 9_900)
    });
    let snapshot = w.pipeline.run_full(RATE).await.expect("full run");
    let price = snapshot
        .pool_prices
        .iter()
        .find(|p| p.pool_address == weth_pool)
        .expect("weth pool priced");

    assert_eq!(price.theoretical_price, 450_000.0);
    assert_close(price.display_price, 450_000.0, 1e-6);
    assert_close(price.peg_deviation_percent, 0.0, 1e-9);
    // 1 token = 1/450 000 WETH = 1/150 USD at the assumed price
    assert_close(price.token_usd_price, 1.0 / 150.0, 1e-12);
}

#[tokio::test]
async fn pool_without_token_metadata_is_omitted() {
    let stray = addr(0xb6);
    let unknown_pair = addr(0x5000);
    let w = world(|c| {
        c.v2_pool(stray, token(), unknown_pair, units(1_000, 18), units(1_000, 18))
            .transfer(operating_wallet(), stray, units(1, 18), 9_950)
    });
    let snapshot = w.pipeline.run_full(RATE).await.expect("full run");

    assert!(snapshot
        .contract_holders
        .iter()
        .any(|h| h.address == stray && h.kind == PoolKind::DexV2));
    assert!(snapshot.pool_prices.iter().all(|p| p.pool_address != stray));
    assert_eq!(snapshot.pool_prices.len(), 2);
}
