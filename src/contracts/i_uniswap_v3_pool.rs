use ethers::prelude::*;

// ═══════════════════════════════════════════════════════════════════════════
// UNISWAP V3 POOL ABI
// ═══════════════════════════════════════════════════════════════════════════
//
// Types must match the Solidity contract exactly:
// - uint160 for sqrtPriceX96 (decoded into U256)
// - int24 for tick (decoded into i32)
//
// Any deviation silently breaks decoding.
// ═══════════════════════════════════════════════════════════════════════════

abigen!(
    IUniswapV3Pool,
    r#"[
        {
            "inputs": [],
            "name": "slot0",
            "outputs": [
                { "internalType": "uint160", "name": "sqrtPriceX96", "type": "uint160" },
                { "internalType": "int24", "name": "tick", "type": "int24" },
                { "internalType": "uint16", "name": "observationIndex", "type": "uint16" },
                { "internalType": "uint16", "name": "observationCardinality", "type": "uint16" },
                { "internalType": "uint16", "name": "observationCardinalityNext", "type": "uint16" },
                { "internalType": "uint8", "name": "feeProtocol", "type": "uint8" },
                { "internalType": "bool", "name": "unlocked", "type": "bool" }
            ],
            "stateMutability": "view",
            "type": "function"
        },
        {
            "inputs": [],
            "name": "token0",
            "outputs": [
                { "internalType": "address", "name": "", "type": "address" }
            ],
            "stateMutability": "view",
            "type": "function"
        },
        {
            "inputs": [],
            "name": "token1",
            "outputs": [
                { "internalType": "address", "name": "", "type": "address" }
            ],
            "stateMutability": "view",
            "type": "function"
        }
    ]"#
);

// ═══════════════════════════════════════════════════════════════════════════
// SLOT0 VALIDATION
// ═══════════════════════════════════════════════════════════════════════════

use ethers::types::U256;

/// sqrt(1.0001^-887272) * 2^96
pub const MIN_SQRT_RATIO: U256 = U256([4295128739, 0, 0, 0]);
/// sqrt(1.0001^887272) * 2^96
pub const MAX_SQRT_RATIO: U256 = U256([6743328256752651558, 17280870778742802505, 4294805859, 0]);

pub fn validate_sqrt_price(sqrt_price_x96: U256, pool_address: &Address) -> Result<(), String> {
    if sqrt_price_x96.is_zero() {
        return Err(format!(
            "Invalid sqrt_price_x96: zero value for pool {:?}",
            pool_address
        ));
    }

    if sqrt_price_x96 < MIN_SQRT_RATIO || sqrt_price_x96 > MAX_SQRT_RATIO {
        return Err(format!(
            "Invalid sqrt_price_x96: {} outside [{}, {}] for pool {:?}",
            sqrt_price_x96, MIN_SQRT_RATIO, MAX_SQRT_RATIO, pool_address
        ));
    }

    Ok(())
}
