use ethers::prelude::abigen;

// Same shape is deployed by SushiSwap, QuickSwap, Trader Joe and Pangolin.
abigen!(
    IUniswapV2Pair,
    r#"[
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast)
        function token0() external view returns (address)
        function token1() external view returns (address)
    ]"#,
);
