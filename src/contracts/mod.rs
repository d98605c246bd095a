// Contracts Module - Public ABIs Only

pub mod aggregator_v3_interface;
pub mod erc20;
pub mod i_uniswap_v2_pair;
pub mod i_uniswap_v3_pool;

// Public exports
pub use aggregator_v3_interface::AggregatorV3Interface;
pub use erc20::{Erc20, TransferFilter};
pub use i_uniswap_v2_pair::IUniswapV2Pair;
pub use i_uniswap_v3_pool::IUniswapV3Pool;
