use ethers::prelude::abigen;

abigen!(
    Erc20,
    r#"[
        function totalSupply() external view returns (uint256)
        function balanceOf(address account) external view returns (uint256)
        function decimals() external view returns (uint8)
        function symbol() external view returns (string)
        event Transfer(address indexed from, address indexed to, uint256 value)
    ]"#,
);
