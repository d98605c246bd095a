use config::{Config, ConfigError, File};
use ethers::types::Address;
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::time::Duration;

// Deployment defaults for the tracked token (same address on every chain).
const DEFAULT_TOKEN_ADDRESS: &str = "0xE7C3D8C9a439feDe00D2600032D5dB0Be71C3c29";
const DEFAULT_OPERATING_WALLET: &str = "0x8549E82239a88f463ab6E55Ad1895b629a00Def3";
// Fiat/fiat feed expressed as 1 unit of the token's fiat = X USD.
const DEFAULT_ORACLE_FEED: &str = "0xBcE206caE7f0ec07b545EddE332A47C2F75bbeb3";

fn parse_default_address(raw: &str) -> Address {
    raw.parse().unwrap_or_else(|_| Address::zero())
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TokenSettings {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub operating_wallet: Address,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            address: parse_default_address(DEFAULT_TOKEN_ADDRESS),
            symbol: "JPYC".to_string(),
            decimals: 18,
            operating_wallet: parse_default_address(DEFAULT_OPERATING_WALLET),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OracleSettings {
    /// Name of the chain hosting the feed; must be one of `chains`.
    pub chain: String,
    pub feed_address: Address,
    /// Used whenever the feed cannot be read.
    pub fallback_rate: f64,
    /// Static USD price assumed for volatile major pair tokens (WETH/ETH).
    /// Known accuracy limitation: not a live feed.
    pub assumed_major_asset_usd: f64,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            chain: "Ethereum".to_string(),
            feed_address: parse_default_address(DEFAULT_ORACLE_FEED),
            fallback_rate: 150.0,
            assumed_major_asset_usd: 3000.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RpcSettings {
    /// Upper bound on every single RPC round trip.
    pub timeout_ms: u64,
    /// Attempts for total supply / operating balance before the chain fails.
    pub required_read_attempts: usize,
    pub required_read_backoff_ms: u64,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            required_read_attempts: 3,
            required_read_backoff_ms: 1_000,
        }
    }
}

impl RpcSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScanSettings {
    pub chunk_attempts: usize,
    /// Wait before retry n is n * chunk_backoff_ms.
    pub chunk_backoff_ms: u64,
    pub chunk_delay_ms: u64,
    pub classify_batch_size: usize,
    pub classify_batch_delay_ms: u64,
    pub classify_retries: usize,
    pub classify_retry_wait_ms: u64,
    pub balance_batch_size: usize,
    pub balance_batch_delay_ms: u64,
    pub detect_batch_size: usize,
    pub detect_batch_delay_ms: u64,
    pub top_holders: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            chunk_attempts: 3,
            chunk_backoff_ms: 1_000,
            chunk_delay_ms: 200,
            classify_batch_size: 5,
            classify_batch_delay_ms: 500,
            classify_retries: 2,
            classify_retry_wait_ms: 1_000,
            balance_batch_size: 50,
            balance_batch_delay_ms: 300,
            detect_batch_size: 3,
            detect_batch_delay_ms: 300,
            top_holders: 20,
        }
    }
}

impl ScanSettings {
    /// Same settings with every delay set to zero. Used by tests and local nodes.
    pub fn without_delays(mut self) -> Self {
        self.chunk_backoff_ms = 0;
        self.chunk_delay_ms = 0;
        self.classify_batch_delay_ms = 0;
        self.classify_retry_wait_ms = 0;
        self.balance_batch_delay_ms = 0;
        self.detect_batch_delay_ms = 0;
        self
    }
}

/// One configured chain. Loaded once, never mutated.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ChainEndpoint {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    #[serde(default)]
    pub explorer_url: Option<String>,
    #[serde(default)]
    pub max_block_range: Option<u64>,
    #[serde(default)]
    pub scan_window: Option<u64>,
    #[serde(default)]
    pub price_delay_ms: Option<u64>,
    /// Known singleton pool managers on this chain.
    #[serde(default)]
    pub pool_managers: Vec<Address>,
}

impl ChainEndpoint {
    pub fn new(name: impl Into<String>, chain_id: u64, rpc_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chain_id,
            rpc_url: rpc_url.into(),
            explorer_url: None,
            max_block_range: None,
            scan_window: None,
            price_delay_ms: None,
            pool_managers: Vec::new(),
        }
    }

    /// Largest block span one `eth_getLogs` request may cover on this chain.
    pub fn max_block_range(&self) -> u64 {
        self.max_block_range
            .unwrap_or_else(|| default_max_block_range(&self.name))
    }

    /// How many recent blocks a full refresh scans.
    pub fn scan_window(&self) -> u64 {
        self.scan_window
            .unwrap_or_else(|| default_scan_window(&self.name))
    }

    /// Pause between successive pool-price fetches.
    pub fn price_delay(&self) -> Duration {
        Duration::from_millis(
            self.price_delay_ms
                .unwrap_or_else(|| default_price_delay_ms(&self.name)),
        )
    }
}

// Free-tier provider limits observed per chain.
fn default_max_block_range(chain: &str) -> u64 {
    match chain {
        "Ethereum" => 1_000,
        "Polygon" => 100,
        "Avalanche" => 5_000,
        _ => 1_000,
    }
}

// Chosen so every chain covers a comparable stretch of recent history.
fn default_scan_window(chain: &str) -> u64 {
    match chain {
        "Ethereum" => 50_000,
        "Polygon" => 5_000,
        "Avalanche" => 50_000,
        _ => 50_000,
    }
}

fn default_price_delay_ms(chain: &str) -> u64 {
    match chain {
        "Polygon" => 2_000,
        "Ethereum" => 500,
        "Avalanche" => 500,
        _ => 1_000,
    }
}

fn default_chains() -> Vec<ChainEndpoint> {
    let mut ethereum = ChainEndpoint::new("Ethereum", 1, "https://eth.llamarpc.com");
    ethereum.explorer_url = Some("https://etherscan.io".to_string());
    ethereum.pool_managers = vec![parse_default_address(
        "0x000000000004444c5dc75cB358380D2e3dE08A90",
    )];

    let mut polygon = ChainEndpoint::new("Polygon", 137, "https://polygon-rpc.com");
    polygon.explorer_url = Some("https://polygonscan.com".to_string());
    polygon.pool_managers = vec![parse_default_address(
        "0x67366782805870060151383F4BbFF9daB53e5cD6",
    )];

    let mut avalanche = ChainEndpoint::new("Avalanche", 43114, "https://avalanche.llamarpc.com");
    avalanche.explorer_url = Some("https://snowtrace.io".to_string());
    avalanche.pool_managers = vec![parse_default_address(
        "0x06380c0e0912312b5150364b9dc4542ba0dbbc85",
    )];

    vec![ethereum, polygon, avalanche]
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    pub token: TokenSettings,
    pub oracle: OracleSettings,
    pub rpc: RpcSettings,
    pub scan: ScanSettings,
    pub chains: Vec<ChainEndpoint>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            token: TokenSettings::default(),
            oracle: OracleSettings::default(),
            rpc: RpcSettings::default(),
            scan: ScanSettings::default(),
            chains: default_chains(),
        }
    }
}

impl Settings {
    /// Loads `Config.toml` from the working directory (optional) plus environment overrides.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_path("Config.toml")
    }

    pub fn from_path(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        settings.apply_env_overrides();
        settings.validate()?;

        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        // SDK_RPC_URL_<CHAIN> replaces one chain's endpoint
        for chain in &mut self.chains {
            let key = format!("SDK_RPC_URL_{}", chain.name.to_uppercase());
            if let Ok(url) = env::var(&key) {
                let trimmed = url.trim();
                if !trimmed.is_empty() {
                    chain.rpc_url = trimmed.to_string();
                }
            }
        }

        if let Ok(raw) = env::var("SDK_ORACLE_FALLBACK_RATE") {
            match raw.trim().parse::<f64>() {
                Ok(rate) => self.oracle.fallback_rate = rate,
                Err(e) => log::warn!("Ignoring SDK_ORACLE_FALLBACK_RATE: {}", e),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chains.is_empty() {
            return Err(ConfigError::Message("no chains configured".into()));
        }

        let mut names = HashSet::new();
        for chain in &self.chains {
            if !names.insert(chain.name.as_str()) {
                return Err(ConfigError::Message(format!(
                    "duplicate chain name: {}",
                    chain.name
                )));
            }
            url::Url::parse(&chain.rpc_url).map_err(|e| {
                ConfigError::Message(format!("invalid rpc_url for {}: {}", chain.name, e))
            })?;
            if chain.max_block_range() == 0 {
                return Err(ConfigError::Message(format!(
                    "max_block_range must be positive for {}",
                    chain.name
                )));
            }
        }

        if !names.contains(self.oracle.chain.as_str()) {
            return Err(ConfigError::Message(format!(
                "oracle chain {} is not configured",
                self.oracle.chain
            )));
        }
        if !(self.oracle.fallback_rate.is_finite() && self.oracle.fallback_rate > 0.0) {
            return Err(ConfigError::Message(
                "oracle.fallback_rate must be a positive number".into(),
            ));
        }
        if !(self.oracle.assumed_major_asset_usd.is_finite()
            && self.oracle.assumed_major_asset_usd > 0.0)
        {
            return Err(ConfigError::Message(
                "oracle.assumed_major_asset_usd must be a positive number".into(),
            ));
        }

        let scan = &self.scan;
        if scan.chunk_attempts == 0
            || scan.classify_batch_size == 0
            || scan.balance_batch_size == 0
            || scan.detect_batch_size == 0
            || scan.top_holders == 0
        {
            return Err(ConfigError::Message(
                "scan attempts, batch sizes and top_holders must be positive".into(),
            ));
        }
        if self.rpc.required_read_attempts == 0 {
            return Err(ConfigError::Message(
                "rpc.required_read_attempts must be positive".into(),
            ));
        }

        Ok(())
    }

    pub fn chain(&self, name: &str) -> Option<&ChainEndpoint> {
        self.chains.iter().find(|c| c.name == name)
    }
}
