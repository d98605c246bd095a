use ethers::types::U256;
use ethers::utils::format_units;

/// Converts a raw integer amount into floating-point token units.
pub fn token_units(value: U256, decimals: u8) -> Result<f64, ConversionError> {
    let formatted = format_units(value, decimals as u32)
        .map_err(|e| ConversionError::InvalidUnits(e.to_string()))?;
    formatted
        .parse::<f64>()
        .map_err(|e| ConversionError::InvalidUnits(e.to_string()))
}

/// Converts a U256 to the nearest f64. Exact up to 2^53, correctly rounded above.
pub fn u256_to_f64(value: U256) -> f64 {
    if value.is_zero() {
        return 0.0;
    }
    value.to_string().parse::<f64>().unwrap_or(f64::INFINITY)
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Invalid token units: {0}")]
    InvalidUnits(String),
}
