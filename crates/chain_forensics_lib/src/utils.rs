use num_bigint::BigUint;
use rust_decimal::Decimal;
use std::convert::TryFrom;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Decimals of the native unit on EVM chains (wei -> ETH).
pub const NATIVE_DECIMALS: u32 = 18;

#[derive(Debug, Clone)]
pub struct ConversionError {
    pub msg: String,
}

impl ConversionError {
    pub fn from(msg: String) -> Self {
        Self { msg }
    }
}

impl Display for ConversionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error during conversion: {}", self.msg)
    }
}

impl Error for ConversionError {
    fn description(&self) -> &str {
        "Conversion error"
    }
}

/// Parse a transaction value (decimal string in native units).
///
/// Anything that is not a non-negative decimal integer counts as zero, so a
/// single bad record never aborts an analysis.
pub fn parse_value(value: Option<&str>) -> BigUint {
    let Some(value) = value else {
        return BigUint::default();
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return BigUint::default();
    }
    match BigUint::parse_bytes(trimmed.as_bytes(), 10) {
        Some(v) => v,
        None => {
            log::warn!("Unparseable transaction value {:?}, counting as 0", value);
            BigUint::default()
        }
    }
}

pub fn native_unit() -> BigUint {
    BigUint::from(10u32).pow(NATIVE_DECIMALS)
}

/// Render a native-unit amount as a decimal in whole tokens.
pub fn wei_to_decimal(value: &BigUint, decimals: Option<u32>) -> Result<Decimal, ConversionError> {
    let decimals = decimals.unwrap_or(NATIVE_DECIMALS);
    if decimals > 28 {
        return Err(ConversionError::from(format!(
            "Decimals {} out of range",
            decimals
        )));
    }
    let mantissa = i128::try_from(value).map_err(|_| {
        ConversionError::from(format!("Value {} too big to convert to decimal", value))
    })?;
    Decimal::try_from_i128_with_scale(mantissa, decimals)
        .map(|d| d.normalize())
        .map_err(|err| {
            ConversionError::from(format!(
                "Value {} too big to convert to decimal: {}",
                value, err
            ))
        })
}

/// Serde helpers writing big integers as decimal strings.
pub mod big_dec {
    use num_bigint::BigUint;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_str_radix(10))
    }
}
