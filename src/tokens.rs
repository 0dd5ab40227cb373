//! Token metadata and unit conversion
//!
//! On-chain amounts are raw integers (`U256`) in the token's smallest unit.
//! Everything the agent reports is in whole-token units, carried either as
//! decimal strings or as `rust_decimal::Decimal`, never as floats.

use crate::{Error, Result};
use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Decimals of the chain's native asset
pub const NATIVE_DECIMALS: u8 = 18;

/// Symbol used when reporting native balances
pub const NATIVE_SYMBOL: &str = "ETH";

/// Largest number of significant digits a `Decimal` can carry
const DECIMAL_MAX_DIGITS: usize = 28;

/// Token metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Token contract address
    pub address: Address,
    /// Token symbol (e.g., "USDC", "WETH")
    pub symbol: String,
    /// Number of decimals
    pub decimals: u8,
}

impl TokenInfo {
    pub fn new(address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            decimals,
        }
    }

    /// Convert a raw on-chain amount of this token into whole units
    pub fn to_decimal(&self, raw: U256) -> Result<Decimal> {
        units_to_decimal(raw, self.decimals)
    }

    /// Convert a whole-unit amount of this token into its raw on-chain form
    pub fn to_raw(&self, amount: Decimal) -> Result<U256> {
        parse_units(amount, self.decimals)
    }
}

/// Format a U256 value with decimals
pub fn format_units(value: U256, decimals: u8) -> String {
    if value.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10).pow(U256::from(decimals));
    let whole = value / divisor;
    let remainder = value % divisor;

    if remainder.is_zero() {
        whole.to_string()
    } else {
        let remainder_str = format!("{:0>width$}", remainder, width = decimals as usize);
        let trimmed = remainder_str.trim_end_matches('0');
        if trimmed.is_empty() {
            whole.to_string()
        } else {
            format!("{}.{}", whole, trimmed)
        }
    }
}

/// Parse a whole-unit decimal into the raw integer amount
///
/// Fractional digits beyond `decimals` are truncated (rounded toward zero).
pub fn parse_units(amount: Decimal, decimals: u8) -> Result<U256> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(Error::InvalidAmount(format!(
            "negative amount {} cannot be converted to token units",
            amount
        )));
    }

    let text = amount.normalize().to_string();
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));

    let width = decimals as usize;
    let mut digits = String::with_capacity(whole.len() + width);
    digits.push_str(whole);
    if fraction.len() >= width {
        digits.push_str(&fraction[..width]);
    } else {
        digits.push_str(fraction);
        digits.extend(std::iter::repeat('0').take(width - fraction.len()));
    }

    U256::from_str_radix(&digits, 10)
        .map_err(|e| Error::InvalidAmount(format!("amount {} out of range: {}", amount, e)))
}

/// Convert a raw amount into a `Decimal` in whole units
///
/// Fractional digits that do not fit into a `Decimal` are truncated; an
/// integer part wider than a `Decimal` is an error.
pub fn units_to_decimal(value: U256, decimals: u8) -> Result<Decimal> {
    let text = format_units(value, decimals);
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));

    if whole.len() > DECIMAL_MAX_DIGITS {
        return Err(Error::Upstream(format!(
            "value {} does not fit a decimal",
            text
        )));
    }

    let keep = fraction.len().min(DECIMAL_MAX_DIGITS - whole.len());
    let candidate = if keep == 0 {
        whole.to_string()
    } else {
        format!("{}.{}", whole, &fraction[..keep])
    };

    Decimal::from_str(&candidate)
        .or_else(|_| Decimal::from_str(whole))
        .map_err(|e| Error::Upstream(format!("value {} does not fit a decimal: {}", text, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_format_units() {
        // 1 ETH = 1e18 wei
        let one_eth = U256::from(1_000_000_000_000_000_000u128);
        assert_eq!(format_units(one_eth, 18), "1");

        // 1.5 ETH
        let one_point_five = U256::from(1_500_000_000_000_000_000u128);
        assert_eq!(format_units(one_point_five, 18), "1.5");

        // 1000 USDC (6 decimals)
        let thousand_usdc = U256::from(1_000_000_000u64);
        assert_eq!(format_units(thousand_usdc, 6), "1000");

        assert_eq!(format_units(U256::ZERO, 18), "0");
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(
            parse_units(dec!(1.5), 18).unwrap(),
            U256::from(1_500_000_000_000_000_000u128)
        );
        assert_eq!(parse_units(dec!(1000), 6).unwrap(), U256::from(1_000_000_000u64));
        assert_eq!(parse_units(dec!(0), 6).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_parse_units_truncates_excess_precision() {
        // 7 fractional digits into a 6-decimal token
        assert_eq!(parse_units(dec!(0.1234569), 6).unwrap(), U256::from(123_456u64));
    }

    #[test]
    fn test_parse_units_rejects_negative() {
        assert!(matches!(
            parse_units(dec!(-1), 18),
            Err(Error::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_units_to_decimal() {
        let raw = U256::from(2_500_000u64);
        assert_eq!(units_to_decimal(raw, 6).unwrap(), dec!(2.5));
    }

    #[test]
    fn test_units_to_decimal_truncates_wide_fraction() {
        // 20 integer digits leaves room for 8 fractional digits
        let raw = U256::from_str_radix("12345678901234567890123456789012345678", 10).unwrap();
        let value = units_to_decimal(raw, 18).unwrap();
        assert_eq!(value.trunc().to_string(), "12345678901234567890");
    }

    #[test]
    fn test_token_info_round_trip() {
        let token = TokenInfo::new(Address::ZERO, "USDC", 6);
        let raw = token.to_raw(dec!(12.34)).unwrap();
        assert_eq!(raw, U256::from(12_340_000u64));
        assert_eq!(token.to_decimal(raw).unwrap(), dec!(12.34));
    }
}
