//! AMM pool access
//!
//! The pool is reached through two seams:
//! - [`AmmConnector`] opens a handle to the pool contract (the expensive,
//!   once-per-process step)
//! - [`AmmPool`] reads reserves and produces swap quotes through that handle
//!
//! [`PriceSourceAdapter`] owns the handle and guarantees it is opened at most
//! once, however many callers race to use it first.

mod adapter;
mod constant_product;

pub use adapter::PriceSourceAdapter;
#[cfg(test)]
pub(crate) use adapter::testing;
pub use constant_product::{
    get_amount_out, quote_exact_in, ConstantProductConnector, ConstantProductPool, RawQuote,
};

use crate::config::PriceOrientation;
use crate::{Error, Result};
use alloy::primitives::Address;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// Snapshot of a pool as read from chain
///
/// Balances are whole-unit decimal strings so that large reserves survive
/// serialization without float rounding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolState {
    pub pool_address: String,
    pub lp_supply: String,
    pub token_a_balance: String,
    pub token_b_balance: String,
    pub timestamp: DateTime<Utc>,
}

impl PoolState {
    /// Unit price from the reserve ratio
    ///
    /// Fails with `InvalidPrice` when a reserve is unreadable or empty.
    pub fn price(&self, orientation: PriceOrientation) -> Result<Decimal> {
        let a = parse_reserve(&self.token_a_balance, "token A")?;
        let b = parse_reserve(&self.token_b_balance, "token B")?;

        let (numerator, denominator) = match orientation {
            PriceOrientation::BPerA => (b, a),
            PriceOrientation::APerB => (a, b),
        };

        if denominator.is_zero() {
            return Err(Error::InvalidPrice(format!(
                "pool {} has an empty reserve",
                self.pool_address
            )));
        }

        numerator.checked_div(denominator).ok_or_else(|| {
            Error::InvalidPrice(format!(
                "reserve ratio of pool {} is out of range",
                self.pool_address
            ))
        })
    }
}

fn parse_reserve(value: &str, side: &str) -> Result<Decimal> {
    Decimal::from_str(value)
        .map_err(|e| Error::InvalidPrice(format!("{} reserve '{}' unreadable: {}", side, value, e)))
}

/// Quote returned by a pool for an exact-input swap of token A into token B
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapQuote {
    /// Minimum output after slippage, in whole token-B units
    pub min_amount_out: String,
    /// Fractional price impact (0.001 = 0.1%)
    pub price_impact: Decimal,
    /// Fee charged on the input, in whole token-A units
    pub fee: Decimal,
}

/// Token-denominated estimate for a micro trade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeEstimate {
    pub amount_in: Decimal,
    pub estimated_amount_out: String,
    pub price_impact: Decimal,
    pub fee: Decimal,
}

/// Open handle to an AMM pool
#[async_trait]
pub trait AmmPool: Send + Sync {
    /// Pool contract address
    fn address(&self) -> Address;

    /// Read the pool's current reserves
    async fn pool_state(&self) -> Result<PoolState>;

    /// Quote swapping `amount_in` of token A into token B
    async fn swap_quote(&self, amount_in: Decimal, slippage: Decimal) -> Result<SwapQuote>;
}

/// Opens pool handles
#[async_trait]
pub trait AmmConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn AmmPool>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn state(a: &str, b: &str) -> PoolState {
        PoolState {
            pool_address: "0xpool".to_string(),
            lp_supply: "1".to_string(),
            token_a_balance: a.to_string(),
            token_b_balance: b.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn price_follows_orientation() {
        let pool = state("100", "200");
        assert_eq!(pool.price(PriceOrientation::BPerA).unwrap(), dec!(2));
        assert_eq!(pool.price(PriceOrientation::APerB).unwrap(), dec!(0.5));
    }

    #[test]
    fn empty_denominator_is_invalid_price() {
        let pool = state("0", "200");
        assert!(matches!(
            pool.price(PriceOrientation::BPerA),
            Err(Error::InvalidPrice(_))
        ));
    }

    #[test]
    fn unreadable_reserve_is_invalid_price() {
        let pool = state("lots", "200");
        assert!(matches!(
            pool.price(PriceOrientation::BPerA),
            Err(Error::InvalidPrice(_))
        ));
    }

    #[test]
    fn estimate_serializes_camel_case() {
        let estimate = TradeEstimate {
            amount_in: dec!(5),
            estimated_amount_out: "4.95".to_string(),
            price_impact: dec!(0.001),
            fee: dec!(0.003),
        };
        let json = serde_json::to_value(&estimate).unwrap();
        assert_eq!(json["estimatedAmountOut"], "4.95");
        assert!(json.get("amountIn").is_some());
        assert!(json.get("priceImpact").is_some());
    }
}
