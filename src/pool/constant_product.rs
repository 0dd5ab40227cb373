//! Constant-product (x * y = k) pool client
//!
//! Reads a Uniswap-V2-style pair contract over JSON-RPC and computes quotes
//! locally from the reserves, the way the pair itself would price a swap.
//!
//! Formula: amount_out = (amount_in * (10000 - fee) * reserve_out)
//!                       / (reserve_in * 10000 + amount_in * (10000 - fee))

use super::{AmmConnector, AmmPool, PoolState, SwapQuote};
use crate::config::PoolConfig;
use crate::tokens::format_units;
use crate::{Error, Result};
use alloy::primitives::{Address, U256};
use alloy::providers::DynProvider;
use alloy::sol;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

// Pair ABI. Reserves are uint112 on-chain; the ABI word is identical when
// decoded as uint256.
sol! {
    #[sol(rpc)]
    interface IUniswapV2Pair {
        function getReserves() external view returns (uint256 reserve0, uint256 reserve1, uint32 blockTimestampLast);
        function token0() external view returns (address);
        function token1() external view returns (address);
        function totalSupply() external view returns (uint256);
    }
}

const BPS: u64 = 10_000;
/// Fixed-point scale used for the price impact ratio
const IMPACT_SCALE: u32 = 9;
/// Pair LP tokens always carry 18 decimals
const LP_DECIMALS: u8 = 18;

/// Raw-unit result of an exact-input quote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawQuote {
    pub amount_out: U256,
    pub min_amount_out: U256,
    pub fee: U256,
    /// Fraction, e.g. 0.004 = 0.4%
    pub price_impact: Decimal,
}

/// Output amount for an exact input, fee deducted from the input
///
/// Fails with `InvalidAmount` when the input is too large for 256-bit
/// arithmetic against these reserves.
pub fn get_amount_out(
    amount_in: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee_bps: u32,
) -> Result<U256> {
    if amount_in.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() {
        return Ok(U256::ZERO);
    }

    let amount_in_with_fee = amount_in
        .checked_mul(U256::from(BPS - u64::from(fee_bps)))
        .ok_or_else(|| overflow(amount_in))?;
    let numerator = amount_in_with_fee
        .checked_mul(reserve_out)
        .ok_or_else(|| overflow(amount_in))?;
    let denominator = reserve_in
        .checked_mul(U256::from(BPS))
        .and_then(|scaled| scaled.checked_add(amount_in_with_fee))
        .ok_or_else(|| overflow(amount_in))?;

    Ok(numerator / denominator)
}

/// Quote an exact-input swap against the given reserves
///
/// `price_impact` is `1 - execution_price / spot_price`, where the execution
/// price already includes the fee.
pub fn quote_exact_in(
    amount_in: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee_bps: u32,
    slippage_bps: u32,
) -> Result<RawQuote> {
    let amount_out = get_amount_out(amount_in, reserve_in, reserve_out, fee_bps)?;
    let min_amount_out = amount_out
        .checked_mul(U256::from(BPS - u64::from(slippage_bps)))
        .ok_or_else(|| overflow(amount_in))?
        / U256::from(BPS);
    let fee = amount_in
        .checked_mul(U256::from(fee_bps))
        .ok_or_else(|| overflow(amount_in))?
        / U256::from(BPS);

    let scale = U256::from(10u64.pow(IMPACT_SCALE));
    let price_impact = if amount_out.is_zero() {
        Decimal::ONE
    } else {
        // (out / in) / (reserve_out / reserve_in), scaled
        let execution = amount_out
            .checked_mul(reserve_in)
            .and_then(|v| v.checked_mul(scale))
            .ok_or_else(|| overflow(amount_in))?;
        let spot = amount_in
            .checked_mul(reserve_out)
            .ok_or_else(|| overflow(amount_in))?;
        let ratio = (execution / spot).min(scale);
        let impact = (scale - ratio).to::<u64>();
        Decimal::new(impact as i64, IMPACT_SCALE)
    };

    Ok(RawQuote {
        amount_out,
        min_amount_out,
        fee,
        price_impact,
    })
}

fn overflow(amount_in: U256) -> Error {
    Error::InvalidAmount(format!(
        "input of {} raw units is too large to quote against this pool",
        amount_in
    ))
}

/// Opens [`ConstantProductPool`] handles
pub struct ConstantProductConnector {
    provider: DynProvider,
    config: PoolConfig,
}

impl ConstantProductConnector {
    pub fn new(provider: DynProvider, config: PoolConfig) -> Self {
        Self { provider, config }
    }
}

#[async_trait]
impl AmmConnector for ConstantProductConnector {
    async fn connect(&self) -> Result<Arc<dyn AmmPool>> {
        let pair = IUniswapV2Pair::new(self.config.address, self.provider.clone());

        let token0 = pair.token0().call().await.map_err(Error::upstream)?;
        let token1 = pair.token1().call().await.map_err(Error::upstream)?;

        let token_a = self.config.token_a.address;
        let token_b = self.config.token_b.address;
        let a_is_token0 = if token0 == token_a && token1 == token_b {
            true
        } else if token0 == token_b && token1 == token_a {
            false
        } else {
            return Err(Error::Config(format!(
                "pool {} trades {}/{}, not the configured {}/{}",
                self.config.address, token0, token1, token_a, token_b
            )));
        };

        info!(
            pool = %self.config.address,
            token_a = %self.config.token_a.symbol,
            token_b = %self.config.token_b.symbol,
            a_is_token0,
            "Connected to constant-product pool"
        );

        Ok(Arc::new(ConstantProductPool {
            provider: self.provider.clone(),
            config: self.config.clone(),
            a_is_token0,
        }))
    }
}

/// Handle to a connected pair contract
pub struct ConstantProductPool {
    provider: DynProvider,
    config: PoolConfig,
    a_is_token0: bool,
}

impl ConstantProductPool {
    /// Reserves ordered as (token A, token B)
    async fn reserves(&self) -> Result<(U256, U256)> {
        let reserves = IUniswapV2Pair::new(self.config.address, self.provider.clone())
            .getReserves()
            .call()
            .await
            .map_err(Error::upstream)?;

        if self.a_is_token0 {
            Ok((reserves.reserve0, reserves.reserve1))
        } else {
            Ok((reserves.reserve1, reserves.reserve0))
        }
    }
}

#[async_trait]
impl AmmPool for ConstantProductPool {
    fn address(&self) -> Address {
        self.config.address
    }

    async fn pool_state(&self) -> Result<PoolState> {
        let (reserve_a, reserve_b) = self.reserves().await?;
        let lp_supply = IUniswapV2Pair::new(self.config.address, self.provider.clone())
            .totalSupply()
            .call()
            .await
            .map_err(Error::upstream)?;

        debug!(
            pool = %self.config.address,
            %reserve_a,
            %reserve_b,
            %lp_supply,
            "Pool reserves read"
        );

        Ok(PoolState {
            pool_address: self.config.address.to_checksum(None),
            lp_supply: format_units(lp_supply, LP_DECIMALS),
            token_a_balance: format_units(reserve_a, self.config.token_a.decimals),
            token_b_balance: format_units(reserve_b, self.config.token_b.decimals),
            timestamp: Utc::now(),
        })
    }

    async fn swap_quote(&self, amount_in: Decimal, slippage: Decimal) -> Result<SwapQuote> {
        let raw_in = self.config.token_a.to_raw(amount_in)?;
        if raw_in.is_zero() {
            return Err(Error::InvalidAmount(format!(
                "{} {} is below the token's smallest unit",
                amount_in, self.config.token_a.symbol
            )));
        }

        let slippage_bps = (slippage * Decimal::from(BPS))
            .trunc()
            .to_u32()
            .filter(|bps| u64::from(*bps) < BPS)
            .ok_or_else(|| Error::InvalidAmount(format!("slippage {} out of range", slippage)))?;

        let (reserve_a, reserve_b) = self.reserves().await?;
        if reserve_a.is_zero() || reserve_b.is_zero() {
            return Err(Error::Upstream(format!(
                "pool {} has no liquidity",
                self.config.address
            )));
        }

        let quote = quote_exact_in(
            raw_in,
            reserve_a,
            reserve_b,
            self.config.fee_bps,
            slippage_bps,
        )?;

        Ok(SwapQuote {
            min_amount_out: format_units(quote.min_amount_out, self.config.token_b.decimals),
            price_impact: quote.price_impact,
            fee: self.config.token_a.to_decimal(quote.fee)?,
        })
    }
}
