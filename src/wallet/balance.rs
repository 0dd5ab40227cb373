//! Wallet balance queries
//!
//! Queries native and ERC20 token balances from the chain.
//!
//! SECURITY NOTE:
//! - This module is READ-ONLY - it only queries balances
//! - It never accesses or exposes private keys

use crate::tokens::{units_to_decimal, NATIVE_DECIMALS};
use crate::{Error, Result};
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// ERC20 `balanceOf(address)` selector
const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];
/// ERC20 `decimals()` selector
const DECIMALS_SELECTOR: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67];
/// Used when a token does not answer `decimals()`
const DEFAULT_TOKEN_DECIMALS: u8 = 18;

/// Source of holder balances, in whole-token units
///
/// `Ok(None)` means the lookup succeeded but yielded no value.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn native_balance(&self, owner: Address) -> Result<Option<Decimal>>;

    async fn token_balance(&self, owner: Address, token: Address) -> Result<Option<Decimal>>;
}

/// Balance source backed by a JSON-RPC provider
#[derive(Clone)]
pub struct RpcBalanceSource {
    provider: DynProvider,
}

impl RpcBalanceSource {
    pub fn new(provider: DynProvider) -> Self {
        Self { provider }
    }

    async fn call(&self, to: Address, calldata: Vec<u8>) -> Result<Bytes> {
        let tx = TransactionRequest::default()
            .to(to)
            .input(Bytes::from(calldata).into());

        self.provider.call(tx).await.map_err(Error::upstream)
    }

    async fn token_decimals(&self, token: Address) -> Result<u8> {
        let result = self.call(token, DECIMALS_SELECTOR.to_vec()).await?;
        if result.len() < 32 {
            tracing::debug!(%token, "decimals() returned no data, assuming 18");
            return Ok(DEFAULT_TOKEN_DECIMALS);
        }
        // uint8 is right-aligned in the 32-byte word
        Ok(result[31])
    }
}

#[async_trait]
impl BalanceSource for RpcBalanceSource {
    async fn native_balance(&self, owner: Address) -> Result<Option<Decimal>> {
        let balance = self
            .provider
            .get_balance(owner)
            .await
            .map_err(Error::upstream)?;

        units_to_decimal(balance, NATIVE_DECIMALS).map(Some)
    }

    async fn token_balance(&self, owner: Address, token: Address) -> Result<Option<Decimal>> {
        // Encode: selector + padded address
        let mut calldata = BALANCE_OF_SELECTOR.to_vec();
        calldata.extend_from_slice(&[0u8; 12]);
        calldata.extend_from_slice(owner.as_slice());

        let result = self.call(token, calldata).await?;

        // An account without code answers with empty data
        if result.len() < 32 {
            return Ok(None);
        }

        let raw = U256::from_be_slice(&result[..32]);
        let decimals = self.token_decimals(token).await?;

        units_to_decimal(raw, decimals).map(Some)
    }
}
