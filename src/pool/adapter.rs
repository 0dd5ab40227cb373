//! Price source adapter
//!
//! Wraps an [`AmmConnector`] and exposes pool state and micro-trade quotes.
//! The pool handle is opened lazily through a single-flight cell: concurrent
//! first callers wait on one in-flight `connect()`, and a successful handle is
//! never replaced. A failed attempt leaves the cell empty so a later caller
//! can try again.

use super::{AmmConnector, AmmPool, PoolState, TradeEstimate};
use crate::{Error, Result};
use alloy::primitives::Address;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

pub struct PriceSourceAdapter {
    connector: Arc<dyn AmmConnector>,
    pool: OnceCell<Arc<dyn AmmPool>>,
}

impl PriceSourceAdapter {
    pub fn new(connector: Arc<dyn AmmConnector>) -> Self {
        Self {
            connector,
            pool: OnceCell::new(),
        }
    }

    /// Open the pool handle
    ///
    /// Returns `false` instead of an error when the connection fails; callers
    /// must check it. After one success every call is a no-op returning `true`.
    pub async fn initialize(&self) -> bool {
        if self.pool.initialized() {
            return true;
        }

        let result = self
            .pool
            .get_or_try_init(|| async {
                info!("Initializing pool connection");
                self.connector.connect().await
            })
            .await;

        match result {
            Ok(pool) => {
                info!(pool = %pool.address(), "Pool initialized");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to initialize pool");
                false
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.initialized()
    }

    /// Address of the connected pool, if any
    pub fn pool_address(&self) -> Option<Address> {
        self.pool.get().map(|pool| pool.address())
    }

    fn pool(&self) -> Result<&Arc<dyn AmmPool>> {
        self.pool
            .get()
            .ok_or_else(|| Error::NotInitialized("pool not initialized".to_string()))
    }

    /// Read the current pool state; every call goes to chain
    pub async fn get_pool_state(&self) -> Result<PoolState> {
        let pool = self.pool()?;
        pool.pool_state().await.map_err(|e| {
            error!(error = %e, "Failed to get pool state");
            e
        })
    }

    /// Quote swapping `amount_in` of token A into token B within `slippage`
    pub async fn estimate_micro_trade(
        &self,
        amount_in: Decimal,
        slippage: Decimal,
    ) -> Result<TradeEstimate> {
        let pool = self.pool()?;

        if amount_in <= Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "amount in must be positive, got {}",
                amount_in
            )));
        }
        if slippage < Decimal::ZERO || slippage >= Decimal::ONE {
            return Err(Error::InvalidAmount(format!(
                "slippage must be a fraction in [0, 1), got {}",
                slippage
            )));
        }

        let quote = pool.swap_quote(amount_in, slippage).await.map_err(|e| {
            error!(error = %e, %amount_in, %slippage, "Failed to estimate trade");
            e
        })?;

        debug!(
            %amount_in,
            amount_out = %quote.min_amount_out,
            price_impact = %quote.price_impact,
            "Swap quote received"
        );

        Ok(TradeEstimate {
            amount_in,
            estimated_amount_out: quote.min_amount_out,
            price_impact: quote.price_impact,
            fee: quote.fee,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn adapter_with(connector: Arc<MockConnector>) -> PriceSourceAdapter {
        PriceSourceAdapter::new(connector)
    }

    #[tokio::test]
    async fn pool_state_before_initialize_is_not_initialized() {
        let pool = Arc::new(MockPool::new("100", "200", fixed_quote()));
        let connector = Arc::new(MockConnector::new(pool.clone()));
        let adapter = adapter_with(connector.clone());

        let result = adapter.get_pool_state().await;
        assert!(matches!(result, Err(Error::NotInitialized(_))));
        assert_eq!(connector.connects(), 0);
        assert_eq!(pool.state_calls(), 0);
    }

    #[tokio::test]
    async fn estimate_before_initialize_is_not_initialized() {
        let pool = Arc::new(MockPool::new("100", "200", fixed_quote()));
        let adapter = adapter_with(Arc::new(MockConnector::new(pool.clone())));

        let result = adapter.estimate_micro_trade(dec!(1), dec!(0.01)).await;
        assert!(matches!(result, Err(Error::NotInitialized(_))));
        assert!(pool.quote_calls().is_empty());
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let pool = Arc::new(MockPool::new("100", "200", fixed_quote()));
        let connector = Arc::new(MockConnector::new(pool));
        let adapter = adapter_with(connector.clone());

        assert!(adapter.initialize().await);
        let first = adapter.pool_address();
        assert!(adapter.initialize().await);
        assert!(adapter.initialize().await);

        assert_eq!(connector.connects(), 1);
        assert_eq!(adapter.pool_address(), first);
    }

    #[tokio::test]
    async fn failed_initialize_returns_false_and_can_retry() {
        let pool = Arc::new(MockPool::new("100", "200", fixed_quote()));
        let connector = Arc::new(MockConnector::failing(pool));
        let adapter = adapter_with(connector.clone());

        assert!(!adapter.initialize().await);
        assert!(!adapter.is_initialized());
        assert!(!adapter.initialize().await);
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_initialize_connects_once() {
        let pool = Arc::new(MockPool::new("100", "200", fixed_quote()));
        let connector = Arc::new(MockConnector {
            delay: Duration::from_millis(50),
            ..MockConnector::new(pool)
        });
        let adapter = Arc::new(adapter_with(connector.clone()));

        let (a, b) = tokio::join!(
            {
                let adapter = adapter.clone();
                async move { adapter.initialize().await }
            },
            {
                let adapter = adapter.clone();
                async move { adapter.initialize().await }
            }
        );

        assert!(a && b);
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test]
    async fn estimate_wraps_quote() {
        let pool = Arc::new(MockPool::new("100", "200", fixed_quote()));
        let adapter = adapter_with(Arc::new(MockConnector::new(pool.clone())));
        assert!(adapter.initialize().await);

        let estimate = assert_ok!(adapter.estimate_micro_trade(dec!(5), dec!(0.01)).await);
        assert_eq!(estimate.amount_in, dec!(5));
        assert_eq!(estimate.estimated_amount_out, "4.95");
        assert_eq!(estimate.price_impact, dec!(0.001));
        assert_eq!(estimate.fee, dec!(0.003));
        assert_eq!(pool.quote_calls(), vec![(dec!(5), dec!(0.01))]);
    }

    #[tokio::test]
    async fn estimate_rejects_bad_inputs() {
        let pool = Arc::new(MockPool::new("100", "200", fixed_quote()));
        let adapter = adapter_with(Arc::new(MockConnector::new(pool.clone())));
        assert!(adapter.initialize().await);

        assert_err!(adapter.estimate_micro_trade(dec!(0), dec!(0.01)).await);
        assert_err!(adapter.estimate_micro_trade(dec!(1), dec!(1)).await);
        assert!(pool.quote_calls().is_empty());
    }

    #[tokio::test]
    async fn pool_state_reads_every_time() {
        let pool = Arc::new(MockPool::new("100", "200", fixed_quote()));
        let adapter = adapter_with(Arc::new(MockConnector::new(pool.clone())));
        assert!(adapter.initialize().await);

        adapter.get_pool_state().await.unwrap();
        *pool.reserves.lock().unwrap() = ("150".to_string(), "150".to_string());
        let state = adapter.get_pool_state().await.unwrap();

        assert_eq!(state.token_a_balance, "150");
        assert_eq!(pool.state_calls(), 2);
    }
}
