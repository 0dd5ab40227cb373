//! Trading agent facade
//!
//! Bundles the wallet identity, balance lookups, the price source adapter and
//! the trade estimator behind one object. Estimation only: nothing here
//! places an order or mutates chain state.

use crate::config::{Config, PoolConfig, TradeSettings};
use crate::persistence::{TradeRecord, TradeSink};
use crate::pool::{
    AmmConnector, ConstantProductConnector, PoolState, PriceSourceAdapter, TradeEstimate,
};
use crate::wallet::{BalanceSource, RpcBalanceSource, SecureWallet};
use crate::{Error, Result};
use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

/// Environment variable holding an optional hex private key
pub const PRIVATE_KEY_ENV: &str = "PRIVATE_KEY";

pub struct TradingAgent {
    wallet: SecureWallet,
    balances: Arc<dyn BalanceSource>,
    adapter: PriceSourceAdapter,
    pool: PoolConfig,
    settings: TradeSettings,
    sink: Option<Arc<dyn TradeSink>>,
}

impl TradingAgent {
    pub fn new(
        wallet: SecureWallet,
        balances: Arc<dyn BalanceSource>,
        connector: Arc<dyn AmmConnector>,
        pool: PoolConfig,
        settings: TradeSettings,
    ) -> Self {
        Self {
            wallet,
            balances,
            adapter: PriceSourceAdapter::new(connector),
            pool,
            settings,
            sink: None,
        }
    }

    /// Report snapshots and estimates to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn TradeSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Build the agent against the configured RPC endpoint
    ///
    /// Loads the key from `PRIVATE_KEY` or generates one. No network request
    /// is made; the pool is connected on first use.
    pub fn from_config(config: &Config) -> Result<Self> {
        let wallet = SecureWallet::from_env_or_generate(PRIVATE_KEY_ENV)?;
        let rpc = config.rpc()?;
        let provider = rpc.provider()?;

        info!(
            chain_id = rpc.chain_id(),
            pool = %config.pool.address,
            wallet = %wallet.address_string(),
            "Trading agent created"
        );

        let connector = ConstantProductConnector::new(provider.clone(), config.pool.clone());
        Ok(Self::new(
            wallet,
            Arc::new(RpcBalanceSource::new(provider)),
            Arc::new(connector),
            config.pool.clone(),
            config.trading.clone(),
        ))
    }

    pub fn wallet(&self) -> &SecureWallet {
        &self.wallet
    }

    pub fn pool_config(&self) -> &PoolConfig {
        &self.pool
    }

    pub fn settings(&self) -> &TradeSettings {
        &self.settings
    }

    pub fn is_initialized(&self) -> bool {
        self.adapter.is_initialized()
    }

    /// Holder balance in whole units; the native asset when `token` is `None`
    ///
    /// A lookup that yields nothing is reported as zero.
    pub async fn get_balance(&self, token: Option<Address>) -> Result<Decimal> {
        let owner = self.wallet.address();
        let balance = match token {
            None => self.balances.native_balance(owner).await,
            Some(token) => self.balances.token_balance(owner, token).await,
        }
        .map_err(|e| {
            error!(error = %e, token = ?token, "Failed to get balance");
            e
        })?;

        Ok(balance.unwrap_or(Decimal::ZERO))
    }

    /// Connect the pool on first use
    async fn ensure_initialized(&self) -> Result<()> {
        if self.adapter.initialize().await {
            Ok(())
        } else {
            Err(Error::NotInitialized(format!(
                "could not connect to pool {}",
                self.pool.address
            )))
        }
    }

    /// Current pool snapshot
    pub async fn pool_state(&self) -> Result<PoolState> {
        self.ensure_initialized().await?;
        self.adapter.get_pool_state().await
    }

    /// Current unit price from the pool's reserve ratio
    pub async fn check_price(&self) -> Result<Decimal> {
        let state = self.pool_state().await?;
        let price = positive_price(&state, &self.pool)?;
        debug!(%price, orientation = ?self.pool.price_orientation, "Price checked");
        Ok(price)
    }

    /// Estimate swapping `amount_usd` worth of token A into token B
    pub async fn estimate_micro_trade(&self, amount_usd: f64) -> Result<TradeEstimate> {
        if !amount_usd.is_finite() || amount_usd <= 0.0 {
            return Err(Error::InvalidAmount(format!(
                "USD amount must be a finite positive number, got {}",
                amount_usd
            )));
        }
        let usd = Decimal::from_f64(amount_usd).ok_or_else(|| {
            Error::InvalidAmount(format!("USD amount {} is out of range", amount_usd))
        })?;
        if usd.is_zero() {
            return Err(Error::InvalidAmount(format!(
                "USD amount {} is below decimal precision",
                amount_usd
            )));
        }

        self.ensure_initialized().await?;

        let state = self.adapter.get_pool_state().await?;
        let price = positive_price(&state, &self.pool)?;

        let token_amount = usd.checked_div(price).ok_or_else(|| {
            Error::InvalidAmount(format!("{} USD at price {} is out of range", usd, price))
        })?;

        let slippage = self.settings.max_slippage;
        let estimate = self
            .adapter
            .estimate_micro_trade(token_amount, slippage)
            .await?;

        info!(
            amount_usd = %usd,
            %price,
            amount_in = %estimate.amount_in,
            amount_out = %estimate.estimated_amount_out,
            "Micro trade estimated"
        );

        if let Some(sink) = &self.sink {
            let record = TradeRecord::from_estimate(
                state.pool_address.clone(),
                self.pool.token_a.address.to_checksum(None),
                self.pool.token_b.address.to_checksum(None),
                &estimate,
                price,
                slippage,
                None,
            );
            // Detached: a slow or unreachable sink never delays the quote
            tokio::spawn(report(sink.clone(), state, price, record).in_current_span());
        }

        Ok(estimate)
    }
}

/// Hand the snapshot and estimate to the sink; failures are only logged
async fn report(
    sink: Arc<dyn TradeSink>,
    state: PoolState,
    price: Decimal,
    mut record: TradeRecord,
) {
    record.pool_state_id = match sink.record_pool_state(&state, price).await {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(error = %e, "Failed to record pool state");
            None
        }
    };

    match sink.record_trade(&record).await {
        Ok(id) => debug!(
            trade_id = id,
            pool_state_id = ?record.pool_state_id,
            "Estimate recorded"
        ),
        Err(e) => warn!(error = %e, "Failed to record trade"),
    }
}

fn positive_price(state: &PoolState, pool: &PoolConfig) -> Result<Decimal> {
    let price = state.price(pool.price_orientation)?;
    if price <= Decimal::ZERO {
        return Err(Error::InvalidPrice(format!(
            "pool {} reports non-positive price {}",
            state.pool_address, price
        )));
    }
    Ok(price)
}

/// Outcome of constructing the agent at process start
///
/// A construction failure does not stop the process; it is kept here and
/// reported on the health endpoint.
#[derive(Clone)]
pub enum AgentStatus {
    Ready(Arc<TradingAgent>),
    Failed {
        error: String,
        since: DateTime<Utc>,
    },
}

impl AgentStatus {
    pub fn from_result(result: Result<TradingAgent>) -> Self {
        match result {
            Ok(agent) => AgentStatus::Ready(Arc::new(agent)),
            Err(e) => {
                error!(error = %e, "Failed to initialize trading agent, running degraded");
                AgentStatus::Failed {
                    error: e.to_string(),
                    since: Utc::now(),
                }
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, AgentStatus::Ready(_))
    }

    /// The agent, or `NotInitialized` carrying the construction error
    pub fn agent(&self) -> Result<&Arc<TradingAgent>> {
        match self {
            AgentStatus::Ready(agent) => Ok(agent),
            AgentStatus::Failed { error, .. } => Err(Error::NotInitialized(format!(
                "agent failed to initialize: {}",
                error
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Agent collaborators for facade and server tests

    use super::*;
    use crate::pool::testing::{fixed_quote, MockConnector, MockPool};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    pub struct MockBalances {
        pub native: Option<Decimal>,
        pub token: Option<Decimal>,
        pub fail: bool,
        pub calls: AtomicUsize,
    }

    impl MockBalances {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn answer(&self, value: Option<Decimal>) -> Result<Option<Decimal>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Upstream("eth_call reverted".to_string()));
            }
            Ok(value)
        }
    }

    #[async_trait]
    impl BalanceSource for MockBalances {
        async fn native_balance(&self, _owner: Address) -> Result<Option<Decimal>> {
            self.answer(self.native)
        }

        async fn token_balance(&self, _owner: Address, _token: Address) -> Result<Option<Decimal>> {
            self.answer(self.token)
        }
    }

    #[derive(Default)]
    pub struct MockSink {
        pub fail: bool,
        /// Stall every write this long, like a database that never answers
        pub delay: Duration,
        pub states: Mutex<Vec<(PoolState, Decimal)>>,
        pub trades: Mutex<Vec<TradeRecord>>,
    }

    impl MockSink {
        pub fn trade_count(&self) -> usize {
            self.trades.lock().unwrap().len()
        }

        /// Wait for the detached report to land
        pub async fn wait_for_trades(&self, count: usize) {
            for _ in 0..200 {
                if self.trade_count() >= count {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            panic!("sink saw {} trades, expected {}", self.trade_count(), count);
        }
    }

    #[async_trait]
    impl TradeSink for MockSink {
        async fn record_pool_state(&self, state: &PoolState, price: Decimal) -> Result<i32> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(Error::Upstream("connection reset".to_string()));
            }
            let mut states = self.states.lock().unwrap();
            states.push((state.clone(), price));
            Ok(states.len() as i32)
        }

        async fn record_trade(&self, trade: &TradeRecord) -> Result<i32> {
            if self.fail {
                return Err(Error::Upstream("connection reset".to_string()));
            }
            let mut trades = self.trades.lock().unwrap();
            trades.push(trade.clone());
            Ok(trades.len() as i32)
        }
    }

    pub struct Harness {
        pub pool: Arc<MockPool>,
        pub connector: Arc<MockConnector>,
        pub balances: Arc<MockBalances>,
    }

    impl Harness {
        /// Reserves 100 A / 200 B, i.e. a price of 2 B per A
        pub fn new() -> Self {
            let pool = Arc::new(MockPool::new("100", "200", fixed_quote()));
            let connector = Arc::new(MockConnector::new(pool.clone()));
            Self::with_connector(pool, connector)
        }

        pub fn with_connector(pool: Arc<MockPool>, connector: Arc<MockConnector>) -> Self {
            Self {
                pool,
                connector,
                balances: Arc::new(MockBalances::default()),
            }
        }

        pub fn agent(&self) -> TradingAgent {
            TradingAgent::new(
                SecureWallet::generate(),
                self.balances.clone(),
                self.connector.clone(),
                PoolConfig {
                    address: Address::repeat_byte(0x11),
                    ..PoolConfig::default()
                },
                TradeSettings::default(),
            )
        }
    }
}
