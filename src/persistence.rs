//! Persistence of pool snapshots and estimated trades
//!
//! The agent reports through the [`TradeSink`] trait and never depends on it
//! succeeding. [`PgStore`] is the Postgres implementation. It issues no DDL;
//! the tables it uses (`meteora_pool_states`, `paper_trades` and the
//! `trade_status` enum) are defined in `sql/schema.sql`.
//!
//! Each trade row carries its pool address in `metadata.pool_address`, so
//! trades whose snapshot failed to store are still found by pool.

use crate::config::DatabaseConfig;
use crate::pool::{PoolState, TradeEstimate};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// How long a write waits for a pooled connection before giving up
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

const INSERT_POOL_STATE: &str = r#"INSERT INTO meteora_pool_states
           (pool_address, lp_supply, token_a_balance, token_b_balance,
            token_a_price, token_b_price, timestamp)
       VALUES ($1, $2, $3, $4, $5, $6, $7)
       RETURNING id"#;

const INSERT_TRADE: &str = r#"INSERT INTO paper_trades
           (trade_type, token_in, token_out, amount_in, amount_out,
            price_at_trade, estimated_price_impact, slippage_bps, fees_sol,
            pool_state_id, status, metadata)
       VALUES ('ESTIMATE', $1, $2, $3, $4, $5, $6, $7, $8, $9, $10::trade_status,
               jsonb_build_object('pool_address', $11::text))
       RETURNING id"#;

const SELECT_POOL_STATES: &str = r#"SELECT id, pool_address, lp_supply, token_a_balance,
              token_b_balance, token_a_price, token_b_price, timestamp
       FROM meteora_pool_states
       WHERE pool_address = $1
       ORDER BY timestamp DESC
       LIMIT $2"#;

const SELECT_TRADES: &str = r#"SELECT t.id, t.token_in, t.token_out, t.amount_in, t.amount_out,
              t.price_at_trade, t.estimated_price_impact, t.slippage_bps,
              t.fees_sol, t.status::text AS status, t.virtual_signature,
              t.pool_state_id, t.created_at, t.executed_at
       FROM paper_trades t
       LEFT JOIN meteora_pool_states ps ON t.pool_state_id = ps.id
       WHERE COALESCE(t.metadata->>'pool_address', ps.pool_address) = $1
       ORDER BY t.created_at DESC
       LIMIT $2"#;

/// Lifecycle of a recorded trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    Pending,
    Executed,
    Failed,
    Cancelled,
}

impl TradeStatus {
    /// Label used by the `trade_status` enum in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Pending => "PENDING",
            TradeStatus::Executed => "EXECUTED",
            TradeStatus::Failed => "FAILED",
            TradeStatus::Cancelled => "CANCELLED",
        }
    }
}

impl FromStr for TradeStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(TradeStatus::Pending),
            "EXECUTED" => Ok(TradeStatus::Executed),
            "FAILED" => Ok(TradeStatus::Failed),
            "CANCELLED" => Ok(TradeStatus::Cancelled),
            other => Err(crate::Error::Config(format!(
                "unknown trade status '{}'",
                other
            ))),
        }
    }
}

/// An estimated trade, ready to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub pool_address: String,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: Decimal,
    pub expected_output: Decimal,
    pub price_at_trade: Decimal,
    pub price_impact: Decimal,
    pub slippage_bps: i32,
    pub fee: Decimal,
    pub pool_state_id: Option<i32>,
}

impl TradeRecord {
    /// Build a record from an estimate
    ///
    /// An unparseable output amount is stored as zero rather than dropping
    /// the record.
    pub fn from_estimate(
        pool_address: impl Into<String>,
        token_in: impl Into<String>,
        token_out: impl Into<String>,
        estimate: &TradeEstimate,
        price: Decimal,
        slippage: Decimal,
        pool_state_id: Option<i32>,
    ) -> Self {
        let slippage_bps = (slippage * Decimal::from(10_000))
            .trunc()
            .to_i32()
            .unwrap_or(0)
            .clamp(0, 10_000);

        Self {
            pool_address: pool_address.into(),
            token_in: token_in.into(),
            token_out: token_out.into(),
            amount_in: estimate.amount_in,
            expected_output: Decimal::from_str(&estimate.estimated_amount_out)
                .unwrap_or(Decimal::ZERO),
            price_at_trade: price,
            price_impact: estimate.price_impact,
            slippage_bps,
            fee: estimate.fee,
            pool_state_id,
        }
    }
}

/// Receiver for pool snapshots and estimated trades
#[async_trait]
pub trait TradeSink: Send + Sync {
    /// Store a snapshot; returns its id
    async fn record_pool_state(&self, state: &PoolState, price: Decimal) -> Result<i32>;

    /// Store a pending trade; returns its id
    async fn record_trade(&self, trade: &TradeRecord) -> Result<i32>;
}

/// Stored pool snapshot
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoredPoolState {
    pub id: i32,
    pub pool_address: String,
    pub lp_supply: String,
    pub token_a_balance: String,
    pub token_b_balance: String,
    pub token_a_price: Decimal,
    pub token_b_price: Decimal,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Stored trade
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoredTrade {
    pub id: i32,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: Decimal,
    pub amount_out: Decimal,
    pub price_at_trade: Decimal,
    pub estimated_price_impact: Decimal,
    pub slippage_bps: i32,
    pub fees_sol: Decimal,
    pub status: String,
    pub virtual_signature: Option<String>,
    pub pool_state_id: Option<i32>,
    pub created_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
}

/// Postgres-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a lazily connecting pool; nothing is dialed until first use
    pub fn connect(config: &DatabaseConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(config.password.expose_secret());

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Configured Postgres store"
        );

        Self {
            pool: PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(ACQUIRE_TIMEOUT)
                .connect_lazy_with(options),
        }
    }

    /// Most recent snapshots of a pool, newest first
    pub async fn recent_pool_states(
        &self,
        pool_address: &str,
        limit: i64,
    ) -> Result<Vec<StoredPoolState>> {
        let rows = sqlx::query_as::<_, StoredPoolState>(SELECT_POOL_STATES)
            .bind(pool_address)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    /// Most recent trades against a pool, newest first
    ///
    /// Trades without a stored snapshot are included.
    pub async fn recent_trades(&self, pool_address: &str, limit: i64) -> Result<Vec<StoredTrade>> {
        let rows = sqlx::query_as::<_, StoredTrade>(SELECT_TRADES)
            .bind(pool_address)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl TradeSink for PgStore {
    async fn record_pool_state(&self, state: &PoolState, price: Decimal) -> Result<i32> {
        // Prices are relative to the pool's other token: A is quoted in B, and B is 1
        let id: i32 = sqlx::query_scalar(INSERT_POOL_STATE)
            .bind(&state.pool_address)
            .bind(&state.lp_supply)
            .bind(&state.token_a_balance)
            .bind(&state.token_b_balance)
            .bind(price)
            .bind(Decimal::ONE)
            .bind(state.timestamp)
            .fetch_one(&self.pool)
            .await?;

        Ok(id)
    }

    async fn record_trade(&self, trade: &TradeRecord) -> Result<i32> {
        let id: i32 = sqlx::query_scalar(INSERT_TRADE)
            .bind(&trade.token_in)
            .bind(&trade.token_out)
            .bind(trade.amount_in)
            .bind(trade.expected_output)
            .bind(trade.price_at_trade)
            .bind(trade.price_impact)
            .bind(trade.slippage_bps)
            .bind(trade.fee)
            .bind(trade.pool_state_id)
            .bind(TradeStatus::Pending.as_str())
            .bind(&trade.pool_address)
            .fetch_one(&self.pool)
            .await?;

        Ok(id)
    }
}
