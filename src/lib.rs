//! Micro-Trade Agent
//!
//! A token-trading assistant that reads an AMM pool and estimates small
//! trades:
//! - Reads pool reserves over JSON-RPC (constant-product pair contracts)
//! - Converts a USD budget into a token amount at the pool's unit price
//! - Quotes the swap within a configured maximum slippage
//! - Serves health, price, balance and estimate endpoints over HTTP
//!
//! # Security Model
//!
//! - Estimation only: nothing here signs or submits a transaction
//! - Private keys never leave the wallet module and are never serialized
//! - Persistence is an optional sink; its failures never fail a quote

pub mod agent;
pub mod config;
pub mod persistence;
pub mod pool;
pub mod server;
pub mod tokens;
pub mod wallet;

mod error;

// Re-export commonly used types
pub use agent::{AgentStatus, TradingAgent};
pub use config::{Config, RpcConfig};
pub use error::{Error, Result};
pub use pool::{PoolState, PriceSourceAdapter, TradeEstimate};
