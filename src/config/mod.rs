//! Configuration for the micro-trade agent

pub mod rpc;

use crate::tokens::TokenInfo;
use crate::{Error, Result};
use alloy::primitives::Address;
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::str::FromStr;

// Re-export RPC config
pub use rpc::RpcConfig;

/// Environment variable names
mod env_vars {
    pub const CHAIN_ID: &str = "CHAIN_ID";
    pub const POOL_ADDRESS: &str = "POOL_ADDRESS";
    pub const POOL_FEE_BPS: &str = "POOL_FEE_BPS";
    pub const PRICE_ORIENTATION: &str = "PRICE_ORIENTATION";
    pub const TOKEN_A_ADDRESS: &str = "TOKEN_A_ADDRESS";
    pub const TOKEN_A_DECIMALS: &str = "TOKEN_A_DECIMALS";
    pub const TOKEN_A_SYMBOL: &str = "TOKEN_A_SYMBOL";
    pub const TOKEN_B_ADDRESS: &str = "TOKEN_B_ADDRESS";
    pub const TOKEN_B_DECIMALS: &str = "TOKEN_B_DECIMALS";
    pub const TOKEN_B_SYMBOL: &str = "TOKEN_B_SYMBOL";
    pub const LLM_API_KEY: &str = "LLM_API_KEY";
    pub const BIND_ADDRESS: &str = "BIND_ADDRESS";
    pub const PORT: &str = "PORT";
    pub const POSTGRES_HOST: &str = "POSTGRES_HOST";
    pub const POSTGRES_PORT: &str = "POSTGRES_PORT";
    pub const POSTGRES_DB: &str = "POSTGRES_DB";
    pub const POSTGRES_USER: &str = "POSTGRES_USER";
    pub const POSTGRES_PASSWORD: &str = "POSTGRES_PASSWORD";
}

/// Which reserve ratio defines the unit price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PriceOrientation {
    /// Token B reserve divided by token A reserve
    #[default]
    BPerA,
    /// Token A reserve divided by token B reserve
    APerB,
}

impl FromStr for PriceOrientation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "b_per_a" => Ok(PriceOrientation::BPerA),
            "a_per_b" => Ok(PriceOrientation::APerB),
            other => Err(Error::Config(format!(
                "Unknown price orientation '{}', expected 'b_per_a' or 'a_per_b'",
                other
            ))),
        }
    }
}

/// The AMM pool the agent tracks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pool (pair) contract address
    pub address: Address,
    /// Input side of every quote
    pub token_a: TokenInfo,
    /// Output side of every quote
    pub token_b: TokenInfo,
    /// Swap fee in basis points (30 = 0.30%)
    #[serde(default = "default_fee_bps")]
    pub fee_bps: u32,
    /// Reserve ratio used as unit price
    #[serde(default)]
    pub price_orientation: PriceOrientation,
}

fn default_fee_bps() -> u32 {
    30
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            address: Address::ZERO,
            token_a: TokenInfo::new(Address::ZERO, "TOKEN_A", 18),
            token_b: TokenInfo::new(Address::ZERO, "TOKEN_B", 18),
            fee_bps: default_fee_bps(),
            price_orientation: PriceOrientation::default(),
        }
    }
}

/// Trading parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSettings {
    /// Maximum slippage as a fraction (0.01 = 1%)
    pub max_slippage: Decimal,
    /// Minimum relative price move worth acting on
    pub min_price_change_threshold: Decimal,
    /// Minimum milliseconds between trades
    pub min_trade_interval_ms: u64,
    /// Native balance to keep for fees
    pub min_native_balance: Decimal,
    /// Default slippage in basis points for callers that do not pass one
    pub default_slippage_bps: u32,
}

impl Default for TradeSettings {
    fn default() -> Self {
        Self {
            max_slippage: Decimal::new(1, 2),               // 1%
            min_price_change_threshold: Decimal::new(2, 2), // 2%
            min_trade_interval_ms: 5 * 60 * 1000,           // 5 minutes
            min_native_balance: Decimal::new(5, 2),
            default_slippage_bps: 300,
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Postgres connection parameters
#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    #[serde(skip_serializing, deserialize_with = "deserialize_secret")]
    pub password: SecretString,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "micro_agent".to_string(),
            user: "postgres".to_string(),
            password: SecretString::from("postgres".to_string()),
        }
    }
}

/// Main configuration
#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    /// Chain the pool lives on
    pub chain_id: u64,
    /// Explicit RPC URL; resolved from the environment when absent
    #[serde(default)]
    pub rpc_url: Option<String>,
    /// Pool and token metadata
    pub pool: PoolConfig,
    /// Trading parameters
    #[serde(default)]
    pub trading: TradeSettings,
    /// HTTP listener
    #[serde(default)]
    pub server: ServerConfig,
    /// Persistence sink; disabled when absent
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    /// API key for natural-language tooling (not used by the estimator)
    #[serde(
        default,
        skip_serializing,
        deserialize_with = "deserialize_optional_secret"
    )]
    pub llm_api_key: Option<SecretString>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain_id: rpc::chains::ETHEREUM,
            rpc_url: None,
            pool: PoolConfig::default(),
            trading: TradeSettings::default(),
            server: ServerConfig::default(),
            database: None,
            llm_api_key: None,
        }
    }
}

impl Config {
    /// Load from a JSON file when given, otherwise from the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Build configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Some(chain_id) = env_parse::<u64>(env_vars::CHAIN_ID)? {
            config.chain_id = chain_id;
        }

        if let Some(address) = env_parse::<Address>(env_vars::POOL_ADDRESS)? {
            config.pool.address = address;
        }
        if let Some(fee_bps) = env_parse::<u32>(env_vars::POOL_FEE_BPS)? {
            config.pool.fee_bps = fee_bps;
        }
        if let Some(orientation) = env_parse::<PriceOrientation>(env_vars::PRICE_ORIENTATION)? {
            config.pool.price_orientation = orientation;
        }

        token_from_env(
            &mut config.pool.token_a,
            env_vars::TOKEN_A_ADDRESS,
            env_vars::TOKEN_A_DECIMALS,
            env_vars::TOKEN_A_SYMBOL,
        )?;
        token_from_env(
            &mut config.pool.token_b,
            env_vars::TOKEN_B_ADDRESS,
            env_vars::TOKEN_B_DECIMALS,
            env_vars::TOKEN_B_SYMBOL,
        )?;

        if let Ok(bind_address) = std::env::var(env_vars::BIND_ADDRESS) {
            config.server.bind_address = bind_address;
        }
        if let Some(port) = env_parse::<u16>(env_vars::PORT)? {
            config.server.port = port;
        }

        config.llm_api_key = std::env::var(env_vars::LLM_API_KEY)
            .ok()
            .map(SecretString::from);

        // Persistence is opt-in: only configured when a host or database is named
        if std::env::var(env_vars::POSTGRES_HOST).is_ok()
            || std::env::var(env_vars::POSTGRES_DB).is_ok()
        {
            let mut db = DatabaseConfig::default();
            if let Ok(host) = std::env::var(env_vars::POSTGRES_HOST) {
                db.host = host;
            }
            if let Some(port) = env_parse::<u16>(env_vars::POSTGRES_PORT)? {
                db.port = port;
            }
            if let Ok(database) = std::env::var(env_vars::POSTGRES_DB) {
                db.database = database;
            }
            if let Ok(user) = std::env::var(env_vars::POSTGRES_USER) {
                db.user = user;
            }
            if let Ok(password) = std::env::var(env_vars::POSTGRES_PASSWORD) {
                db.password = SecretString::from(password);
            }
            config.database = Some(db);
        }

        Ok(config)
    }

    /// Reject configurations the estimator cannot work with
    pub fn validate(&self) -> Result<()> {
        let slippage = self.trading.max_slippage;
        if slippage <= Decimal::ZERO || slippage >= Decimal::ONE {
            return Err(Error::Config(format!(
                "max_slippage must be a fraction in (0, 1), got {}",
                slippage
            )));
        }

        if self.pool.address == Address::ZERO {
            return Err(Error::Config(format!(
                "pool address not configured (set {})",
                env_vars::POOL_ADDRESS
            )));
        }

        for token in [&self.pool.token_a, &self.pool.token_b] {
            if token.address == Address::ZERO {
                return Err(Error::Config(format!(
                    "token {} has no address configured",
                    token.symbol
                )));
            }
            if token.decimals > 36 {
                return Err(Error::Config(format!(
                    "token {} has unsupported decimals {}",
                    token.symbol, token.decimals
                )));
            }
        }

        if self.pool.token_a.address == self.pool.token_b.address {
            return Err(Error::Config(
                "token A and token B must be different".to_string(),
            ));
        }

        if self.pool.fee_bps >= 10_000 {
            return Err(Error::Config(format!(
                "fee_bps must be below 10000, got {}",
                self.pool.fee_bps
            )));
        }

        Ok(())
    }

    /// RPC endpoint for the configured chain
    pub fn rpc(&self) -> Result<RpcConfig> {
        match &self.rpc_url {
            Some(url) => Ok(RpcConfig::with_url(url.clone(), self.chain_id)),
            None => RpcConfig::from_env(self.chain_id),
        }
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}: {}", name, e))),
        Err(_) => Ok(None),
    }
}

fn token_from_env(
    token: &mut TokenInfo,
    address_var: &str,
    decimals_var: &str,
    symbol_var: &str,
) -> Result<()> {
    if let Some(address) = env_parse::<Address>(address_var)? {
        token.address = address;
    }
    if let Some(decimals) = env_parse::<u8>(decimals_var)? {
        token.decimals = decimals;
    }
    if let Ok(symbol) = std::env::var(symbol_var) {
        token.symbol = symbol;
    }
    Ok(())
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

fn deserialize_optional_secret<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(|s| s.map(SecretString::from))
}
