//! Micro-Trade Agent CLI
//!
//! Command-line interface for serving the agent over HTTP and for one-off
//! price, balance and estimate queries.

use alloy::primitives::Address;
use clap::{Parser, Subcommand};
use micro_trade_agent::config::ServerConfig;
use micro_trade_agent::persistence::PgStore;
use micro_trade_agent::tokens::NATIVE_SYMBOL;
use micro_trade_agent::{server, AgentStatus, Config, Error, Result, TradingAgent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "micro-agent")]
#[command(about = "AMM micro-trade estimator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to JSON config file (environment variables are used otherwise)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP endpoints
    Serve,

    /// Print the pool's current unit price
    Price,

    /// Estimate a micro trade worth the given USD amount
    Estimate {
        /// Trade size in USD
        #[arg(long, default_value_t = 1.0)]
        amount_usd: f64,
    },

    /// Print the pool's current reserves
    PoolState,

    /// Print the wallet balance (native asset unless a token is given)
    Balance {
        /// ERC20 token address
        #[arg(long)]
        token: Option<String>,
    },

    /// Show recorded pool snapshots and trades (requires a database)
    History {
        /// Number of rows per table
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins unless --verbose is given
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(cli.json_logs.then(|| fmt::layer().json()))
        .with((!cli.json_logs).then(|| fmt::layer()))
        .with(filter)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Serve => run_server(config_path).await?,
        Commands::Price => {
            let agent = build_agent(&Config::load(config_path)?)?;
            let price = agent.check_price().await?;
            print_json(&serde_json::json!({ "price": price }))?;
        }
        Commands::Estimate { amount_usd } => {
            let agent = build_agent(&Config::load(config_path)?)?;
            let estimate = agent.estimate_micro_trade(amount_usd).await?;
            print_json(&estimate)?;
        }
        Commands::PoolState => {
            let agent = build_agent(&Config::load(config_path)?)?;
            print_json(&agent.pool_state().await?)?;
        }
        Commands::Balance { token } => {
            let agent = build_agent(&Config::load(config_path)?)?;
            let token = token
                .map(|raw| {
                    raw.parse::<Address>()
                        .map_err(|e| Error::Config(format!("invalid token address '{}': {}", raw, e)))
                })
                .transpose()?;
            let balance = agent.get_balance(token).await?;
            print_json(&serde_json::json!({
                "wallet": agent.wallet().address_string(),
                "asset": token
                    .map(|t| t.to_checksum(None))
                    .unwrap_or_else(|| NATIVE_SYMBOL.to_string()),
                "balance": balance,
            }))?;
        }
        Commands::History { limit } => run_history(&Config::load(config_path)?, limit).await?,
        Commands::Config => {
            let config = match config_path {
                Some(path) => Config::from_file(path)?,
                None => Config::from_env()?,
            };
            print_json(&config)?;
        }
    }

    Ok(())
}

/// Start the HTTP server, in degraded mode if the agent cannot be built
async fn run_server(config_path: Option<&Path>) -> Result<()> {
    let (server_config, status) = match Config::load(config_path) {
        Ok(config) => (config.server.clone(), AgentStatus::from_result(build_agent(&config))),
        Err(e) => {
            // Still listen so the failure is visible on /health
            let server_config = Config::from_env()
                .map(|c| c.server)
                .unwrap_or_else(|_| ServerConfig::default());
            (server_config, AgentStatus::from_result(Err(e)))
        }
    };

    server::serve(&server_config, status).await
}

/// Build the agent, attaching the Postgres sink when one is configured
fn build_agent(config: &Config) -> Result<TradingAgent> {
    let agent = TradingAgent::from_config(config)?;
    Ok(match &config.database {
        Some(db) => agent.with_sink(Arc::new(PgStore::connect(db))),
        None => {
            tracing::info!("No database configured - estimates will not be recorded");
            agent
        }
    })
}

async fn run_history(config: &Config, limit: i64) -> Result<()> {
    let db = config.database.as_ref().ok_or_else(|| {
        Error::Config("no database configured (set POSTGRES_HOST or POSTGRES_DB)".to_string())
    })?;
    let store = PgStore::connect(db);
    let pool_address = config.pool.address.to_checksum(None);

    let states = store.recent_pool_states(&pool_address, limit).await?;
    let trades = store.recent_trades(&pool_address, limit).await?;
    store.close().await;

    print_json(&serde_json::json!({
        "poolStates": states,
        "trades": trades,
    }))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
