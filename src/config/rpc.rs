//! RPC endpoint configuration
//!
//! Resolution order:
//! 1. `RPC_URL` - explicit endpoint, highest priority
//! 2. `ALCHEMY_API_KEY` - builds the URL for the configured chain
//! 3. Public RPC fallback - rate limited, for testing only
//!
//! # Examples
//!
//! ```bash
//! export RPC_URL="https://eth-mainnet.g.alchemy.com/v2/YOUR_KEY"
//! # or
//! export ALCHEMY_API_KEY="YOUR_KEY"
//! ```

use crate::{Error, Result};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};

/// Chain ID constants
pub mod chains {
    pub const ETHEREUM: u64 = 1;
    pub const ARBITRUM: u64 = 42161;
    pub const OPTIMISM: u64 = 10;
    pub const BASE: u64 = 8453;
    pub const POLYGON: u64 = 137;
}

/// Environment variable names
mod env_vars {
    pub const RPC_URL: &str = "RPC_URL";
    pub const ALCHEMY_API_KEY: &str = "ALCHEMY_API_KEY";
}

/// Public RPC endpoints (rate limited, for testing only)
mod public_rpcs {
    pub const ETHEREUM: &str = "https://eth.llamarpc.com";
    pub const ARBITRUM: &str = "https://arb1.arbitrum.io/rpc";
    pub const OPTIMISM: &str = "https://mainnet.optimism.io";
    pub const BASE: &str = "https://mainnet.base.org";
    pub const POLYGON: &str = "https://polygon-rpc.com";
}

/// RPC endpoint for the chain the pool lives on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcConfig {
    url: String,
    chain_id: u64,
}

impl RpcConfig {
    /// Resolve the RPC endpoint for `chain_id` from environment variables
    pub fn from_env(chain_id: u64) -> Result<Self> {
        if let Ok(url) = std::env::var(env_vars::RPC_URL) {
            tracing::debug!(chain_id, "Using RPC_URL");
            return Ok(Self { url, chain_id });
        }

        if let Ok(key) = std::env::var(env_vars::ALCHEMY_API_KEY) {
            if let Some(url) = alchemy_url(chain_id, &key) {
                tracing::info!(chain_id, "Building RPC URL from ALCHEMY_API_KEY");
                return Ok(Self { url, chain_id });
            }
        }

        let url = public_rpc(chain_id).ok_or_else(|| {
            Error::Config(format!(
                "No RPC configured for chain {} and no public fallback known; set {}",
                chain_id,
                env_vars::RPC_URL
            ))
        })?;
        tracing::warn!(chain_id, "No RPC configured, using public RPC (rate limited)");

        Ok(Self {
            url: url.to_string(),
            chain_id,
        })
    }

    /// Create with an explicit RPC URL
    pub fn with_url(url: impl Into<String>, chain_id: u64) -> Self {
        Self {
            url: url.into(),
            chain_id,
        }
    }

    /// Get the RPC URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get the chain ID
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Parse the URL for use with alloy's HTTP transport
    pub fn parse_url(&self) -> Result<url::Url> {
        self.url
            .parse()
            .map_err(|e| Error::Config(format!("Invalid RPC URL: {}", e)))
    }

    /// Build a type-erased HTTP provider for this endpoint
    ///
    /// No request is made here; the first RPC call opens the connection.
    pub fn provider(&self) -> Result<DynProvider> {
        let url = self.parse_url()?;
        Ok(ProviderBuilder::new().connect_http(url).erased())
    }
}

fn alchemy_url(chain_id: u64, key: &str) -> Option<String> {
    let network = match chain_id {
        chains::ETHEREUM => "eth-mainnet",
        chains::ARBITRUM => "arb-mainnet",
        chains::OPTIMISM => "opt-mainnet",
        chains::BASE => "base-mainnet",
        chains::POLYGON => "polygon-mainnet",
        _ => return None,
    };
    Some(format!("https://{}.g.alchemy.com/v2/{}", network, key))
}

fn public_rpc(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        chains::ETHEREUM => Some(public_rpcs::ETHEREUM),
        chains::ARBITRUM => Some(public_rpcs::ARBITRUM),
        chains::OPTIMISM => Some(public_rpcs::OPTIMISM),
        chains::BASE => Some(public_rpcs::BASE),
        chains::POLYGON => Some(public_rpcs::POLYGON),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_url() {
        let config = RpcConfig::with_url("https://custom.rpc", chains::BASE);

        assert_eq!(config.url(), "https://custom.rpc");
        assert_eq!(config.chain_id(), chains::BASE);
        assert!(config.parse_url().is_ok());
    }

    #[test]
    fn test_invalid_url_is_config_error() {
        let config = RpcConfig::with_url("not a url", chains::ETHEREUM);
        assert!(matches!(config.parse_url(), Err(Error::Config(_))));
    }

    #[test]
    fn test_alchemy_url() {
        assert_eq!(
            alchemy_url(chains::ARBITRUM, "k").as_deref(),
            Some("https://arb-mainnet.g.alchemy.com/v2/k")
        );
        assert_eq!(alchemy_url(999, "k"), None);
    }

    #[test]
    fn test_public_rpc_fallbacks() {
        assert_eq!(public_rpc(chains::ETHEREUM), Some(public_rpcs::ETHEREUM));
        assert_eq!(public_rpc(chains::BASE), Some(public_rpcs::BASE));
        assert_eq!(public_rpc(999), None);
    }
}
