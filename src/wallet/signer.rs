//! Secure wallet implementation
//!
//! SECURITY: This is the ONLY place where private keys exist.
//! - Keys are held in alloy's PrivateKeySigner which handles crypto securely
//! - Keys are never serialized to JSON
//! - Keys are never logged

use crate::{Error, Result};
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;

/// The agent's key identity
///
/// The private key is:
/// - Stored in alloy's PrivateKeySigner (handles crypto securely)
/// - Never serialized (no Serialize impl)
/// - Never exposed; only the derived address leaves this type
pub struct SecureWallet {
    signer: PrivateKeySigner,
}

impl SecureWallet {
    /// Generate a fresh random identity
    ///
    /// The key lives only in this process; a restart yields a new address.
    pub fn generate() -> Self {
        Self::from_signer(PrivateKeySigner::random())
    }

    /// Load the key from `var_name` when set, otherwise generate one
    ///
    /// A variable that is set but malformed is an error, not a silent fallback.
    pub fn from_env_or_generate(var_name: &str) -> Result<Self> {
        match std::env::var(var_name) {
            Ok(key_hex) => {
                let wallet = Self::from_hex(&key_hex)?;
                tracing::info!(address = %wallet.address_string(), "Loaded wallet from {}", var_name);
                Ok(wallet)
            }
            Err(_) => {
                let wallet = Self::generate();
                tracing::warn!(
                    address = %wallet.address_string(),
                    "{} not set - generated an ephemeral wallet",
                    var_name
                );
                Ok(wallet)
            }
        }
    }

    /// Create a wallet from a hex-encoded private key
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        // Remove 0x prefix if present
        let key_hex = key_hex.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| Error::Wallet(format!("Invalid private key: {}", e)))?;

        Ok(Self::from_signer(signer))
    }

    fn from_signer(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    /// Get the public address (safe to share)
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Get the address as a checksummed string
    pub fn address_string(&self) -> String {
        self.address().to_checksum(None)
    }
}

// Implement Debug manually to avoid exposing the signer
impl std::fmt::Debug for SecureWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureWallet")
            .field("address", &self.address())
            .field("signer", &"[REDACTED]")
            .finish()
    }
}
