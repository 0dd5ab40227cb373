//! Secure wallet management
//!
//! This module handles the agent's key identity and read-only balance
//! queries. The private key never leaves `signer`.

mod balance;
mod signer;

pub use balance::{BalanceSource, RpcBalanceSource};
pub use signer::SecureWallet;
