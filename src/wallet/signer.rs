//! Local key wallet
//!
//! SECURITY: This is the ONLY place where the private key exists.
//! - The key is held in alloy's PrivateKeySigner
//! - The hex input arrives as a SecretString and is never logged
//! - Debug output redacts the signer

use crate::{Error, Result};
use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use secrecy::{ExposeSecret, SecretString};

/// Wallet that signs the client's approve and swap transactions
pub struct SecureWallet {
    /// Public address (safe to expose)
    address: Address,
    /// Ethereum wallet for alloy integration
    wallet: EthereumWallet,
}

impl SecureWallet {
    /// Create a wallet from an environment variable
    ///
    /// Returns `Ok(None)` when the variable is not set.
    pub fn from_env(var_name: &str) -> Result<Option<Self>> {
        match std::env::var(var_name) {
            Ok(key_hex) => Self::from_secret(&SecretString::from(key_hex)).map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Create a wallet from a hex-encoded private key
    pub fn from_secret(key_hex: &SecretString) -> Result<Self> {
        let exposed = key_hex.expose_secret().trim();
        let exposed = exposed.strip_prefix("0x").unwrap_or(exposed);

        let signer: PrivateKeySigner = exposed
            .parse()
            .map_err(|e| Error::Wallet(format!("Invalid private key: {}", e)))?;

        let address = signer.address();
        let wallet = EthereumWallet::from(signer);

        Ok(Self { address, wallet })
    }

    /// Get the public address (safe to share)
    pub fn address(&self) -> Address {
        self.address
    }

    /// Get the EthereumWallet for use with alloy providers
    pub fn wallet(&self) -> &EthereumWallet {
        &self.wallet
    }
}

// Implement Debug manually to avoid exposing the signer
impl std::fmt::Debug for SecureWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureWallet")
            .field("address", &self.address)
            .field("signer", &"[REDACTED]")
            .finish()
    }
}
