//! RPC endpoint configuration
//!
//! Resolution order follows Ethereum ecosystem conventions:
//! 1. Per-chain env vars (ETH_RPC_URL, ROPSTEN_RPC_URL) - highest priority
//! 2. Provider API keys (ALCHEMY_API_KEY, INFURA_API_KEY) - builds URLs automatically
//! 3. Public mainnet RPC fallback - for testing only
//!
//! # Usage
//!
//! ```bash
//! # Option 1: Per-chain URL (recommended)
//! export ETH_RPC_URL="https://eth-mainnet.g.alchemy.com/v2/YOUR_KEY"
//!
//! # Option 2: Single provider API key
//! export INFURA_API_KEY="YOUR_KEY"
//! ```

use crate::tokens::chains;
use std::collections::HashMap;

/// RPC configuration for the supported chains
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// RPC URLs indexed by chain ID
    urls: HashMap<u64, String>,
}

/// Environment variable names
mod env_vars {
    pub const ETH_RPC_URL: &str = "ETH_RPC_URL";
    pub const ROPSTEN_RPC_URL: &str = "ROPSTEN_RPC_URL";

    pub const ALCHEMY_API_KEY: &str = "ALCHEMY_API_KEY";
    pub const INFURA_API_KEY: &str = "INFURA_API_KEY";
}

/// Public RPC endpoints (rate limited, for testing only)
mod public_rpcs {
    pub const MAINNET: &str = "https://eth.llamarpc.com";
}

impl RpcConfig {
    /// Create RPC config from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create RPC config from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut urls = HashMap::new();

        // Priority 1: per-chain URLs
        if let Some(url) = lookup(env_vars::ETH_RPC_URL) {
            tracing::debug!("Using ETH_RPC_URL for mainnet");
            urls.insert(chains::MAINNET, url);
        }
        if let Some(url) = lookup(env_vars::ROPSTEN_RPC_URL) {
            tracing::debug!("Using ROPSTEN_RPC_URL for Ropsten");
            urls.insert(chains::ROPSTEN, url);
        }

        // Priority 2: Alchemy
        if urls.is_empty() {
            if let Some(key) = lookup(env_vars::ALCHEMY_API_KEY) {
                tracing::info!("Building RPC URLs from ALCHEMY_API_KEY");
                urls.insert(
                    chains::MAINNET,
                    format!("https://eth-mainnet.g.alchemy.com/v2/{}", key),
                );
                urls.insert(
                    chains::ROPSTEN,
                    format!("https://eth-ropsten.alchemyapi.io/v2/{}", key),
                );
            }
        }

        // Priority 3: Infura
        if urls.is_empty() {
            if let Some(key) = lookup(env_vars::INFURA_API_KEY) {
                tracing::info!("Building RPC URLs from INFURA_API_KEY");
                urls.insert(
                    chains::MAINNET,
                    format!("https://mainnet.infura.io/v3/{}", key),
                );
                urls.insert(
                    chains::ROPSTEN,
                    format!("https://ropsten.infura.io/v3/{}", key),
                );
            }
        }

        // Priority 4: public mainnet fallback
        if !urls.contains_key(&chains::MAINNET) {
            tracing::warn!("No RPC configured for mainnet, using public RPC (rate limited)");
        }
        urls.entry(chains::MAINNET)
            .or_insert_with(|| public_rpcs::MAINNET.to_string());

        Self { urls }
    }

    /// Get RPC URL for a chain
    pub fn get(&self, chain_id: u64) -> Option<&str> {
        self.urls.get(&chain_id).map(|s| s.as_str())
    }
}
