//! Shared token registry
//!
//! Well-known DAI and Uniswap V2 router addresses for the networks the client
//! can be pointed at. WETH is read from the router itself.

use alloy::primitives::{address, Address};
use std::collections::HashMap;

/// Chain ID constants
pub mod chains {
    pub const MAINNET: u64 = 1;
    pub const ROPSTEN: u64 = 3;
}

/// Well-known addresses per chain
pub mod addresses {
    use super::*;

    // === Ethereum Mainnet ===
    pub const DAI_MAINNET: Address = address!("6b175474e89094c44da98b954eedeac495271d0f");

    // === Ropsten ===
    pub const DAI_ROPSTEN: Address = address!("ad6d458402f60fd3bd25163575031acdce07538d");

    // Router02 is deployed at the same address on both networks
    pub const UNISWAP_V2_ROUTER: Address = address!("7a250d5630b4cf539739df2c5dacb4c659f2488d");
}

/// Addresses of the pieces the swap needs on one chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTokens {
    pub dai: Address,
    pub router: Address,
}

/// Token registry keyed by chain ID
pub struct TokenRegistry {
    per_chain: HashMap<u64, ChainTokens>,
}

impl TokenRegistry {
    /// Create a new token registry with all known chains
    pub fn new() -> Self {
        use addresses::*;

        let mut per_chain = HashMap::new();
        per_chain.insert(
            chains::MAINNET,
            ChainTokens {
                dai: DAI_MAINNET,
                router: UNISWAP_V2_ROUTER,
            },
        );
        per_chain.insert(
            chains::ROPSTEN,
            ChainTokens {
                dai: DAI_ROPSTEN,
                router: UNISWAP_V2_ROUTER,
            },
        );

        Self { per_chain }
    }

    /// Get the DAI/router pair for a chain
    pub fn for_chain(&self, chain_id: u64) -> Option<&ChainTokens> {
        self.per_chain.get(&chain_id)
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global token registry (lazy initialized)
static REGISTRY: std::sync::OnceLock<TokenRegistry> = std::sync::OnceLock::new();

/// Get the global token registry
pub fn registry() -> &'static TokenRegistry {
    REGISTRY.get_or_init(TokenRegistry::new)
}
