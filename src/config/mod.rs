//! Configuration for the swap client

pub mod rpc;

use crate::tokens::{chains, registry};
use crate::{Error, Result};
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

// Re-export RPC config
pub use rpc::RpcConfig;

/// Environment variable names
pub mod env_vars {
    pub const APP_ENV: &str = "APP_ENV";
    pub const DAI_ADDRESS: &str = "DAI_ADDRESS";
    pub const UNISWAP_ROUTER_ADDRESS: &str = "UNISWAP_ROUTER_ADDRESS";
    pub const SWAP_DEADLINE_SECS: &str = "SWAP_DEADLINE_SECS";
    pub const DISPLAY_DIGITS: &str = "DISPLAY_DIGITS";
    pub const NETWORK_POLL_SECS: &str = "NETWORK_POLL_SECS";
    pub const PRIVATE_KEY: &str = "PRIVATE_KEY";
}

/// Swap transactions are rejected by the chain this long after submission
pub const DEFAULT_SWAP_DEADLINE_SECS: u64 = 30 * 60;
pub const DEFAULT_NETWORK_POLL_SECS: u64 = 4;

/// The network the client insists on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Ropsten,
}

impl Network {
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Mainnet => chains::MAINNET,
            Network::Ropsten => chains::ROPSTEN,
        }
    }

    /// Display name used in "switch network" prompts
    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "Ethereum Mainnet",
            Network::Ropsten => "Ropsten Testnet",
        }
    }

    /// Development builds run against the testnet
    pub fn for_environment(app_env: &str) -> Self {
        if app_env.eq_ignore_ascii_case("development") {
            Network::Ropsten
        } else {
            Network::Mainnet
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Expected network; sessions on any other chain are refused
    pub network: Network,
    /// DAI token contract
    pub dai_address: Address,
    /// Uniswap V2 Router02 contract
    pub router_address: Address,
    /// Swap deadline window (seconds)
    #[serde(default = "default_swap_deadline_secs")]
    pub swap_deadline_secs: u64,
    /// Decimal digits shown for balances and prices
    #[serde(default = "default_display_digits")]
    pub display_digits: usize,
    /// How often the RPC provider checks for a network change (seconds)
    #[serde(default = "default_network_poll_secs")]
    pub network_poll_secs: u64,
}

fn default_swap_deadline_secs() -> u64 {
    DEFAULT_SWAP_DEADLINE_SECS
}

fn default_display_digits() -> usize {
    crate::format::DISPLAY_DIGITS
}

fn default_network_poll_secs() -> u64 {
    DEFAULT_NETWORK_POLL_SECS
}

impl Config {
    /// Defaults for a network, taken from the token registry
    pub fn for_network(network: Network) -> Self {
        let (dai_address, router_address) = registry()
            .for_chain(network.chain_id())
            .map(|tokens| (tokens.dai, tokens.router))
            .unwrap_or_default();

        Self {
            network,
            dai_address,
            router_address,
            swap_deadline_secs: DEFAULT_SWAP_DEADLINE_SECS,
            display_digits: crate::format::DISPLAY_DIGITS,
            network_poll_secs: DEFAULT_NETWORK_POLL_SECS,
        }
    }

    /// Build configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_env = lookup(env_vars::APP_ENV).unwrap_or_else(|| "production".to_string());
        let mut config = Self::for_network(Network::for_environment(&app_env));

        if let Some(value) = lookup(env_vars::DAI_ADDRESS) {
            config.dai_address = parse_var(env_vars::DAI_ADDRESS, &value)?;
        }
        if let Some(value) = lookup(env_vars::UNISWAP_ROUTER_ADDRESS) {
            config.router_address = parse_var(env_vars::UNISWAP_ROUTER_ADDRESS, &value)?;
        }
        if let Some(value) = lookup(env_vars::SWAP_DEADLINE_SECS) {
            config.swap_deadline_secs = parse_var(env_vars::SWAP_DEADLINE_SECS, &value)?;
        }
        if let Some(value) = lookup(env_vars::DISPLAY_DIGITS) {
            config.display_digits = parse_var(env_vars::DISPLAY_DIGITS, &value)?;
        }
        if let Some(value) = lookup(env_vars::NETWORK_POLL_SECS) {
            config.network_poll_secs = parse_var(env_vars::NETWORK_POLL_SECS, &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.dai_address == Address::ZERO {
            return Err(Error::Config(format!(
                "{} is not set for {}",
                env_vars::DAI_ADDRESS,
                self.network.name()
            )));
        }
        if self.router_address == Address::ZERO {
            return Err(Error::Config(format!(
                "{} is not set for {}",
                env_vars::UNISWAP_ROUTER_ADDRESS,
                self.network.name()
            )));
        }
        if self.swap_deadline_secs == 0 {
            return Err(Error::Config(
                "swap deadline window must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn expected_chain_id(&self) -> u64 {
        self.network.chain_id()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::for_network(Network::Mainnet)
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("Invalid {}: {}", name, e)))
}
