//! Wallet provider abstraction
//!
//! A provider is the user's connection to the chain: it knows the connected
//! accounts and network, reads balances, emits account/network change events,
//! streams logs and binds contract handles that sign with the user's wallet.
//!
//! - [`rpc`] implements it on an alloy HTTP provider with a local key
//! - `mock` (tests only) implements it in memory

pub mod rpc;

#[cfg(test)]
pub(crate) mod mock;

use crate::contracts::{Erc20, PairFactory, SwapRouter};
use crate::Result;
use alloy::primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio::sync::broadcast;

pub use rpc::{KeyConnector, RpcWalletProvider};

/// Events pushed by the provider outside of any request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// The set of exposed accounts changed; empty means the wallet disconnected
    AccountsChanged(Vec<Address>),
    /// The wallet moved to another chain
    ChainChanged(u64),
}

/// Log streams the managers react to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogWatch {
    /// ERC20 `Transfer` logs of any token sent to the address
    TransfersTo(Address),
    /// ERC20 `Transfer` logs of any token sent from the address
    TransfersFrom(Address),
    /// `Swap` logs emitted by a Uniswap V2 pair
    PairSwaps(Address),
}

/// Stream of matching logs, identified by their transaction hash when known
pub type LogStream = BoxStream<'static, Option<TxHash>>;

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Accounts the wallet currently exposes to the client
    async fn list_accounts(&self) -> Result<Vec<Address>>;

    async fn chain_id(&self) -> Result<u64>;

    /// Native balance in wei
    async fn get_balance(&self, owner: Address) -> Result<U256>;

    /// Subscribe to account and network changes
    fn events(&self) -> broadcast::Receiver<ProviderEvent>;

    async fn watch_logs(&self, watch: LogWatch) -> Result<LogStream>;

    fn erc20(&self, token: Address) -> Arc<dyn Erc20>;

    fn router(&self, router: Address) -> Arc<dyn SwapRouter>;

    fn factory(&self, factory: Address) -> Arc<dyn PairFactory>;
}

/// Entry point to a wallet
#[async_trait]
pub trait Connector: Send + Sync {
    /// Run the interactive wallet selection and return the chosen provider
    async fn connect(&self) -> Result<Arc<dyn WalletProvider>>;

    /// Return a provider without user interaction if permission already exists
    async fn restore(&self) -> Option<Arc<dyn WalletProvider>>;
}
