//! alloy-backed wallet provider
//!
//! Signs with a local key held by [`SecureWallet`] and talks to a JSON-RPC
//! node over HTTP. A local key cannot switch accounts, so the only pushed
//! events are network changes, detected by polling `eth_chainId`.

use super::{Connector, LogStream, LogWatch, ProviderEvent, WalletProvider};
use crate::config::env_vars;
use crate::contracts::{
    Erc20, IUniswapV2Factory, IUniswapV2Pair, IUniswapV2Router02, PairFactory, PendingTx,
    SwapRouter, IERC20,
};
use crate::wallet::SecureWallet;
use crate::{Error, Result};
use alloy::network::{Ethereum, ReceiptResponse as _};
use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder};
use alloy::rpc::types::Filter;
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const EVENT_CAPACITY: usize = 16;

fn rpc_err(e: impl std::fmt::Display) -> Error {
    Error::Rpc(e.to_string())
}

fn contract_err(e: impl std::fmt::Display) -> Error {
    Error::Contract(e.to_string())
}

/// Wallet provider over an HTTP RPC endpoint
pub struct RpcWalletProvider {
    inner: DynProvider,
    account: Address,
    events: broadcast::Sender<ProviderEvent>,
    network_watch: JoinHandle<()>,
}

impl RpcWalletProvider {
    /// Connect to the node and start watching for network changes
    pub async fn connect(
        rpc_url: &str,
        wallet: &SecureWallet,
        poll_interval: Duration,
    ) -> Result<Self> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e| Error::Config(format!("Invalid RPC URL: {}", e)))?;

        let inner = ProviderBuilder::new()
            .wallet(wallet.wallet().clone())
            .connect_http(url)
            .erased();

        let chain_id = inner.get_chain_id().await.map_err(rpc_err)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let network_watch = tokio::spawn(watch_network(
            inner.clone(),
            chain_id,
            poll_interval,
            events.clone(),
        ));

        tracing::info!(
            address = %wallet.address(),
            chain_id = chain_id,
            "Connected RPC wallet provider"
        );

        Ok(Self {
            inner,
            account: wallet.address(),
            events,
            network_watch,
        })
    }
}

impl Drop for RpcWalletProvider {
    fn drop(&mut self) {
        self.network_watch.abort();
    }
}

async fn watch_network(
    provider: DynProvider,
    mut current: u64,
    interval: Duration,
    events: broadcast::Sender<ProviderEvent>,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match provider.get_chain_id().await {
            Ok(chain_id) if chain_id != current => {
                tracing::info!(from = current, to = chain_id, "Network changed");
                current = chain_id;
                let _ = events.send(ProviderEvent::ChainChanged(chain_id));
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "Chain id poll failed"),
        }
    }
}

fn log_filter(watch: LogWatch) -> Filter {
    match watch {
        LogWatch::TransfersTo(owner) => Filter::new()
            .event_signature(IERC20::Transfer::SIGNATURE_HASH)
            .topic2(owner.into_word()),
        LogWatch::TransfersFrom(owner) => Filter::new()
            .event_signature(IERC20::Transfer::SIGNATURE_HASH)
            .topic1(owner.into_word()),
        LogWatch::PairSwaps(pair) => Filter::new()
            .address(pair)
            .event_signature(IUniswapV2Pair::Swap::SIGNATURE_HASH),
    }
}

fn into_pending(pending: PendingTransactionBuilder<Ethereum>) -> PendingTx {
    let hash = *pending.tx_hash();
    let confirmation = async move {
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| Error::Transaction(e.to_string()))?;
        if receipt.status() {
            Ok(())
        } else {
            Err(Error::Transaction(format!("transaction {} reverted", hash)))
        }
    };
    PendingTx::new(hash, confirmation.boxed())
}

#[async_trait]
impl WalletProvider for RpcWalletProvider {
    async fn list_accounts(&self) -> Result<Vec<Address>> {
        Ok(vec![self.account])
    }

    async fn chain_id(&self) -> Result<u64> {
        self.inner.get_chain_id().await.map_err(rpc_err)
    }

    async fn get_balance(&self, owner: Address) -> Result<U256> {
        self.inner.get_balance(owner).await.map_err(rpc_err)
    }

    fn events(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    async fn watch_logs(&self, watch: LogWatch) -> Result<LogStream> {
        let poller = self
            .inner
            .watch_logs(&log_filter(watch))
            .await
            .map_err(rpc_err)?;

        Ok(poller
            .into_stream()
            .flat_map(futures::stream::iter)
            .map(|log| log.transaction_hash)
            .boxed())
    }

    fn erc20(&self, token: Address) -> Arc<dyn Erc20> {
        Arc::new(RpcErc20 {
            contract: IERC20::new(token, self.inner.clone()),
        })
    }

    fn router(&self, router: Address) -> Arc<dyn SwapRouter> {
        Arc::new(RpcRouter {
            contract: IUniswapV2Router02::new(router, self.inner.clone()),
        })
    }

    fn factory(&self, factory: Address) -> Arc<dyn PairFactory> {
        Arc::new(RpcFactory {
            contract: IUniswapV2Factory::new(factory, self.inner.clone()),
        })
    }
}

struct RpcErc20 {
    contract: IERC20::IERC20Instance<DynProvider>,
}

#[async_trait]
impl Erc20 for RpcErc20 {
    async fn balance_of(&self, owner: Address) -> Result<U256> {
        self.contract
            .balanceOf(owner)
            .call()
            .await
            .map_err(contract_err)
    }

    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256> {
        self.contract
            .allowance(owner, spender)
            .call()
            .await
            .map_err(contract_err)
    }

    async fn approve(&self, spender: Address, amount: U256) -> Result<PendingTx> {
        let pending = self
            .contract
            .approve(spender, amount)
            .send()
            .await
            .map_err(|e| Error::Approval(e.to_string()))?;
        Ok(into_pending(pending))
    }
}

struct RpcRouter {
    contract: IUniswapV2Router02::IUniswapV2Router02Instance<DynProvider>,
}

#[async_trait]
impl SwapRouter for RpcRouter {
    async fn weth(&self) -> Result<Address> {
        self.contract.WETH().call().await.map_err(contract_err)
    }

    async fn factory(&self) -> Result<Address> {
        self.contract.factory().call().await.map_err(contract_err)
    }

    async fn get_amounts_out(&self, amount_in: U256, path: Vec<Address>) -> Result<Vec<U256>> {
        self.contract
            .getAmountsOut(amount_in, path)
            .call()
            .await
            .map_err(contract_err)
    }

    async fn swap_exact_tokens_for_eth(
        &self,
        amount_in: U256,
        amount_out_min: U256,
        path: Vec<Address>,
        to: Address,
        deadline: U256,
    ) -> Result<PendingTx> {
        let pending = self
            .contract
            .swapExactTokensForETH(amount_in, amount_out_min, path, to, deadline)
            .send()
            .await
            .map_err(|e| Error::Transaction(e.to_string()))?;
        Ok(into_pending(pending))
    }
}

struct RpcFactory {
    contract: IUniswapV2Factory::IUniswapV2FactoryInstance<DynProvider>,
}

#[async_trait]
impl PairFactory for RpcFactory {
    async fn get_pair(&self, token_a: Address, token_b: Address) -> Result<Address> {
        self.contract
            .getPair(token_a, token_b)
            .call()
            .await
            .map_err(contract_err)
    }
}

/// Connector for a private key supplied through the environment
pub struct KeyConnector {
    rpc_url: String,
    key_var: String,
    poll_interval: Duration,
}

impl KeyConnector {
    pub fn new(rpc_url: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            key_var: env_vars::PRIVATE_KEY.to_string(),
            poll_interval,
        }
    }

    /// Read the key from another variable
    pub fn with_key_var(mut self, key_var: impl Into<String>) -> Self {
        self.key_var = key_var.into();
        self
    }

    async fn open(&self) -> Result<Option<Arc<dyn WalletProvider>>> {
        let Some(wallet) = SecureWallet::from_env(&self.key_var)? else {
            return Ok(None);
        };
        let provider = RpcWalletProvider::connect(&self.rpc_url, &wallet, self.poll_interval).await?;
        Ok(Some(Arc::new(provider)))
    }
}

#[async_trait]
impl Connector for KeyConnector {
    async fn connect(&self) -> Result<Arc<dyn WalletProvider>> {
        self.open().await?.ok_or_else(|| {
            Error::Wallet(format!(
                "{} is not set. Required to connect a wallet.",
                self.key_var
            ))
        })
    }

    async fn restore(&self) -> Option<Arc<dyn WalletProvider>> {
        match self.open().await {
            Ok(provider) => provider,
            Err(e) => {
                tracing::debug!(error = %e, "No wallet to restore");
                None
            }
        }
    }
}
