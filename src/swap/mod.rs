//! DAI to ETH swaps through the Uniswap V2 router
//!
//! [`SwapManager`] follows the wallet session. Once a session exists it
//! resolves the router, WETH and the DAI/WETH pair, keeps the unit prices
//! current by listening to `Swap` events on the pair, answers quotes in both
//! directions and runs the approve-then-swap sequence.

mod guard;

use guard::BusyGuard;

use crate::config::{Config, Network};
use crate::contracts::{amount_out, Erc20, SwapRouter, MAX_ALLOWANCE};
use crate::format::{number_to_wei, wei_to_number};
use crate::messages;
use crate::notify::Notifier;
use crate::provider::{LogWatch, WalletProvider};
use crate::wallet::WalletState;
use crate::{Error, Result};
use alloy::primitives::{Address, TxHash, U256};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Progress of the current swap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapStage {
    #[default]
    Idle,
    /// Waiting for the router allowance to be raised
    Approving,
    /// Swap sent, waiting for it to be mined
    Submitted,
    Confirmed,
    Failed,
}

impl SwapStage {
    /// A transaction of this swap is still outstanding
    pub fn is_pending(&self) -> bool {
        matches!(self, SwapStage::Approving | SwapStage::Submitted)
    }
}

/// Unit prices at the pair's current reserves
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Quote {
    /// DAI paid for one ETH
    pub eth_price: Option<f64>,
    /// ETH paid for one DAI
    pub dai_price: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SwapState {
    /// Router and pair are resolved for the current session
    pub ready: bool,
    pub quote: Quote,
    pub stage: SwapStage,
}

/// Contract handles bound to one wallet session
struct Contracts {
    provider: Arc<dyn WalletProvider>,
    owner: Address,
    chain_id: u64,
    dai: Arc<dyn Erc20>,
    router: Arc<dyn SwapRouter>,
    weth: Address,
}

struct Inner {
    network: Network,
    dai_address: Address,
    router_address: Address,
    deadline_secs: u64,
    wallet: watch::Receiver<WalletState>,
    notifier: Notifier,
    contracts: RwLock<Option<Arc<Contracts>>>,
    state: watch::Sender<SwapState>,
    updating: AtomicBool,
    swapping: AtomicBool,
    pair_watch: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct SwapManager {
    inner: Arc<Inner>,
}

impl SwapManager {
    pub fn new(config: &Config, wallet: watch::Receiver<WalletState>, notifier: Notifier) -> Self {
        let (state, _) = watch::channel(SwapState::default());
        Self {
            inner: Arc::new(Inner {
                network: config.network,
                dai_address: config.dai_address,
                router_address: config.router_address,
                deadline_secs: config.swap_deadline_secs,
                wallet,
                notifier,
                contracts: RwLock::new(None),
                state,
                updating: AtomicBool::new(false),
                swapping: AtomicBool::new(false),
                pair_watch: Mutex::new(None),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SwapState> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> SwapState {
        self.inner.state.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.state.borrow().ready
    }

    /// Follow the wallet session in a background task
    pub fn spawn(&self) -> JoinHandle<()> {
        let manager = self.clone();
        let mut wallet = self.inner.wallet.clone();
        tokio::spawn(async move {
            loop {
                let session = wallet.borrow_and_update().clone();
                manager.handle_wallet_change(&session).await;
                if wallet.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Bind contracts to a new session or drop them when the session ends
    pub async fn handle_wallet_change(&self, wallet: &WalletState) {
        let (Some(provider), Some(owner), Some(chain_id)) =
            (&wallet.provider, wallet.wallet_address, wallet.chain_id)
        else {
            self.reset();
            return;
        };

        if let Some(current) = self.contracts() {
            if Arc::ptr_eq(&current.provider, provider)
                && current.owner == owner
                && current.chain_id == chain_id
            {
                return;
            }
        }

        match self.resolve(provider.clone(), owner, chain_id).await {
            Ok((contracts, pair)) => {
                self.store_contracts(Some(Arc::new(contracts)));
                self.inner.state.send_modify(|state| state.ready = true);
                tracing::info!(
                    router = %self.inner.router_address,
                    pair = %pair,
                    "Swap contracts resolved"
                );
                self.watch_pair(provider.as_ref(), pair).await;
                self.update_unit_price().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not resolve swap contracts");
                self.reset();
            }
        }
    }

    /// ETH received for `dai_amount` DAI
    pub async fn get_eth_output(&self, dai_amount: f64) -> Result<f64> {
        self.quote_output(dai_amount, true).await
    }

    /// DAI received for `eth_amount` ETH
    pub async fn get_dai_output(&self, eth_amount: f64) -> Result<f64> {
        self.quote_output(eth_amount, false).await
    }

    async fn quote_output(&self, amount: f64, sell_dai: bool) -> Result<f64> {
        if amount == 0.0 {
            return Ok(0.0);
        }
        let amount_in = number_to_wei(amount)?;
        let contracts = self.contracts().ok_or(Error::WalletNotConnected)?;

        let path = if sell_dai {
            vec![self.inner.dai_address, contracts.weth]
        } else {
            vec![contracts.weth, self.inner.dai_address]
        };
        let amounts = contracts.router.get_amounts_out(amount_in, path).await?;
        Ok(wei_to_number(amount_out(&amounts)?))
    }

    /// Recompute both unit prices unless an update is already running
    pub async fn update_unit_price(&self) {
        if self.contracts().is_none() {
            return;
        }
        let Some(_busy) = BusyGuard::acquire(&self.inner.updating) else {
            tracing::debug!("Price update already running");
            return;
        };

        match tokio::try_join!(self.get_dai_output(1.0), self.get_eth_output(1.0)) {
            Ok((eth_price, dai_price)) => {
                self.inner.state.send_modify(|state| {
                    if state.ready {
                        state.quote = Quote {
                            eth_price: Some(eth_price),
                            dai_price: Some(dai_price),
                        };
                    }
                });
                tracing::debug!(eth_price = eth_price, dai_price = dai_price, "Unit prices updated");
            }
            Err(e) => tracing::warn!(error = %e, "Price update failed"),
        }
    }

    /// Swap `dai_amount` DAI for ETH
    ///
    /// Every outcome is reported through the notifier. Requests rejected
    /// before any transaction is sent return [`SwapStage::Idle`].
    pub async fn swap_dai_with_eth(&self, dai_amount: f64) -> SwapStage {
        let Some(contracts) = self.contracts() else {
            self.inner
                .notifier
                .notify_error(messages::ERROR_WALLET_NOT_CONNECTED);
            return SwapStage::Idle;
        };

        let amount = match self.amount_in(dai_amount) {
            Ok(amount) => amount,
            Err(e) => {
                tracing::info!(amount = dai_amount, reason = %e, "Swap rejected");
                self.notify_failure(&e);
                return SwapStage::Idle;
            }
        };

        let Some(_busy) = BusyGuard::acquire(&self.inner.swapping) else {
            self.inner
                .notifier
                .notify_error(messages::ERROR_SWAP_IN_PROGRESS);
            return SwapStage::Idle;
        };

        match self.execute(&contracts, amount).await {
            Ok(hash) => {
                tracing::info!(tx = %hash, amount = dai_amount, "Swap confirmed");
                self.set_stage(SwapStage::Confirmed);
                self.inner
                    .notifier
                    .notify_success(messages::MESSAGE_TRANSACTION_CONFIRMED);
                SwapStage::Confirmed
            }
            Err(e) => {
                tracing::warn!(error = %e, amount = dai_amount, "Swap failed");
                self.set_stage(SwapStage::Failed);
                self.notify_failure(&e);
                SwapStage::Failed
            }
        }
    }

    /// Base units to sell for `dai_amount`, checked against the exact balance
    ///
    /// The displayed balance is rounded, so a request equal to it (the Max
    /// button) sells the whole balance.
    fn amount_in(&self, dai_amount: f64) -> Result<U256> {
        if dai_amount.is_nan() || dai_amount <= 0.0 {
            return Err(Error::ZeroAmount);
        }
        let (shown, held) = {
            let wallet = self.inner.wallet.borrow();
            (wallet.dai_balance, wallet.dai_balance_wei.unwrap_or_default())
        };
        if shown == Some(dai_amount) {
            return Ok(held);
        }

        let requested = number_to_wei(dai_amount)?;
        if requested > held {
            return Err(Error::InsufficientBalance {
                requested: dai_amount,
                available: shown.unwrap_or_default(),
            });
        }
        Ok(requested)
    }

    async fn execute(&self, contracts: &Contracts, amount: U256) -> Result<TxHash> {
        let router = self.inner.router_address;

        let allowance = contracts
            .dai
            .allowance(contracts.owner, router)
            .await
            .map_err(into_approval)?;

        if allowance < amount {
            self.set_stage(SwapStage::Approving);
            self.inner
                .notifier
                .notify_success(messages::MESSAGE_APPROVING_DAI);

            let approval = contracts
                .dai
                .approve(router, MAX_ALLOWANCE)
                .await
                .map_err(into_approval)?;
            let hash = approval.confirmed().await.map_err(into_approval)?;
            tracing::info!(tx = %hash, spender = %router, "Router allowance raised");
        }

        let pending = contracts
            .router
            .swap_exact_tokens_for_eth(
                amount,
                U256::ZERO,
                vec![self.inner.dai_address, contracts.weth],
                contracts.owner,
                swap_deadline(Utc::now(), self.inner.deadline_secs),
            )
            .await?;

        tracing::info!(tx = %pending.hash(), amount = %amount, "Swap submitted");
        self.set_stage(SwapStage::Submitted);
        self.inner
            .notifier
            .notify_success(messages::MESSAGE_TRANSACTION_SUBMITTED);

        pending.confirmed().await
    }

    async fn resolve(
        &self,
        provider: Arc<dyn WalletProvider>,
        owner: Address,
        chain_id: u64,
    ) -> Result<(Contracts, Address)> {
        let router = provider.router(self.inner.router_address);
        let weth = router.weth().await?;
        let factory = router.factory().await?;
        let pair = provider
            .factory(factory)
            .get_pair(weth, self.inner.dai_address)
            .await?;

        let contracts = Contracts {
            dai: provider.erc20(self.inner.dai_address),
            provider,
            owner,
            chain_id,
            router,
            weth,
        };
        Ok((contracts, pair))
    }

    async fn watch_pair(&self, provider: &dyn WalletProvider, pair: Address) {
        let mut swaps = match provider.watch_logs(LogWatch::PairSwaps(pair)).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(pair = %pair, error = %e, "Pair swap watch unavailable");
                return;
            }
        };

        let inner = Arc::downgrade(&self.inner);
        let watch = tokio::spawn(async move {
            while let Some(tx) = swaps.next().await {
                let Some(inner) = Weak::upgrade(&inner) else { break };
                tracing::debug!(tx = ?tx, "Pair swap observed");
                SwapManager { inner }.update_unit_price().await;
            }
        });

        let previous = self
            .inner
            .pair_watch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(watch);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn reset(&self) {
        let watch = self
            .inner
            .pair_watch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(watch) = watch {
            watch.abort();
        }

        if self.contracts().is_some() {
            tracing::info!("Swap contracts released");
        }
        self.store_contracts(None);
        self.inner.state.send_modify(|state| {
            state.ready = false;
            state.quote = Quote::default();
        });
    }

    fn contracts(&self) -> Option<Arc<Contracts>> {
        self.inner
            .contracts
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn store_contracts(&self, contracts: Option<Arc<Contracts>>) {
        *self
            .inner
            .contracts
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = contracts;
    }

    fn set_stage(&self, stage: SwapStage) {
        self.inner.state.send_modify(|state| state.stage = stage);
    }

    fn notify_failure(&self, error: &Error) {
        self.inner
            .notifier
            .notify_error(error.user_message(self.inner.network.name()));
    }
}

fn into_approval(error: Error) -> Error {
    match error {
        Error::Approval(_) => error,
        other => Error::Approval(other.to_string()),
    }
}

/// Unix timestamp after which the router rejects the swap
fn swap_deadline(now: DateTime<Utc>, window_secs: u64) -> U256 {
    let now = u64::try_from(now.timestamp()).unwrap_or_default();
    U256::from(now.saturating_add(window_secs))
}
