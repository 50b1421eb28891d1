//! In-memory wallet provider for tests
//!
//! One shared [`MockState`] backs the provider, its connector and every
//! contract handle it binds, so tests can both script the chain and inspect
//! what the managers did to it.

use super::{Connector, LogStream, LogWatch, ProviderEvent, WalletProvider};
use crate::contracts::{Erc20, PairFactory, PendingTx, SwapRouter};
use crate::{Error, Result};
use alloy::primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, Notify};

pub(crate) const WETH: Address = Address::repeat_byte(0xee);
pub(crate) const FACTORY: Address = Address::repeat_byte(0xfa);
pub(crate) const PAIR: Address = Address::repeat_byte(0xab);

const ONE: u128 = 1_000_000_000_000_000_000;

pub(crate) fn wei(whole: u64) -> U256 {
    U256::from(whole) * U256::from(ONE)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SwapCall {
    pub amount_in: U256,
    pub amount_out_min: U256,
    pub path: Vec<Address>,
    pub to: Address,
    pub deadline: U256,
}

#[derive(Debug)]
pub(crate) struct MockState {
    pub accounts: Vec<Address>,
    pub chain_id: u64,
    pub eth_balances: HashMap<Address, U256>,
    /// Keyed by (token, owner)
    pub token_balances: HashMap<(Address, Address), U256>,
    pub allowance: U256,
    /// Pool price used by `get_amounts_out`
    pub dai_per_eth: u64,

    pub fail_balances: bool,
    pub fail_quotes: bool,
    pub fail_approve: bool,
    /// Error returned when the swap is sent
    pub swap_error: Option<String>,
    /// The swap is mined but reverts
    pub revert_swap: bool,
    /// Swap confirmations wait for [`MockProvider::release_swaps`]
    pub hold_swaps: bool,

    pub approvals: Vec<(Address, U256)>,
    pub swaps: Vec<SwapCall>,
    pub quote_calls: usize,
}

struct Shared {
    state: Mutex<MockState>,
    events: broadcast::Sender<ProviderEvent>,
    watchers: Mutex<HashMap<LogWatch, Vec<mpsc::UnboundedSender<Option<TxHash>>>>>,
    release: Notify,
}

impl Shared {
    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

#[derive(Clone)]
pub(crate) struct MockProvider {
    shared: Arc<Shared>,
}

impl MockProvider {
    pub fn new(chain_id: u64, account: Address) -> Self {
        let (events, _) = broadcast::channel(16);
        let state = MockState {
            accounts: vec![account],
            chain_id,
            eth_balances: HashMap::new(),
            token_balances: HashMap::new(),
            allowance: U256::ZERO,
            dai_per_eth: 2000,
            fail_balances: false,
            fail_quotes: false,
            fail_approve: false,
            swap_error: None,
            revert_swap: false,
            hold_swaps: false,
            approvals: Vec::new(),
            swaps: Vec::new(),
            quote_calls: 0,
        };
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                events,
                watchers: Mutex::new(HashMap::new()),
                release: Notify::new(),
            }),
        }
    }

    /// Script or inspect the chain
    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.shared.state())
    }

    pub fn set_eth_balance(&self, owner: Address, amount: U256) {
        self.with(|s| s.eth_balances.insert(owner, amount));
    }

    pub fn set_token_balance(&self, token: Address, owner: Address, amount: U256) {
        self.with(|s| s.token_balances.insert((token, owner), amount));
    }

    /// Push an account or network event to subscribers
    pub fn emit(&self, event: ProviderEvent) {
        let _ = self.shared.events.send(event);
    }

    /// Deliver a log to every stream watching `watch`
    pub fn emit_log(&self, watch: LogWatch) {
        let mut watchers = self.shared.watchers.lock().unwrap();
        if let Some(senders) = watchers.get_mut(&watch) {
            senders.retain(|tx| tx.send(Some(TxHash::repeat_byte(0x77))).is_ok());
        }
    }

    pub fn watcher_count(&self, watch: LogWatch) -> usize {
        let mut watchers = self.shared.watchers.lock().unwrap();
        watchers
            .get_mut(&watch)
            .map(|senders| {
                senders.retain(|tx| !tx.is_closed());
                senders.len()
            })
            .unwrap_or(0)
    }

    /// Let one held swap confirmation complete
    pub fn release_swaps(&self) {
        self.shared.release.notify_one();
    }

    pub fn handle(&self) -> Arc<dyn WalletProvider> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl WalletProvider for MockProvider {
    async fn list_accounts(&self) -> Result<Vec<Address>> {
        Ok(self.with(|s| s.accounts.clone()))
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.with(|s| s.chain_id))
    }

    async fn get_balance(&self, owner: Address) -> Result<U256> {
        self.with(|s| {
            if s.fail_balances {
                return Err(Error::Rpc("balance unavailable".to_string()));
            }
            Ok(s.eth_balances.get(&owner).copied().unwrap_or_default())
        })
    }

    fn events(&self) -> broadcast::Receiver<ProviderEvent> {
        self.shared.events.subscribe()
    }

    async fn watch_logs(&self, watch: LogWatch) -> Result<LogStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared
            .watchers
            .lock()
            .unwrap()
            .entry(watch)
            .or_default()
            .push(tx);

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|log| (log, rx))
        })
        .boxed())
    }

    fn erc20(&self, token: Address) -> Arc<dyn Erc20> {
        Arc::new(MockErc20 {
            shared: self.shared.clone(),
            token,
        })
    }

    fn router(&self, _router: Address) -> Arc<dyn SwapRouter> {
        Arc::new(MockRouter {
            shared: self.shared.clone(),
        })
    }

    fn factory(&self, _factory: Address) -> Arc<dyn PairFactory> {
        Arc::new(MockFactory)
    }
}

struct MockErc20 {
    shared: Arc<Shared>,
    token: Address,
}

#[async_trait]
impl Erc20 for MockErc20 {
    async fn balance_of(&self, owner: Address) -> Result<U256> {
        let state = self.shared.state();
        if state.fail_balances {
            return Err(Error::Contract("balanceOf reverted".to_string()));
        }
        Ok(state
            .token_balances
            .get(&(self.token, owner))
            .copied()
            .unwrap_or_default())
    }

    async fn allowance(&self, _owner: Address, _spender: Address) -> Result<U256> {
        Ok(self.shared.state().allowance)
    }

    async fn approve(&self, spender: Address, amount: U256) -> Result<PendingTx> {
        let mut state = self.shared.state();
        state.approvals.push((spender, amount));
        if state.fail_approve {
            return Err(Error::Approval("user rejected".to_string()));
        }
        state.allowance = amount;
        Ok(PendingTx::new(TxHash::repeat_byte(0xa1), async { Ok(()) }.boxed()))
    }
}

struct MockRouter {
    shared: Arc<Shared>,
}

#[async_trait]
impl SwapRouter for MockRouter {
    async fn weth(&self) -> Result<Address> {
        Ok(WETH)
    }

    async fn factory(&self) -> Result<Address> {
        Ok(FACTORY)
    }

    async fn get_amounts_out(&self, amount_in: U256, path: Vec<Address>) -> Result<Vec<U256>> {
        let mut state = self.shared.state();
        state.quote_calls += 1;
        if state.fail_quotes {
            return Err(Error::Contract("getAmountsOut reverted".to_string()));
        }
        let price = U256::from(state.dai_per_eth);
        let out = if path.first() == Some(&WETH) {
            amount_in * price
        } else {
            amount_in / price
        };
        Ok(vec![amount_in, out])
    }

    async fn swap_exact_tokens_for_eth(
        &self,
        amount_in: U256,
        amount_out_min: U256,
        path: Vec<Address>,
        to: Address,
        deadline: U256,
    ) -> Result<PendingTx> {
        let (hold, revert) = {
            let mut state = self.shared.state();
            state.swaps.push(SwapCall {
                amount_in,
                amount_out_min,
                path,
                to,
                deadline,
            });
            if let Some(message) = state.swap_error.clone() {
                return Err(Error::Transaction(message));
            }
            (state.hold_swaps, state.revert_swap)
        };

        let shared = self.shared.clone();
        let confirmation = async move {
            if hold {
                shared.release.notified().await;
            }
            if revert {
                Err(Error::Transaction(String::new()))
            } else {
                Ok(())
            }
        };
        Ok(PendingTx::new(TxHash::repeat_byte(0x5a), confirmation.boxed()))
    }
}

struct MockFactory;

#[async_trait]
impl PairFactory for MockFactory {
    async fn get_pair(&self, _token_a: Address, _token_b: Address) -> Result<Address> {
        Ok(PAIR)
    }
}

/// Connector handing out one [`MockProvider`]
pub(crate) struct MockConnector {
    provider: MockProvider,
    /// Error returned by `connect`
    pub connect_error: Option<String>,
    /// Whether `restore` finds an existing permission
    pub authorized: bool,
}

impl MockConnector {
    pub fn new(provider: MockProvider) -> Self {
        Self {
            provider,
            connect_error: None,
            authorized: true,
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Arc<dyn WalletProvider>> {
        match &self.connect_error {
            Some(message) => Err(Error::Wallet(message.clone())),
            None => Ok(self.provider.handle()),
        }
    }

    async fn restore(&self) -> Option<Arc<dyn WalletProvider>> {
        self.authorized.then(|| self.provider.handle())
    }
}
