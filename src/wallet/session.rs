//! Wallet session lifecycle
//!
//! [`WalletManager`] owns the session: it connects or silently restores a
//! provider, validates its network, keeps the balances of the connected
//! account current and tears the session down when the provider reports a
//! disconnect or a foreign network. Consumers observe the session through a
//! `watch` channel.

use crate::config::{Config, Network};
use crate::format::wei_to_number;
use crate::messages;
use crate::notify::Notifier;
use crate::provider::{Connector, LogStream, LogWatch, ProviderEvent, WalletProvider};
use crate::{Error, Result};
use alloy::primitives::{Address, U256};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Snapshot of the wallet session
#[derive(Clone, Default)]
pub struct WalletState {
    pub provider: Option<Arc<dyn WalletProvider>>,
    pub wallet_address: Option<Address>,
    pub chain_id: Option<u64>,
    pub eth_balance: Option<f64>,
    pub dai_balance: Option<f64>,
    /// Exact DAI balance in base units
    pub dai_balance_wei: Option<U256>,
}

impl WalletState {
    /// A provider is attached and an account is selected
    pub fn is_ready(&self) -> bool {
        self.provider.is_some() && self.wallet_address.is_some()
    }
}

impl std::fmt::Debug for WalletState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletState")
            .field("provider", &self.provider.as_ref().map(|_| "connected"))
            .field("wallet_address", &self.wallet_address)
            .field("chain_id", &self.chain_id)
            .field("eth_balance", &self.eth_balance)
            .field("dai_balance", &self.dai_balance)
            .field("dai_balance_wei", &self.dai_balance_wei)
            .finish()
    }
}

struct Inner {
    connector: Arc<dyn Connector>,
    network: Network,
    dai_address: Address,
    notifier: Notifier,
    state: watch::Sender<WalletState>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// Owner of the wallet session
#[derive(Clone)]
pub struct WalletManager {
    inner: Arc<Inner>,
}

impl WalletManager {
    pub fn new(config: &Config, connector: Arc<dyn Connector>, notifier: Notifier) -> Self {
        let (state, _) = watch::channel(WalletState::default());
        Self {
            inner: Arc::new(Inner {
                connector,
                network: config.network,
                dai_address: config.dai_address,
                notifier,
                state,
                listener: Mutex::new(None),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<WalletState> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> WalletState {
        self.inner.state.borrow().clone()
    }

    pub fn network(&self) -> Network {
        self.inner.network
    }

    /// Run the wallet selection flow and open a session on the result
    ///
    /// Failures are notified; the caller only learns whether a provider was
    /// obtained.
    pub async fn connect(&self) -> Option<Arc<dyn WalletProvider>> {
        let provider = match self.inner.connector.connect().await {
            Ok(provider) => provider,
            Err(e) => {
                tracing::warn!(error = %e, "Wallet connection failed");
                self.notify_failure(&e);
                return None;
            }
        };

        match self.open_session(provider.clone()).await {
            Ok(Some(_)) => Some(provider),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Wallet session rejected");
                self.notify_failure(&e);
                None
            }
        }
    }

    /// Reopen a session without user interaction if the wallet already
    /// granted access. Failures are only logged.
    pub async fn restore(&self) -> Option<Arc<dyn WalletProvider>> {
        let provider = self.inner.connector.restore().await?;

        match self.open_session(provider.clone()).await {
            Ok(Some(_)) => Some(provider),
            Ok(None) => None,
            Err(e) => {
                tracing::info!(error = %e, "Wallet session not restored");
                None
            }
        }
    }

    /// Re-read both balances of the connected account
    ///
    /// On failure the last published balances stay in place.
    pub async fn refresh_balances(&self) -> Result<()> {
        let (provider, address) = {
            let state = self.inner.state.borrow();
            match (&state.provider, state.wallet_address) {
                (Some(provider), Some(address)) => (provider.clone(), address),
                _ => return Err(Error::WalletNotConnected),
            }
        };

        let (eth, dai) = self.read_balances(provider.as_ref(), address).await?;

        self.inner.state.send_modify(|state| {
            // The account may have switched while the balances were read
            if state.wallet_address == Some(address) {
                state.eth_balance = Some(wei_to_number(eth));
                state.dai_balance = Some(wei_to_number(dai));
                state.dai_balance_wei = Some(dai);
            }
        });
        tracing::debug!(address = %address, eth = %eth, dai = %dai, "Balances refreshed");
        Ok(())
    }

    /// React to an account or network change reported by the provider
    pub async fn handle_event(&self, event: ProviderEvent) {
        tracing::debug!(event = ?event, "Provider event");

        match event {
            ProviderEvent::AccountsChanged(accounts) => match accounts.first() {
                None => {
                    self.inner
                        .notifier
                        .notify_error(messages::ERROR_WALLET_DISCONNECTED);
                    self.disconnect();
                }
                Some(&address) => self.switch_account(address).await,
            },
            ProviderEvent::ChainChanged(chain_id) => {
                if chain_id == self.inner.network.chain_id() {
                    return;
                }
                self.notify_failure(&Error::WrongNetwork {
                    expected: self.inner.network.chain_id(),
                    actual: chain_id,
                });
                self.disconnect();
            }
        }
    }

    /// Close the session and stop listening to the provider
    pub fn disconnect(&self) {
        if let Some(listener) = self.take_listener() {
            listener.abort();
        }
        let previous = self.inner.state.send_replace(WalletState::default());
        if previous.is_ready() {
            tracing::info!(address = ?previous.wallet_address, "Wallet session closed");
        }
    }

    async fn switch_account(&self, address: Address) {
        let (provider, chain_id) = {
            let state = self.inner.state.borrow();
            match (&state.provider, state.chain_id) {
                (Some(provider), Some(chain_id)) => (provider.clone(), chain_id),
                _ => return,
            }
        };

        let current = self.inner.state.borrow().wallet_address;
        if current == Some(address) {
            if let Err(e) = self.refresh_balances().await {
                tracing::warn!(error = %e, "Balance refresh failed");
            }
            return;
        }

        match self.read_balances(provider.as_ref(), address).await {
            Ok((eth, dai)) => {
                tracing::info!(address = %address, "Wallet account switched");
                self.publish(provider, address, chain_id, eth, dai).await;
            }
            Err(e) => {
                tracing::warn!(address = %address, error = %e, "Switched account unavailable");
                self.notify_failure(&e);
                self.disconnect();
            }
        }
    }

    /// Validate the provider and publish its session
    ///
    /// Returns `Ok(None)` when the wallet exposes no account.
    async fn open_session(&self, provider: Arc<dyn WalletProvider>) -> Result<Option<Address>> {
        let accounts = provider.list_accounts().await?;
        let Some(&address) = accounts.first() else {
            tracing::debug!("Wallet exposes no account");
            return Ok(None);
        };

        let chain_id = provider.chain_id().await?;
        let expected = self.inner.network.chain_id();
        if chain_id != expected {
            return Err(Error::WrongNetwork {
                expected,
                actual: chain_id,
            });
        }

        let (eth, dai) = self.read_balances(provider.as_ref(), address).await?;
        self.publish(provider, address, chain_id, eth, dai).await;

        tracing::info!(
            address = %address,
            chain_id = chain_id,
            network = self.inner.network.name(),
            "Wallet session established"
        );
        Ok(Some(address))
    }

    async fn read_balances(
        &self,
        provider: &dyn WalletProvider,
        address: Address,
    ) -> Result<(U256, U256)> {
        let dai = provider.erc20(self.inner.dai_address);
        tokio::try_join!(provider.get_balance(address), dai.balance_of(address))
    }

    async fn publish(
        &self,
        provider: Arc<dyn WalletProvider>,
        address: Address,
        chain_id: u64,
        eth_balance: U256,
        dai_balance: U256,
    ) {
        let events = provider.events();
        let transfers = transfer_stream(provider.as_ref(), address).await;

        self.inner.state.send_replace(WalletState {
            provider: Some(provider),
            wallet_address: Some(address),
            chain_id: Some(chain_id),
            eth_balance: Some(wei_to_number(eth_balance)),
            dai_balance: Some(wei_to_number(dai_balance)),
            dai_balance_wei: Some(dai_balance),
        });

        let listener = tokio::spawn(listen(Arc::downgrade(&self.inner), events, transfers));
        // May abort the task running this call; nothing follows it
        if let Some(previous) = self.replace_listener(listener) {
            previous.abort();
        }
    }

    fn notify_failure(&self, error: &Error) {
        self.inner
            .notifier
            .notify_error(error.user_message(self.inner.network.name()));
    }

    fn take_listener(&self) -> Option<JoinHandle<()>> {
        self.inner
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    fn replace_listener(&self, listener: JoinHandle<()>) -> Option<JoinHandle<()>> {
        self.inner
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(listener)
    }
}

/// Transfers of any token to or from `address`
async fn transfer_stream(provider: &dyn WalletProvider, address: Address) -> LogStream {
    let incoming = provider.watch_logs(LogWatch::TransfersTo(address)).await;
    let outgoing = provider.watch_logs(LogWatch::TransfersFrom(address)).await;

    match (incoming, outgoing) {
        (Ok(incoming), Ok(outgoing)) => futures::stream::select(incoming, outgoing).boxed(),
        (Ok(stream), Err(e)) | (Err(e), Ok(stream)) => {
            tracing::warn!(error = %e, "Transfer watch partially unavailable");
            stream
        }
        (Err(e), Err(_)) => {
            tracing::warn!(error = %e, "Transfer watch unavailable");
            futures::stream::pending().boxed()
        }
    }
}

fn listen(
    inner: Weak<Inner>,
    mut events: broadcast::Receiver<ProviderEvent>,
    mut transfers: LogStream,
) -> BoxFuture<'static, ()> {
    async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => {
                        let Some(inner) = inner.upgrade() else { break };
                        WalletManager { inner }.handle_event(event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped = skipped, "Provider events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                Some(tx) = transfers.next() => {
                    let Some(inner) = inner.upgrade() else { break };
                    tracing::debug!(tx = ?tx, "Token transfer observed");
                    if let Err(e) = (WalletManager { inner }).refresh_balances().await {
                        tracing::warn!(error = %e, "Balance refresh failed");
                    }
                }
            }
        }
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{Notification, NotificationKind};
    use crate::provider::mock::{wei, MockConnector, MockProvider};
    use alloy::primitives::address;
    use std::time::Duration;
    use tokio::sync::mpsc;

    const ALICE: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");
    const BOB: Address = address!("70997970c51812dc3a010c7d01b50e0d17dc79c8");

    struct Fixture {
        chain: MockProvider,
        manager: WalletManager,
        notifications: mpsc::UnboundedReceiver<Notification>,
    }

    fn fixture_with(connector: impl FnOnce(MockProvider) -> MockConnector) -> Fixture {
        let config = Config::for_network(Network::Mainnet);
        let chain = MockProvider::new(Network::Mainnet.chain_id(), ALICE);
        chain.set_eth_balance(ALICE, wei(2));
        chain.set_token_balance(config.dai_address, ALICE, wei(150));

        let (notifier, notifications) = Notifier::channel();
        let manager = WalletManager::new(&config, Arc::new(connector(chain.clone())), notifier);
        Fixture {
            chain,
            manager,
            notifications,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MockConnector::new)
    }

    async fn wait_for(
        rx: &mut watch::Receiver<WalletState>,
        predicate: impl FnMut(&WalletState) -> bool,
    ) -> WalletState {
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(predicate))
            .await
            .expect("state change timed out")
            .expect("manager dropped")
            .clone()
    }

    #[tokio::test]
    async fn test_connect_opens_session_with_balances() {
        let mut f = fixture();

        assert!(f.manager.connect().await.is_some());

        let state = f.manager.state();
        assert!(state.is_ready());
        assert_eq!(state.wallet_address, Some(ALICE));
        assert_eq!(state.chain_id, Some(1));
        assert_eq!(state.eth_balance, Some(2.0));
        assert_eq!(state.dai_balance, Some(150.0));
        assert!(f.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_on_wrong_network_notifies_and_aborts() {
        let mut f = fixture();
        f.chain.with(|s| s.chain_id = 5);

        assert!(f.manager.connect().await.is_none());

        let state = f.manager.state();
        assert!(!state.is_ready());
        assert_eq!(state.eth_balance, None);
        let note = f.notifications.try_recv().unwrap();
        assert_eq!(note.kind, NotificationKind::Error);
        assert_eq!(note.message, "Please switch to Ethereum Mainnet.");
    }

    #[tokio::test]
    async fn test_connect_without_accounts_does_nothing() {
        let mut f = fixture();
        f.chain.with(|s| s.accounts.clear());

        assert!(f.manager.connect().await.is_none());
        assert!(!f.manager.state().is_ready());
        assert!(f.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connector_failure_is_notified() {
        let mut f = fixture_with(|chain| {
            let mut connector = MockConnector::new(chain);
            connector.connect_error = Some("User closed modal".to_string());
            connector
        });

        assert!(f.manager.connect().await.is_none());
        assert_eq!(
            f.notifications.try_recv().unwrap().message,
            "User closed modal"
        );
    }

    #[tokio::test]
    async fn test_connect_fails_when_initial_balances_unreadable() {
        let mut f = fixture();
        f.chain.with(|s| s.fail_balances = true);

        assert!(f.manager.connect().await.is_none());
        assert!(!f.manager.state().is_ready());
        assert_eq!(
            f.notifications.try_recv().unwrap().kind,
            NotificationKind::Error
        );
    }

    #[tokio::test]
    async fn test_restore_is_silent() {
        let mut f = fixture_with(|chain| {
            let mut connector = MockConnector::new(chain);
            connector.authorized = false;
            connector
        });
        assert!(f.manager.restore().await.is_none());

        let mut f2 = fixture();
        f2.chain.with(|s| s.chain_id = 3);
        assert!(f2.manager.restore().await.is_none());

        assert!(f.notifications.try_recv().is_err());
        assert!(f2.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_restore_with_permission_opens_session() {
        let f = fixture();
        assert!(f.manager.restore().await.is_some());
        assert_eq!(f.manager.state().wallet_address, Some(ALICE));
    }

    #[tokio::test]
    async fn test_disconnecting_all_accounts_clears_session() {
        let mut f = fixture();
        f.manager.connect().await;
        let mut rx = f.manager.subscribe();

        f.chain.emit(ProviderEvent::AccountsChanged(vec![]));

        let state = wait_for(&mut rx, |s| s.provider.is_none()).await;
        assert_eq!(state.wallet_address, None);
        assert_eq!(state.chain_id, None);
        assert_eq!(state.eth_balance, None);
        assert_eq!(state.dai_balance, None);
        assert_eq!(
            f.notifications.recv().await.unwrap().message,
            "Wallet is disconnected."
        );
    }

    #[tokio::test]
    async fn test_foreign_network_tears_down_session() {
        let mut f = fixture();
        f.manager.connect().await;
        let mut rx = f.manager.subscribe();

        f.chain.emit(ProviderEvent::ChainChanged(3));

        wait_for(&mut rx, |s| !s.is_ready()).await;
        assert_eq!(
            f.notifications.recv().await.unwrap().message,
            "Please switch to Ethereum Mainnet."
        );
    }

    #[tokio::test]
    async fn test_expected_network_event_is_ignored() {
        let mut f = fixture();
        let config = Config::for_network(Network::Mainnet);
        f.manager.connect().await;
        let mut rx = f.manager.subscribe();

        f.chain.emit(ProviderEvent::ChainChanged(1));
        // A later transfer proves the chain event was already processed
        f.chain.set_token_balance(config.dai_address, ALICE, wei(10));
        f.chain.emit_log(LogWatch::TransfersFrom(ALICE));

        let state = wait_for(&mut rx, |s| s.dai_balance == Some(10.0)).await;
        assert!(state.is_ready());
        assert!(f.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_account_switch_reads_new_balances() {
        let f = fixture();
        let config = Config::for_network(Network::Mainnet);
        f.chain.set_eth_balance(BOB, wei(7));
        f.chain.set_token_balance(config.dai_address, BOB, wei(3));
        f.manager.connect().await;
        let mut rx = f.manager.subscribe();

        f.chain.emit(ProviderEvent::AccountsChanged(vec![BOB]));

        let state = wait_for(&mut rx, |s| s.wallet_address == Some(BOB)).await;
        assert_eq!(state.eth_balance, Some(7.0));
        assert_eq!(state.dai_balance, Some(3.0));
        assert!(state.is_ready());
    }

    #[tokio::test]
    async fn test_unreadable_switched_account_closes_session() {
        let mut f = fixture();
        f.manager.connect().await;
        let mut rx = f.manager.subscribe();

        f.chain.with(|s| s.fail_balances = true);
        f.chain.emit(ProviderEvent::AccountsChanged(vec![BOB]));

        let state = wait_for(&mut rx, |s| s.provider.is_none()).await;
        assert_eq!(state.wallet_address, None);
        assert_eq!(state.dai_balance_wei, None);
        assert_eq!(
            f.notifications.recv().await.unwrap().kind,
            NotificationKind::Error
        );
        assert!(matches!(
            f.manager.refresh_balances().await,
            Err(Error::WalletNotConnected)
        ));
    }

    #[tokio::test]
    async fn test_incoming_transfer_refreshes_balances() {
        let f = fixture();
        let config = Config::for_network(Network::Mainnet);
        f.manager.connect().await;
        let mut rx = f.manager.subscribe();

        f.chain.set_token_balance(config.dai_address, ALICE, wei(200));
        f.chain.emit_log(LogWatch::TransfersTo(ALICE));

        let state = wait_for(&mut rx, |s| s.dai_balance == Some(200.0)).await;
        assert_eq!(state.eth_balance, Some(2.0));
        assert_eq!(state.dai_balance_wei, Some(wei(200)));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_last_balances() {
        let f = fixture();
        f.manager.connect().await;
        f.chain.with(|s| s.fail_balances = true);

        assert!(f.manager.refresh_balances().await.is_err());
        assert_eq!(f.manager.state().dai_balance, Some(150.0));
        assert_eq!(f.manager.state().dai_balance_wei, Some(wei(150)));
    }

    #[tokio::test]
    async fn test_disconnect_stops_transfer_watch() {
        let f = fixture();
        f.manager.connect().await;
        assert_eq!(f.chain.watcher_count(LogWatch::TransfersTo(ALICE)), 1);

        f.manager.disconnect();
        for _ in 0..10 {
            if f.chain.watcher_count(LogWatch::TransfersTo(ALICE)) == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(f.chain.watcher_count(LogWatch::TransfersTo(ALICE)), 0);
        assert!(matches!(
            f.manager.refresh_balances().await,
            Err(Error::WalletNotConnected)
        ));
    }
}
