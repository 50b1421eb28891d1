//! DAI/ETH swap client
//!
//! Connects a wallet, tracks its ETH and DAI balances and swaps DAI for ETH
//! through the Uniswap V2 Router02:
//! - [`wallet::WalletManager`] owns the wallet session and reacts to account,
//!   network and token-transfer events
//! - [`swap::SwapManager`] quotes both directions and runs approve-then-swap
//! - [`ui`] renders both for the terminal
//!
//! # Security Model
//!
//! - Private keys never leave the wallet module
//! - Every user-facing outcome goes through the notification channel

pub mod config;
pub mod contracts;
pub mod format;
pub mod messages;
pub mod notify;
pub mod provider;
pub mod swap;
pub mod tokens;
pub mod ui;
pub mod wallet;

mod error;

// Re-export commonly used types
pub use config::{Config, Network, RpcConfig};
pub use error::{Error, Result};
pub use notify::{Notification, NotificationKind, Notifier};
pub use swap::{Quote, SwapManager, SwapStage, SwapState};
pub use wallet::{WalletManager, WalletState};
