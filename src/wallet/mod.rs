//! Wallet access and session management
//!
//! The private key lives only in [`SecureWallet`]; [`WalletManager`] owns the
//! connected session built on top of a provider.

mod session;
mod signer;

pub use session::{WalletManager, WalletState};
pub use signer::SecureWallet;
