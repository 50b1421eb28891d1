//! User-facing notification texts

pub const ERROR_TRANSACTION_FAILED: &str = "Transaction Failed.";
pub const ERROR_WALLET_NOT_CONNECTED: &str = "Wallet is not connected. Please try again.";
pub const ERROR_WALLET_DISCONNECTED: &str = "Wallet is disconnected.";
pub const ERROR_CONNECT_WALLET: &str = "Failed to connect Wallet";
pub const ERROR_APPROVE_DAI: &str = "Can not approve DAI.";
pub const ERROR_INSUFFICIENT_AMOUNT_DAI: &str = "You don't have enough amount of DAI.";
pub const ERROR_ZERO_AMOUNT_DAI: &str = "You should input positive amount of DAI to swap.";
pub const ERROR_SWAP_IN_PROGRESS: &str = "A swap is already in progress.";

pub const MESSAGE_APPROVING_DAI: &str = "Approving DAI for the router.";
pub const MESSAGE_TRANSACTION_SUBMITTED: &str = "Transaction submitted.";
pub const MESSAGE_TRANSACTION_CONFIRMED: &str = "Transaction completed.";

pub const HINT_CONNECT_WALLET: &str = "Please connect wallet to use swap.";

pub fn switch_to_network(network_name: &str) -> String {
    format!("Please switch to {}.", network_name)
}
