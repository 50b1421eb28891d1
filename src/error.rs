//! Error types for the swap client

use crate::messages;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Wrong network: expected chain {expected}, wallet is on chain {actual}")]
    WrongNetwork { expected: u64, actual: u64 },

    #[error("Wallet disconnected")]
    WalletDisconnected,

    #[error("Wallet not connected")]
    WalletNotConnected,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Swap amount must be positive")]
    ZeroAmount,

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: f64, available: f64 },

    #[error("Approval failed: {0}")]
    Approval(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Contract call failed: {0}")]
    Contract(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Text shown to the user when this error ends an operation
    pub fn user_message(&self, network_name: &str) -> String {
        match self {
            Error::WrongNetwork { .. } => messages::switch_to_network(network_name),
            Error::WalletDisconnected => messages::ERROR_WALLET_DISCONNECTED.to_string(),
            Error::WalletNotConnected => messages::ERROR_WALLET_NOT_CONNECTED.to_string(),
            Error::ZeroAmount => messages::ERROR_ZERO_AMOUNT_DAI.to_string(),
            Error::InsufficientBalance { .. } => messages::ERROR_INSUFFICIENT_AMOUNT_DAI.to_string(),
            Error::Approval(_) => messages::ERROR_APPROVE_DAI.to_string(),
            Error::Transaction(reason) if !reason.is_empty() => reason.clone(),
            Error::Transaction(_) => messages::ERROR_TRANSACTION_FAILED.to_string(),
            Error::Wallet(reason) if !reason.is_empty() => reason.clone(),
            Error::Wallet(_) => messages::ERROR_CONNECT_WALLET.to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
