use crate::format::{format_number_with, shorten_wallet_address};
use crate::wallet::WalletState;

pub const CONNECT_WALLET_LABEL: &str = "Connect Wallet";

/// One-line summary of the wallet session
///
/// Without a provider only the connect prompt is shown. A balance that has
/// not been read yet is left out; a zero balance is shown.
pub fn render_wallet_bar(state: &WalletState, digits: usize) -> String {
    if state.provider.is_none() {
        return CONNECT_WALLET_LABEL.to_string();
    }

    let mut chips = Vec::with_capacity(3);
    if let Some(eth) = state.eth_balance {
        chips.push(format!("{} ETH", format_number_with(eth, digits)));
    }
    if let Some(dai) = state.dai_balance {
        chips.push(format!("{} DAI", format_number_with(dai, digits)));
    }
    let address = state
        .wallet_address
        .map(|address| address.to_checksum(None))
        .unwrap_or_default();
    chips.push(shorten_wallet_address(&address));

    chips.join(" | ")
}
