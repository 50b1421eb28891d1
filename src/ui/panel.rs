//! Swap panel
//!
//! Holds the two amount fields. Editing one side asks the swap manager for
//! the matching amount on the other side.

use crate::format::format_number_with;
use crate::messages;
use crate::swap::{SwapManager, SwapStage};
use crate::wallet::WalletState;
use tokio::sync::watch;

pub const PANEL_TITLE: &str = "Swap DAI with ETH";

const EMPTY_AMOUNT: &str = "0.0";

pub struct SwapPanel {
    swap: SwapManager,
    wallet: watch::Receiver<WalletState>,
    dai_amount: String,
    eth_amount: String,
    /// DAI price the ETH field was last computed with
    dai_price: Option<f64>,
    digits: usize,
}

impl SwapPanel {
    pub fn new(swap: SwapManager, wallet: watch::Receiver<WalletState>, digits: usize) -> Self {
        Self {
            swap,
            wallet,
            dai_amount: EMPTY_AMOUNT.to_string(),
            eth_amount: EMPTY_AMOUNT.to_string(),
            dai_price: None,
            digits,
        }
    }

    pub fn dai_amount(&self) -> &str {
        &self.dai_amount
    }

    pub fn eth_amount(&self) -> &str {
        &self.eth_amount
    }

    /// Set the DAI field and recompute ETH
    ///
    /// Returns `false` if the input was rejected.
    pub async fn change_dai(&mut self, input: &str) -> bool {
        let Some(dai) = self.accept(input) else {
            return false;
        };
        self.dai_amount = input.trim().to_string();
        self.eth_amount = display_output(self.swap.get_eth_output(dai).await);
        true
    }

    /// Set the ETH field and recompute DAI
    pub async fn change_eth(&mut self, input: &str) -> bool {
        let Some(eth) = self.accept(input) else {
            return false;
        };
        self.eth_amount = input.trim().to_string();
        self.dai_amount = display_output(self.swap.get_dai_output(eth).await);
        true
    }

    /// Fill the DAI field with the whole DAI balance
    pub async fn max(&mut self) -> bool {
        let balance = self.wallet.borrow().dai_balance;
        match balance {
            Some(balance) => self.change_dai(&balance.to_string()).await,
            None => false,
        }
    }

    /// Recompute the ETH field if the DAI unit price moved
    ///
    /// Returns `true` if the field was recomputed.
    pub async fn on_price_update(&mut self) -> bool {
        let price = self.swap.state().quote.dai_price;
        if price.is_none() || price == self.dai_price {
            return false;
        }
        self.dai_price = price;

        let dai = self.dai_amount.clone();
        self.change_dai(&dai).await
    }

    /// Swap the amount in the DAI field
    pub async fn swap(&mut self) -> SwapStage {
        let dai = parse_amount(&self.dai_amount).unwrap_or_default();
        self.swap.swap_dai_with_eth(dai).await
    }

    pub fn render(&self) -> String {
        let wallet = self.wallet.borrow();
        let state = self.swap.state();
        let mut lines = vec![PANEL_TITLE.to_string(), String::new()];

        lines.push(format!("DAI  {}", self.dai_amount));
        if let Some(balance) = wallet.dai_balance {
            lines.push(format!(
                "     Balance: {} [Max]",
                format_number_with(balance, self.digits)
            ));
        }
        lines.push(format!("ETH  {}", self.eth_amount));
        if let Some(balance) = wallet.eth_balance {
            lines.push(format!(
                "     Balance: {}",
                format_number_with(balance, self.digits)
            ));
        }

        if let Some(price) = state.quote.eth_price {
            lines.push(format!(
                "1 ETH = {} DAI",
                format_number_with(price, self.digits)
            ));
        }

        let button = match (state.ready, state.stage.is_pending()) {
            (_, true) => "[ Swapping... ]",
            (true, false) => "[ Swap ]",
            (false, false) => "[ Swap ] (disabled)",
        };
        lines.push(button.to_string());
        if !state.ready {
            lines.push(messages::HINT_CONNECT_WALLET.to_string());
        }

        lines.join("\n")
    }

    fn accept(&self, input: &str) -> Option<f64> {
        if !self.swap.is_ready() {
            return None;
        }
        parse_amount(input)
    }
}

/// Parse a field value; blank counts as zero, negatives are rejected
fn parse_amount(input: &str) -> Option<f64> {
    let input = input.trim();
    if input.is_empty() {
        return Some(0.0);
    }
    input
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
}

fn display_output(output: crate::Result<f64>) -> String {
    match output {
        Ok(value) if value > 0.0 => value.to_string(),
        Ok(_) => EMPTY_AMOUNT.to_string(),
        Err(e) => {
            tracing::debug!(error = %e, "Quote unavailable");
            EMPTY_AMOUNT.to_string()
        }
    }
}
