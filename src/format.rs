//! Display helpers for token amounts and addresses

use crate::{Error, Result};
use alloy::primitives::utils::{format_ether, parse_ether};
use alloy::primitives::U256;

/// Decimal digits shown for balances and prices
pub const DISPLAY_DIGITS: usize = 4;

/// Fractional digits of an 18-decimal token
const ETHER_DECIMALS: usize = 18;

/// Shorten an address to `0x1234...abcd`; short or empty input is returned as-is
pub fn shorten_wallet_address(address: &str) -> String {
    if address.is_empty() {
        return String::new();
    }

    let chars: Vec<char> = address.chars().collect();
    if chars.len() < 12 {
        return address.to_string();
    }

    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Format a number with the default display precision
pub fn format_number(value: f64) -> String {
    format_number_with(value, DISPLAY_DIGITS)
}

pub fn format_number_with(value: f64, digits: usize) -> String {
    format!("{:.*}", digits, value)
}

/// Convert an 18-decimal base-unit amount to a display number
pub fn wei_to_number(wei: U256) -> f64 {
    format_ether(wei).parse().unwrap_or_default()
}

/// Convert a display number to 18-decimal base units
///
/// Digits beyond the 18th fractional place are truncated.
pub fn number_to_wei(amount: f64) -> Result<U256> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(Error::InvalidAmount(amount.to_string()));
    }

    let mut text = amount.to_string();
    if let Some(dot) = text.find('.') {
        text.truncate((dot + 1 + ETHER_DECIMALS).min(text.len()));
    }

    parse_ether(&text).map_err(|e| Error::InvalidAmount(format!("{}: {}", text, e)))
}
