//! Terminal rendering of the wallet bar and the swap panel

mod connect;
mod panel;

pub use connect::render_wallet_bar;
pub use panel::SwapPanel;
