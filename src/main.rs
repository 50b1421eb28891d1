//! DAI/ETH swap CLI
//!
//! Command-line front end for the wallet session and swap managers.

use clap::{Parser, Subcommand};
use dai_swap::provider::KeyConnector;
use dai_swap::ui::{render_wallet_bar, SwapPanel};
use dai_swap::{
    Config, Error, Notification, NotificationKind, Notifier, Result, RpcConfig, SwapManager,
    WalletManager,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "dai-swap")]
#[command(about = "Swap DAI for ETH through the Uniswap V2 router")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a JSON config file (defaults to environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current configuration
    Config,

    /// Connect the wallet and show its balances
    Balances,

    /// Convert an amount at the current pool price
    Quote {
        /// DAI amount to price in ETH
        #[arg(long, conflicts_with = "eth", required_unless_present = "eth")]
        dai: Option<f64>,

        /// ETH amount to price in DAI
        #[arg(long)]
        eth: Option<f64>,
    },

    /// Swap DAI for ETH
    Swap {
        /// DAI amount to sell
        #[arg(long)]
        dai: f64,
    },

    /// Keep the session open and read panel commands from stdin
    Interactive,
}

/// Managers wired to the RPC wallet
struct App {
    config: Config,
    wallet: WalletManager,
    swap: SwapManager,
    notifications: mpsc::UnboundedReceiver<Notification>,
}

impl App {
    fn new(config: Config) -> Result<Self> {
        let rpc_config = RpcConfig::from_env();
        let rpc_url = rpc_config.get(config.expected_chain_id()).ok_or_else(|| {
            Error::Config(format!("No RPC URL configured for {}", config.network.name()))
        })?;

        let connector = KeyConnector::new(rpc_url, Duration::from_secs(config.network_poll_secs));
        let (notifier, notifications) = Notifier::channel();
        let wallet = WalletManager::new(&config, Arc::new(connector), notifier.clone());
        let swap = SwapManager::new(&config, wallet.subscribe(), notifier);

        Ok(Self {
            config,
            wallet,
            swap,
            notifications,
        })
    }

    /// Connect and bind the swap contracts to the session
    async fn connect(&mut self) -> Result<()> {
        let connected = self.wallet.connect().await.is_some();
        self.print_notifications();
        if !connected {
            return Err(Error::WalletNotConnected);
        }
        self.swap.handle_wallet_change(&self.wallet.state()).await;
        Ok(())
    }

    fn print_notifications(&mut self) {
        while let Ok(notification) = self.notifications.try_recv() {
            print_notification(&notification);
        }
    }
}

fn print_notification(notification: &Notification) {
    match notification.kind {
        NotificationKind::Success => println!("[ok] {}", notification.message),
        NotificationKind::Error => println!("[error] {}", notification.message),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    let (plain, json) = if cli.json_logs {
        (None, Some(fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (Some(fmt::layer().with_writer(std::io::stderr)), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .init();

    // Load config
    let config = match cli.config {
        Some(path) => Config::from_file(&path)?,
        None => Config::from_env()?,
    };

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Balances => {
            let mut app = App::new(config)?;
            app.connect().await?;
            println!(
                "{}",
                render_wallet_bar(&app.wallet.state(), app.config.display_digits)
            );
        }
        Commands::Quote { dai, eth } => {
            let mut app = App::new(config)?;
            app.connect().await?;
            run_quote(&app, dai, eth).await?;
        }
        Commands::Swap { dai } => {
            let mut app = App::new(config)?;
            app.connect().await?;
            let stage = app.swap.swap_dai_with_eth(dai).await;
            app.print_notifications();
            tracing::info!(stage = ?stage, "Swap finished");
        }
        Commands::Interactive => {
            let app = App::new(config)?;
            run_interactive(app).await;
        }
    }

    Ok(())
}

async fn run_quote(app: &App, dai: Option<f64>, eth: Option<f64>) -> Result<()> {
    let digits = app.config.display_digits;

    match (dai, eth) {
        (Some(dai), _) => {
            let eth = app.swap.get_eth_output(dai).await?;
            println!("{} DAI = {} ETH", dai, eth);
        }
        (None, Some(eth)) => {
            let dai = app.swap.get_dai_output(eth).await?;
            println!("{} ETH = {} DAI", eth, dai);
        }
        (None, None) => {
            return Err(Error::InvalidAmount(
                "either --dai or --eth is required".to_string(),
            ))
        }
    }

    let quote = app.swap.state().quote;
    if let Some(price) = quote.eth_price {
        println!("1 ETH = {} DAI", dai_swap::format::format_number_with(price, digits));
    }
    if let Some(price) = quote.dai_price {
        println!("1 DAI = {} ETH", dai_swap::format::format_number_with(price, digits));
    }
    Ok(())
}

const INTERACTIVE_HELP: &str =
    "Commands: dai <amount> | eth <amount> | max | swap | connect | show | quit";

async fn run_interactive(app: App) {
    let App {
        config,
        wallet,
        swap,
        mut notifications,
    } = app;

    let driver = swap.spawn();
    let printer = tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            print_notification(&notification);
        }
    });

    if wallet.restore().await.is_none() {
        wallet.connect().await;
    }

    let mut panel = SwapPanel::new(swap.clone(), wallet.subscribe(), config.display_digits);
    let mut prices = swap.subscribe();
    println!("{}", INTERACTIVE_HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut redraw = true;
    loop {
        if redraw {
            // Let the background tasks settle before drawing
            tokio::task::yield_now().await;
            panel.on_price_update().await;
            println!(
                "\n{}\n\n{}\n",
                render_wallet_bar(&wallet.state(), config.display_digits),
                panel.render()
            );
        }

        tokio::select! {
            changed = prices.changed() => {
                if changed.is_err() {
                    break;
                }
                redraw = panel.on_price_update().await;
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read stdin");
                        break;
                    }
                };
                if !run_command(&line, &mut panel, &wallet).await {
                    break;
                }
                redraw = true;
            }
        }
    }

    driver.abort();
    printer.abort();
    wallet.disconnect();
}

/// Apply one panel command; returns `false` on quit
async fn run_command(line: &str, panel: &mut SwapPanel, wallet: &WalletManager) -> bool {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("dai"), Some(amount)) => {
            if !panel.change_dai(amount).await {
                println!("Input rejected: {}", amount);
            }
        }
        (Some("eth"), Some(amount)) => {
            if !panel.change_eth(amount).await {
                println!("Input rejected: {}", amount);
            }
        }
        (Some("max"), _) => {
            panel.max().await;
        }
        (Some("swap"), _) => {
            let stage = panel.swap().await;
            tracing::info!(stage = ?stage, "Swap finished");
        }
        (Some("connect"), _) => {
            wallet.connect().await;
        }
        (Some("show"), _) | (None, _) => {}
        (Some("quit") | Some("exit"), _) => return false,
        _ => println!("{}", INTERACTIVE_HELP),
    }
    true
}
