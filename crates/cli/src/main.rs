use anyhow::Result;
use clap::{Parser, Subcommand};
use mthub_client::{
    AccountDataLoader, DashboardSnapshot, LoadOutcome, LoaderConfig, LoaderEvent, RestClient,
    RestConfig, SessionGuard, SessionStore,
};
use mthub_core::{AccountApi, LoginRequest, NetDirection, Side};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "mthub")]
#[command(about = "MetaTrader account dashboard — view balance, positions, and trade history")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Backend API base URL
    #[arg(long, env = "MTHUB_API_URL", default_value = "http://127.0.0.1:8080")]
    api_url: String,

    /// Path to the session file (defaults to ~/.mthub/session.json)
    #[arg(long, env = "MTHUB_SESSION_FILE")]
    session_file: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "10")]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in to a MetaTrader account and store the session
    Login {
        /// Account number (cabinet)
        #[arg(short, long)]
        account_number: String,

        /// MetaTrader server name (e.g. "MetaQuotes-Demo", "Exness-Real")
        #[arg(short, long)]
        server: String,

        /// Account password
        #[arg(short, long, env = "MTHUB_PASSWORD")]
        password: String,
    },

    /// Show the account dashboard
    Dashboard {
        /// Keep the dashboard open and refresh it periodically
        #[arg(short, long)]
        watch: bool,

        /// Refresh interval in seconds (with --watch)
        #[arg(long, default_value = "5")]
        interval_secs: u64,
    },

    /// Drop the stored session
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    fmt().with_env_filter(filter).with_target(false).init();

    let session_file = match cli.session_file.clone() {
        Some(path) => path,
        None => default_session_file()?,
    };
    let guard = Arc::new(SessionGuard::new(SessionStore::new(session_file)));
    let rest = Arc::new(RestClient::new(RestConfig {
        base_url: cli.api_url.clone(),
        timeout_secs: cli.timeout_secs,
    })?);

    match cli.command {
        Commands::Login {
            account_number,
            server,
            password,
        } => login(rest, guard, account_number, server, password).await?,
        Commands::Dashboard {
            watch,
            interval_secs,
        } => dashboard(rest, guard, watch, interval_secs).await?,
        Commands::Logout => {
            guard.clear().await;
            println!("Logged out.");
        }
    }

    Ok(())
}

fn default_session_file() -> Result<PathBuf> {
    let home = std::env::var_os("HOME")
        .ok_or_else(|| anyhow::anyhow!("HOME not set; pass --session-file"))?;
    Ok(PathBuf::from(home).join(".mthub").join("session.json"))
}

async fn login(
    rest: Arc<RestClient>,
    guard: Arc<SessionGuard>,
    account_number: String,
    server: String,
    password: String,
) -> Result<()> {
    let ok = rest
        .login(&LoginRequest {
            account_number: account_number.clone(),
            password,
            server: server.clone(),
        })
        .await?;

    guard.establish(ok.token, account_number, server).await?;

    let info = &ok.account_info;
    println!(
        "Logged in as {} ({}) on {} — balance {} {}",
        info.name, info.account_number, info.server, info.balance, info.currency
    );
    Ok(())
}

async fn dashboard(
    rest: Arc<RestClient>,
    guard: Arc<SessionGuard>,
    watch: bool,
    interval_secs: u64,
) -> Result<()> {
    // Mount-time session check: without a valid session there is nothing
    // to poll, send the user to the login entry point.
    if guard.require_authenticated().await.is_err() {
        anyhow::bail!("No active session. Run `mthub login` first.");
    }

    let loader = Arc::new(AccountDataLoader::new(
        rest,
        guard,
        LoaderConfig {
            refresh_interval: Duration::from_secs(interval_secs),
            ..Default::default()
        },
    ));
    let mut events = loader.subscribe().await;

    match loader.load(true).await {
        LoadOutcome::Updated => {}
        LoadOutcome::SessionExpired => {
            anyhow::bail!("Session expired. Run `mthub login` again.");
        }
        LoadOutcome::Failed(error) => {
            // No prior data to fall back on: a hard error with a retry hint.
            anyhow::bail!("Failed to load account data: {error}. Try again.");
        }
        LoadOutcome::Skipped => {}
    }

    if let Some(snapshot) = loader.snapshot().await {
        render(&snapshot);
    }

    if !watch {
        return Ok(());
    }

    Arc::clone(&loader).spawn_auto_refresh().await;
    println!("Refreshing every {interval_secs}s — press Ctrl-C to exit.\n");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(LoaderEvent::Updated { .. }) => {
                    if let Some(snapshot) = loader.snapshot().await {
                        render(&snapshot);
                    }
                }
                Some(LoaderEvent::FetchFailed { error, .. }) => {
                    tracing::warn!(%error, "Refresh failed, showing last known data");
                }
                Some(LoaderEvent::SessionExpired) => {
                    loader.shutdown().await;
                    anyhow::bail!("Session expired. Run `mthub login` again.");
                }
                None => break,
            },
        }
    }

    loader.shutdown().await;
    Ok(())
}

fn render(snapshot: &DashboardSnapshot) {
    let account = &snapshot.account;
    let currency = account.currency.as_str();
    let sep = "=".repeat(64);

    println!("{sep}");
    println!(
        "  ACCOUNT                         updated {}",
        snapshot.fetched_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("{sep}");
    println!("  Balance:       {}", money(account.balance, currency));
    println!(
        "  Equity:        {}  ({})",
        money(account.equity, currency),
        signed(account.profit, currency)
    );
    println!(
        "  Margin:        {}  (free: {})",
        money(account.margin, currency),
        money(account.free_margin, currency)
    );
    println!(
        "  Margin level:  {:.2}%  [{}]",
        account.margin_level,
        if account.margin_level_is_safe() {
            "SAFE"
        } else {
            "AT RISK"
        }
    );

    let summaries = snapshot.summaries();
    if !summaries.is_empty() {
        println!("\n  NET EXPOSURE BY SYMBOL");
        println!("  {}", "-".repeat(60));
        for summary in &summaries {
            let direction = match summary.net_type {
                NetDirection::Buy => "BUY ",
                NetDirection::Sell => "SELL",
                NetDirection::Neutral => "----",
            };
            println!(
                "  {:<10} {} {:>8.2} lots   {} ({} positions)",
                summary.symbol,
                direction,
                summary.net_volume,
                signed(summary.total_profit, currency),
                summary.position_count
            );
        }
    }

    if !snapshot.positions.is_empty() {
        println!("\n  OPEN POSITIONS");
        println!("  {}", "-".repeat(60));
        for position in &snapshot.positions {
            println!(
                "  #{:<10} {:<10} {} {:>6.2}  {} -> {}  {}",
                position.ticket,
                position.symbol,
                side_label(position.side),
                position.volume,
                position.open_price,
                position.current_price,
                signed(position.profit, currency)
            );
        }
    }

    if !snapshot.history.is_empty() {
        println!("\n  CLOSED TRADES (LAST 7 DAYS)");
        println!("  {}", "-".repeat(60));
        for trade in &snapshot.history {
            println!(
                "  #{:<10} {:<10} {} {:>6.2}  {} -> {}  {}  closed {}",
                trade.ticket,
                trade.symbol,
                side_label(trade.side),
                trade.volume,
                trade.open_price,
                trade.close_price,
                signed(trade.net_profit(), currency),
                trade.close_time.format("%Y-%m-%d %H:%M")
            );
        }
    }
    println!("{sep}\n");
}

fn side_label(side: Side) -> &'static str {
    match side {
        Side::Buy => "BUY ",
        Side::Sell => "SELL",
    }
}

fn money(amount: Decimal, currency: &str) -> String {
    format!("{amount:.2} {currency}")
}

fn signed(amount: Decimal, currency: &str) -> String {
    if amount >= Decimal::ZERO {
        format!("+{amount:.2} {currency}")
    } else {
        format!("{amount:.2} {currency}")
    }
}
