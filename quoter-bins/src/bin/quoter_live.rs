//! Live quoting agent
//!
//! Wires the venue client, the reference feed, and the engine together and
//! runs the single-threaded event loop: one channel, one consumer, all core
//! state mutated serially. Exits 0 on ctrl-c, 1 on a fatal state
//! inconsistency.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use quoter_core::feed::{agg_trade_url, spawn_reference_feed};
use quoter_core::prelude::*;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(version, about = "Market-making agent for a perpetual-futures venue")]
struct Args {
    /// Venue symbol to quote
    #[arg(long)]
    market: String,

    /// Environment tag, shown in logs
    #[arg(long, default_value = "prod")]
    env: String,

    /// Log output: "shell" or a file path
    #[arg(long, default_value = "shell")]
    log: String,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Per-market config file (JSON); defaults to the built-in preset
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Venue account name
    #[arg(long)]
    username: String,

    /// Venue account password hash
    #[arg(long)]
    password: String,

    /// Venue REST endpoint
    #[arg(long, default_value = "http://localhost:4000")]
    http_host: String,

    /// Venue WebSocket endpoint
    #[arg(long, default_value = "ws://localhost:4000")]
    ws_host: String,

    /// Reference feed WebSocket base
    #[arg(long, default_value = "wss://fstream.binance.com/ws")]
    feed_host: String,

    /// Reference feed symbol, e.g. ETHUSDT
    #[arg(long)]
    feed_symbol: String,
}

fn init_logging(
    level: &str,
    log: &str,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    if log == "shell" {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false))
            .with(filter)
            .init();
        Ok(None)
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log)
            .with_context(|| format!("failed to open log file {}", log))?;
        let (writer, guard) = tracing_appender::non_blocking(file);
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(writer),
            )
            .with(filter)
            .init();
        Ok(Some(guard))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(&args.log_level, &args.log)?;

    let cfg = match &args.config {
        Some(path) => MarketConfig::load(path)?,
        None => MarketConfig::preset(&args.market).ok_or_else(|| {
            anyhow!(
                "no built-in parameters for market {}, pass --config",
                args.market
            )
        })?,
    };
    tracing::info!(
        market = %cfg.market,
        env = %args.env,
        orders_per_side = cfg.orders_per_side,
        tick_jump = %cfg.tick_jump,
        max_position = %cfg.max_position,
        target_leverage = cfg.target_leverage,
        "starting quoter"
    );

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let venue = VenueClient::connect(
        VenueEndpoints::new(&args.http_host, &args.ws_host),
        &VenueCredentials {
            username: args.username.clone(),
            password: args.password.clone(),
        },
        &cfg.market,
        cfg.target_leverage,
        event_tx.clone(),
    )
    .await
    .context("venue connect failed")?;

    let _feed_task = spawn_reference_feed(
        agg_trade_url(&args.feed_host, &args.feed_symbol),
        event_tx.clone(),
    );
    drop(event_tx);

    let mut engine = MakerEngine::new(cfg, venue);

    loop {
        tokio::select! {
            maybe_event = event_rx.recv() => {
                match maybe_event {
                    Some(event) => {
                        if let Err(err) = engine.handle_event(event) {
                            tracing::error!(%err, "fatal state inconsistency, shutting down");
                            return Err(err.into());
                        }
                    }
                    None => {
                        tracing::error!("all event sources gone, shutting down");
                        return Err(anyhow!("event sources disconnected"));
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received, shutting down");
                return Ok(());
            }
        }
    }
}
