//! Hybrid FX Engine - Main Entry Point
//!
//! Runs the scan loop against the terminal bridge or a paper account fed by
//! live bridge quotes.

use anyhow::Result;
use clap::{Parser, Subcommand};
use hybrid_fx_engine::broker::{BridgeClient, Broker, PaperBroker};
use hybrid_fx_engine::config::Config;
use hybrid_fx_engine::engine::{Engine, EngineStatus, TradeAction};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Hybrid FX Engine CLI
#[derive(Parser)]
#[command(name = "hybrid-fx-engine")]
#[command(version, about = "Multi-strategy FX engine with recovery escalation")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Trade live through the terminal bridge
    Run,

    /// Paper trade on live bridge quotes (default)
    Paper {
        /// Starting balance of the paper account
        #[arg(short = 'b', long, default_value = "10000")]
        balance: Decimal,
    },

    /// Load and validate configuration, then exit
    CheckConfig,

    /// Close every position on the live account through the bridge, then exit
    EmergencyStop,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    let config = Config::load()?;

    let command = cli.command.unwrap_or(Commands::Paper {
        balance: Decimal::new(10000, 0),
    });

    let bridge: Arc<dyn Broker> = Arc::new(BridgeClient::new(&config.bridge, &config.sizing)?);
    let broker: Arc<dyn Broker> = match command {
        Commands::CheckConfig => {
            log_config(&config);
            config.validate()?;
            info!("✅ Configuration is valid");
            return Ok(());
        }
        Commands::EmergencyStop => {
            warn!("⚠️  Closing ALL open positions on the live account");
            let engine = Engine::new(config, bridge);
            let closed = engine.emergency_stop().await?;
            info!(closed, "🛑 Emergency stop complete");
            return Ok(());
        }
        Commands::Run => {
            warn!("⚠️  LIVE TRADING MODE - Real money at risk!");
            if config.bridge.api_key.is_empty() {
                warn!("⚠️  No bridge API key configured, requests will be unsigned");
            }
            bridge
        }
        Commands::Paper { balance } => {
            info!(%balance, "📝 PAPER TRADING MODE - Simulated fills on live quotes");
            Arc::new(PaperBroker::new(balance, config.sizing.pip_value_per_lot).with_feed(bridge))
        }
    };

    info!("╔════════════════════════════════════════════════════════════╗");
    info!(
        "║            Hybrid FX Engine v{}                          ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("╚════════════════════════════════════════════════════════════╝");
    log_config(&config);

    let engine = Arc::new(Engine::new(config, broker));
    spawn_event_logger(&engine);
    engine.start().await?;

    let reporter = {
        let engine = engine.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !engine.is_running() {
                    break;
                }
                log_status(&engine.status().await);
            }
        })
    };

    #[cfg(unix)]
    let lock_listener = {
        use tokio::signal::unix::{signal, SignalKind};
        let engine = engine.clone();
        let mut usr1 = signal(SignalKind::user_defined1())?;
        tokio::spawn(async move {
            // SIGUSR1 requests a forced profit lock
            while usr1.recv().await.is_some() {
                engine.force_profit_lock().await;
            }
        })
    };

    tokio::signal::ctrl_c().await.ok();
    info!("🛑 Shutdown signal received");
    engine.stop().await;
    reporter.abort();
    #[cfg(unix)]
    lock_listener.abort();

    log_status(&engine.status().await);
    info!("👋 Hybrid FX Engine shutdown complete");
    Ok(())
}

/// Initialize logging to stdout and an hourly rolling file.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "hybrid-fx-engine.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("hybrid_fx_engine=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    info!("📋 Configuration:");
    info!("   Bridge: {}", config.bridge.base_url);
    info!("   Instruments: {}", config.engine.instruments.join(", "));
    info!(
        "   Interval: {}ms (fast {}ms, slow {}ms)",
        config.engine.scan_interval_ms, config.engine.fast_interval_ms, config.engine.slow_interval_ms
    );
    info!(
        "   Max Open Positions: {}, Burst Cap: {}",
        config.engine.max_open_positions, config.engine.burst_cap
    );
    info!("   Default Lot: {}", config.sizing.default_lot);
    info!(
        "   Profit Target: ${} / {}P, Stop Loss: ${} / {}P",
        config.lifecycle.profit_target_usd,
        config.lifecycle.profit_target_pips,
        config.lifecycle.stop_loss_usd,
        config.lifecycle.stop_loss_pips
    );
    info!(
        "   Portfolio Lock-in: ${}, Emergency: -${}, Currency Cap: {} lots",
        config.portfolio.lock_in_profit_usd,
        config.portfolio.emergency_loss_usd,
        config.portfolio.max_currency_exposure
    );
    if config.recovery.enabled {
        let ladder: Vec<&str> = config.recovery.ladder.iter().map(|m| m.as_str()).collect();
        info!("   Recovery Ladder: {}", ladder.join(" -> "));
    } else {
        info!("   Recovery: disabled");
    }
}

fn log_status(status: &EngineStatus) {
    info!("📈 [STATUS] ═══════════════════════════════════════════════");
    info!(
        "   Cycles: {} | Signals: {} | Executed: {} ({}%) | Failed: {}",
        status.cycles, status.total_signals, status.executed_trades, status.success_rate, status.failed_executions
    );
    info!(
        "   Open: {} | Closed: {} | Recoveries: {} | Liquidations: {}",
        status.open_positions, status.closed_positions, status.active_recoveries, status.liquidations
    );
    info!(
        "   Balance: ${} | Equity: ${} | Drawdown: {}% | Session MDD: {}%",
        status.balance.round_dp(2),
        status.equity.round_dp(2),
        (status.drawdown * Decimal::ONE_HUNDRED).round_dp(2),
        (status.session_mdd * Decimal::ONE_HUNDRED).round_dp(2)
    );
    info!("   Risk: {} (score {})", status.risk_level, status.risk_score);
    let rs = &status.recovery_stats;
    info!(
        "   Recovery fills: martingale {} | grid {} | hedge {} | correlation {} | recovered {} (${})",
        rs.martingale,
        rs.grid,
        rs.hedge,
        rs.correlation,
        rs.recovered,
        rs.recovered_profit.round_dp(2)
    );
    for hedge in &status.hedge_recommendations {
        info!("   🛡️ Consider: {}", hedge);
    }
    for (kind, count) in &status.per_strategy_counts {
        info!("   {}: {} signals", kind, count);
    }
}

/// Mirror trade and error notifications into the log.
fn spawn_event_logger(engine: &Engine) {
    let mut trades = engine.events().subscribe_trades();
    let mut errors = engine.events().subscribe_errors();

    tokio::spawn(async move {
        loop {
            match trades.recv().await {
                Ok(trade) => match &trade.action {
                    TradeAction::Open => info!(
                        ticket = trade.ticket,
                        instrument = %trade.instrument,
                        side = %trade.side,
                        size = %trade.size,
                        price = %trade.price,
                        label = %trade.label,
                        "💰 [TRADE] Opened"
                    ),
                    TradeAction::Close { reason } => info!(
                        ticket = trade.ticket,
                        instrument = %trade.instrument,
                        profit = %trade.profit,
                        %reason,
                        "💰 [TRADE] Closed"
                    ),
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Trade log lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::spawn(async move {
        loop {
            match errors.recv().await {
                Ok(event) => error!(
                    kind = %event.kind,
                    context = %event.context,
                    message = %event.message,
                    "❌ [ERROR] Engine error"
                ),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Error log lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}
