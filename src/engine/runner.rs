//! Lifecycle of the scan loop task.

use crate::broker::Broker;
use crate::config::Config;
use crate::engine::context::{EngineContext, EngineStatus};
use crate::engine::cycle::Pipeline;
use crate::engine::events::{EventBus, TradeAction, TradeEvent};
use crate::error::EngineError;
use crate::position::parse_label;
use crate::risk::{AlertSeverity, RiskAlert, RiskAlertType};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Stop token and wake-up for one spawned loop.
///
/// Each `start` creates a fresh pair. A loop that outlived its `stop` still
/// holds its own stopped token.
struct LoopHandle {
    task: JoinHandle<()>,
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl LoopHandle {
    fn signal_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }
}

/// Owns the single scan loop and exposes start/stop/status.
///
/// The loop task is the only writer of engine state. Readers get a copy of
/// the counters through `status()`.
pub struct Engine {
    config: Arc<Config>,
    broker: Arc<dyn Broker>,
    events: EventBus,
    status: Arc<RwLock<EngineStatus>>,
    running: AtomicBool,
    force_lock: Arc<AtomicBool>,
    handle: Mutex<Option<LoopHandle>>,
}

impl Engine {
    pub fn new(config: Config, broker: Arc<dyn Broker>) -> Self {
        Self {
            config: Arc::new(config),
            broker,
            events: EventBus::default(),
            status: Arc::new(RwLock::new(EngineStatus::default())),
            running: AtomicBool::new(false),
            force_lock: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Notification channels. Subscribe before `start()` to see every event.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Validate configuration, load open positions and spawn the loop.
    ///
    /// Calling `start` on a running engine is a no-op. If a previous loop
    /// missed its join timeout, `start` waits for it to exit first.
    pub async fn start(&self) -> Result<(), EngineError> {
        self.config.validate()?;
        let mut slot = self.handle.lock().await;
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Engine already running");
            return Ok(());
        }

        if let Some(previous) = slot.take() {
            if !previous.task.is_finished() {
                warn!("⏳ Previous scan loop still finishing its cycle, waiting before restart");
            }
            previous.signal_stop();
            if let Err(e) = previous.task.await {
                error!(error = %e, "Previous scan loop ended abnormally");
            }
        }

        let mut ctx = EngineContext::new(&self.config);
        let now = Utc::now();
        match self.broker.get_positions().await {
            Ok(positions) => {
                ctx.book.sync(positions);
                ctx.recovery.rebuild(&ctx.book, now);
                info!(positions = ctx.book.len(), "📂 [INIT] Loaded open positions");
            }
            Err(e) => warn!(error = %e, "⚠️  [INIT] Could not load open positions, first cycle will retry"),
        }
        match self.broker.account_balance().await {
            Ok(balance) => ctx.balance = balance,
            Err(e) => warn!(error = %e, "⚠️  [INIT] Could not load account balance"),
        }

        let mut pipeline = Pipeline::new(self.config.clone());
        *self.status.write().await = ctx.status(true, pipeline.scanners().generated());

        let stop = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let broker = self.broker.clone();
        let events = self.events.clone();
        let status = self.status.clone();
        let force_lock = self.force_lock.clone();
        let (loop_stop, loop_wake) = (stop.clone(), wake.clone());

        let task = tokio::spawn(async move {
            info!("🚀 Starting scan loop");
            while !loop_stop.load(Ordering::SeqCst) {
                if force_lock.swap(false, Ordering::SeqCst) {
                    ctx.force_lock_requested = true;
                }
                let report = pipeline.run_cycle(&mut ctx, broker.as_ref(), &events, Utc::now()).await;
                *status.write().await = ctx.status(true, pipeline.scanners().generated());

                tokio::select! {
                    _ = tokio::time::sleep(report.next_interval) => {}
                    _ = loop_wake.notified() => {}
                }
            }
            status.write().await.running = false;
            info!(cycles = ctx.stats.cycles, "👋 Scan loop stopped");
        });
        *slot = Some(LoopHandle { task, stop, wake });

        info!(
            instruments = self.config.engine.instruments.len(),
            interval_ms = self.config.engine.scan_interval_ms,
            "Engine started"
        );
        Ok(())
    }

    /// Signal the loop and wait up to the join timeout for it to finish.
    ///
    /// A loop that misses the timeout keeps its handle and is awaited by the
    /// next `start`. Calling `stop` on a stopped engine is a no-op.
    pub async fn stop(&self) {
        let mut slot = self.handle.lock().await;
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let Some(mut handle) = slot.take() else {
            return;
        };
        handle.signal_stop();

        let timeout = Duration::from_millis(self.config.engine.join_timeout_ms);
        match tokio::time::timeout(timeout, &mut handle.task).await {
            Ok(Ok(())) => info!("🛑 Engine stopped"),
            Ok(Err(e)) => error!(error = %e, "Scan loop task ended abnormally"),
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Scan loop did not stop in time");
                *slot = Some(handle);
            }
        }
        self.status.write().await.running = false;
    }

    /// Ask the loop to close every position at or above the forced-lock
    /// minimum profit on its next cycle. Returns false when nothing is running.
    pub async fn force_profit_lock(&self) -> bool {
        if !self.is_running() {
            warn!("Forced profit lock ignored, engine is not running");
            return false;
        }
        self.force_lock.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().await.as_ref() {
            handle.wake.notify_one();
        }
        info!("🔒 [PORTFOLIO] Forced profit lock requested");
        true
    }

    /// Stop the loop, then close every open position. Returns how many closed.
    pub async fn emergency_stop(&self) -> Result<usize, EngineError> {
        error!("🚨 [EMERGENCY] Operator emergency stop");
        self.stop().await;

        let now = Utc::now();
        let positions = match self.broker.get_positions().await {
            Ok(positions) => positions,
            Err(e) => {
                warn!(error = %e, "Could not list positions before the emergency close");
                Vec::new()
            }
        };
        let closed = self
            .broker
            .close_all_positions()
            .await
            .map_err(|e| EngineError::transient("close_all_positions", e))?;

        for position in positions {
            let strategy = parse_label(&position.label).strategy();
            self.events.trade(TradeEvent {
                action: TradeAction::Close {
                    reason: "EMERGENCY_STOP".to_string(),
                },
                ticket: position.ticket,
                instrument: position.instrument,
                side: position.side,
                size: position.size,
                price: position.current_price,
                label: position.label,
                strategy,
                profit: position.profit,
                at: now,
            });
        }

        RiskAlert::new(
            RiskAlertType::EmergencyStop { closed },
            AlertSeverity::Critical,
            None,
            format!("Emergency stop closed {} positions", closed),
        )
        .emit();

        let mut status = self.status.write().await;
        status.open_positions = 0;
        status.closed_positions += closed as u64;
        status.liquidations += 1;
        Ok(closed)
    }

    /// Copy of the latest counters.
    pub async fn status(&self) -> EngineStatus {
        self.status.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{OrderRequest, PaperBroker, Side};
    use rust_decimal_macros::dec;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let engine = Engine::new(Config::default(), Arc::new(PaperBroker::default()));
        assert!(!engine.status().await.running);

        assert_ok!(engine.start().await);
        assert_ok!(engine.start().await);
        assert!(engine.is_running());

        engine.stop().await;
        engine.stop().await;
        assert!(!engine.is_running());
        assert!(!engine.status().await.running);

        assert_ok!(engine.start().await);
        assert!(engine.is_running());
        engine.stop().await;
    }

    #[tokio::test]
    async fn test_invalid_config_refuses_to_start() {
        let mut config = Config::default();
        config.engine.instruments.clear();
        let engine = Engine::new(config, Arc::new(PaperBroker::default()));

        let err = assert_err!(engine.start().await);
        assert_eq!(err.kind(), "configuration");
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_emergency_stop_flattens_and_stops() {
        let paper = Arc::new(PaperBroker::default());
        paper
            .set_tick("EURUSD", dec!(1.10000), dec!(1.10002), Utc::now())
            .await;
        for _ in 0..2 {
            assert_ok!(
                paper
                    .place_order(&OrderRequest::market("EURUSD", Side::Buy, dec!(0.01), "HFX-MOMO"))
                    .await
            );
        }

        let engine = Engine::new(Config::default(), paper.clone());
        let mut trades = engine.events().subscribe_trades();
        assert_ok!(engine.start().await);

        let closed = assert_ok!(engine.emergency_stop().await);
        assert_eq!(closed, 2);
        assert!(!engine.is_running());
        assert_eq!(paper.open_count().await, 0);

        let event = assert_ok!(trades.recv().await);
        assert_eq!(
            event.action,
            TradeAction::Close {
                reason: "EMERGENCY_STOP".to_string()
            }
        );
        let status = engine.status().await;
        assert!(!status.running);
        assert_eq!(status.open_positions, 0);
        assert_eq!(status.liquidations, 1);
    }

    #[tokio::test]
    async fn test_force_profit_lock_needs_a_running_loop() {
        let engine = Engine::new(Config::default(), Arc::new(PaperBroker::default()));
        assert!(!engine.force_profit_lock().await);

        assert_ok!(engine.start().await);
        assert!(engine.force_profit_lock().await);
        engine.stop().await;
    }
}
