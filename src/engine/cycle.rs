//! One pass of the scan loop.
//!
//! Stage order is fixed:
//! 1. Refresh quotes, positions and balance
//! 2. Portfolio overlay (emergency liquidation, profit lock-in, operator lock)
//! 3. Recovery emergency ceiling
//! 4. Per-position exit rules
//! 5. Scan, admit and execute new signals
//! 6. Recovery escalation
//! 7. Breaker, drawdown, portfolio risk and next-interval bookkeeping
//!
//! A failed broker call never aborts the cycle outright; it is logged,
//! published on the error channel and counted toward the circuit breaker.
//! Nothing sleeps and retries inside a cycle. The next cycle is the retry.

use crate::broker::Broker;
use crate::config::Config;
use crate::engine::context::EngineContext;
use crate::engine::events::{EventBus, TradeAction, TradeEvent};
use crate::error::EngineError;
use crate::market::MarketSnapshotCache;
use crate::position::{parse_label, Position};
use crate::risk::{
    AlertSeverity, BreakerState, CloseKind, ExitDecision, LifecycleManager, PortfolioAction, PortfolioGuard,
    RiskAlert, RiskAlertType,
};
use crate::strategy::{AdmissionController, ExecutedLeg, OrderExecutor, ScannerSet, Signal};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What a single cycle did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub refreshed: usize,
    pub closed: usize,
    pub executed: usize,
    pub failed_executions: usize,
    pub recovery_orders: usize,
    pub liquidated: bool,
    /// Counted toward the circuit breaker
    pub failed: bool,
    pub breaker: BreakerState,
    pub next_interval: Duration,
}

/// Stateless stages of the cycle. Mutable state lives in `EngineContext`.
pub struct Pipeline {
    config: Arc<Config>,
    scanners: ScannerSet,
    admission: AdmissionController,
    executor: OrderExecutor,
    lifecycle: LifecycleManager,
    guard: PortfolioGuard,
}

impl Pipeline {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            scanners: ScannerSet::from_config(&config.scanners),
            admission: AdmissionController::new(config.admission.clone(), &config.engine)
                .with_exposure_cap(config.portfolio.max_currency_exposure),
            executor: OrderExecutor::new(config.sizing.clone()),
            lifecycle: LifecycleManager::new(config.lifecycle.clone()),
            guard: PortfolioGuard::new(config.portfolio.clone()),
            config,
        }
    }

    pub fn scanners(&self) -> &ScannerSet {
        &self.scanners
    }

    pub async fn run_cycle(
        &mut self,
        ctx: &mut EngineContext,
        broker: &dyn Broker,
        events: &EventBus,
        now: DateTime<Utc>,
    ) -> CycleReport {
        ctx.breaker.begin_cycle();
        ctx.stats.cycles += 1;
        ctx.last_cycle_at = Some(now);

        let mut report = CycleReport {
            refreshed: 0,
            closed: 0,
            executed: 0,
            failed_executions: 0,
            recovery_orders: 0,
            liquidated: false,
            failed: false,
            breaker: ctx.breaker.state(),
            next_interval: Duration::from_millis(self.config.engine.scan_interval_ms),
        };

        // 1. snapshot
        let refresh = ctx.market.refresh(broker, &self.config.engine.instruments, now).await;
        report.refreshed = refresh.refreshed;
        for instrument in &refresh.failed {
            events.error("transient_io", format!("get_tick {}", instrument), "tick request failed", now);
        }
        if refresh.refreshed == 0 && refresh.has_failures() {
            report.failed = true;
        }

        let positions_fresh = match broker.get_positions().await {
            Ok(positions) => {
                ctx.book.sync(positions);
                true
            }
            Err(e) => {
                warn!(error = %e, "Position snapshot failed, skipping position stages");
                events.error("transient_io", "get_positions", &e, now);
                report.failed = true;
                false
            }
        };

        match broker.account_balance().await {
            Ok(balance) => ctx.balance = balance,
            Err(e) => {
                warn!(error = %e, "Balance request failed");
                events.error("transient_io", "account_balance", &e, now);
                report.failed = true;
            }
        }

        debug!(
            refreshed = refresh.refreshed,
            stale = refresh.stale,
            invalid = refresh.invalid,
            missing = refresh.missing,
            failed = refresh.failed.len(),
            positions = ctx.book.len(),
            "Snapshot refreshed"
        );

        if positions_fresh {
            // 2. portfolio overlay
            match self.guard.evaluate(&ctx.book) {
                PortfolioAction::Liquidate { total } => {
                    let alert = RiskAlert::new(
                        RiskAlertType::PortfolioEmergency {
                            limit: self.config.portfolio.emergency_loss_usd,
                        },
                        AlertSeverity::Critical,
                        None,
                        format!("Aggregate open profit {} breached the emergency limit", total),
                    )
                    .with_metric("total_profit", total);
                    self.liquidate(ctx, broker, events, alert, "PORTFOLIO_EMERGENCY", now).await;
                    report.liquidated = true;
                }
                PortfolioAction::LockIn { tickets, total, reason } => {
                    report.closed += self.lock_in(ctx, broker, events, tickets, total, &reason, now).await;
                }
                PortfolioAction::None => {}
            }

            if !report.liquidated && ctx.force_lock_requested {
                ctx.force_lock_requested = false;
                match self.guard.forced_lock_in(&ctx.book) {
                    PortfolioAction::LockIn { tickets, total, reason } => {
                        report.closed += self.lock_in(ctx, broker, events, tickets, total, &reason, now).await;
                    }
                    _ => info!("🔒 [PORTFOLIO] Forced profit lock found nothing to close"),
                }
            }

            // 3. recovery ceiling
            if !report.liquidated {
                if let Some(breach) = ctx.recovery.check_emergency(&ctx.book, ctx.balance) {
                    let alert = RiskAlert::new(
                        RiskAlertType::RecoveryEmergency {
                            drawdown_pct: breach.drawdown_pct,
                        },
                        AlertSeverity::Critical,
                        None,
                        format!("Open loss {} exceeds the recovery ceiling", breach.loss),
                    )
                    .with_metric("loss", breach.loss)
                    .with_metric("drawdown_pct", breach.drawdown_pct);
                    self.liquidate(ctx, broker, events, alert, "RECOVERY_EMERGENCY", now).await;
                    report.liquidated = true;
                }
            }

            // 4. exit rules
            if !report.liquidated {
                let decisions: Vec<(u64, ExitDecision)> = ctx
                    .book
                    .positions()
                    .map(|p| (p.ticket, self.lifecycle.evaluate(p, now)))
                    .filter(|(_, decision)| decision.is_close())
                    .collect();
                for (ticket, decision) in decisions {
                    let ExitDecision::Close { kind, reason } = decision else {
                        continue;
                    };
                    if self.close(ctx, broker, events, ticket, kind, &reason, now).await {
                        report.closed += 1;
                    }
                }
                ctx.recovery.reconcile(&ctx.book);
            }
        }

        // 5-6. new risk
        if !report.liquidated && positions_fresh && ctx.breaker.allows_trading() {
            let (executed, failed) = self.dispatch_signals(ctx, broker, events, now).await;
            report.executed = executed;
            report.failed_executions = failed;
            report.recovery_orders = self.escalate(ctx, broker, events, now).await;
        } else if ctx.breaker.is_open() {
            debug!(breaker = ?ctx.breaker.state(), "Circuit breaker open, no new risk this cycle");
        }

        // 7. bookkeeping
        if report.failed {
            if ctx.breaker.record_failure() {
                RiskAlert::new(
                    RiskAlertType::CircuitBreakerOpen {
                        failed_cycles: self.config.engine.max_consecutive_failed_cycles,
                    },
                    AlertSeverity::Error,
                    None,
                    "Consecutive failed cycles opened the circuit breaker".to_string(),
                )
                .emit();
            }
        } else {
            ctx.breaker.record_success();
        }
        report.breaker = ctx.breaker.state();

        if positions_fresh {
            self.assess_portfolio(ctx);
        }
        let equity = ctx.equity();
        if ctx.balance > Decimal::ZERO {
            ctx.drawdown.update(equity);
        }
        report.next_interval = self.next_interval(ctx);

        info!(
            cycle = ctx.stats.cycles,
            refreshed = report.refreshed,
            positions = ctx.book.len(),
            closed = report.closed,
            executed = report.executed,
            failed_executions = report.failed_executions,
            recovery_orders = report.recovery_orders,
            liquidated = report.liquidated,
            %equity,
            risk = %ctx.risk.level,
            next_ms = report.next_interval.as_millis() as u64,
            "📊 [CYCLE] Complete"
        );
        report
    }

    /// Scan, admit and execute. Returns (executed, failed).
    async fn dispatch_signals(
        &mut self,
        ctx: &mut EngineContext,
        broker: &dyn Broker,
        events: &EventBus,
        now: DateTime<Utc>,
    ) -> (usize, usize) {
        let candidates = self.scanners.scan_all(&ctx.market, now);
        if candidates.is_empty() {
            return (0, 0);
        }
        let recovering = ctx.recovery.recovering();
        let admitted = self
            .admission
            .select(candidates, &ctx.book, &recovering, &ctx.last_trade, now);

        let mut executed = 0;
        let mut failed = 0;
        for signal in admitted {
            if executed >= self.config.engine.max_executions_per_cycle {
                break;
            }
            events.signal(&signal, now);
            ctx.stats.total_signals += 1;

            match self.executor.execute(broker, &ctx.market, &signal).await {
                Ok(legs) => {
                    executed += 1;
                    ctx.stats.executed_trades += 1;
                    for leg in &legs {
                        record_open(ctx, events, leg, now);
                    }
                    info!(
                        strategy = %signal.kind(),
                        legs = legs.len(),
                        tickets = ?legs.iter().map(|l| l.ticket).collect::<Vec<_>>(),
                        "✅ [EXEC] Signal executed"
                    );
                }
                Err(e) => {
                    failed += 1;
                    ctx.stats.failed_executions += 1;
                    report_execution_error(&signal, &e, events, now);
                }
            }
        }
        (executed, failed)
    }

    /// Plan and place recovery orders within the open-position ceiling.
    /// Returns how many filled.
    async fn escalate(
        &self,
        ctx: &mut EngineContext,
        broker: &dyn Broker,
        events: &EventBus,
        now: DateTime<Utc>,
    ) -> usize {
        let capacity = self.config.engine.max_open_positions.saturating_sub(ctx.book.len());
        let orders = ctx.recovery.plan(&ctx.book, &ctx.market, capacity, now);
        let mut filled = 0;
        for order in orders {
            match self
                .executor
                .place_single(broker, &ctx.market, &order.instrument, order.side, order.size, &order.label)
                .await
            {
                Ok(leg) => {
                    ctx.recovery.record_fill(&order, leg.ticket, now);
                    record_open(ctx, events, &leg, now);
                    ctx.stats.recovery_orders += 1;
                    filled += 1;
                }
                Err(e) => {
                    ctx.recovery.record_failure(&order.origin, now);
                    events.error(
                        e.kind(),
                        format!("recovery {} {} on {}", order.method, order.level, order.instrument),
                        &e,
                        now,
                    );
                }
            }
        }
        filled
    }

    /// Close the given winners and raise the lock-in alert. Returns how many closed.
    #[allow(clippy::too_many_arguments)]
    async fn lock_in(
        &self,
        ctx: &mut EngineContext,
        broker: &dyn Broker,
        events: &EventBus,
        tickets: Vec<u64>,
        total: Decimal,
        reason: &str,
        now: DateTime<Utc>,
    ) -> usize {
        let mut closed = 0;
        for ticket in tickets {
            if self
                .close(ctx, broker, events, ticket, CloseKind::PortfolioClose, reason, now)
                .await
            {
                closed += 1;
            }
        }
        RiskAlert::new(
            RiskAlertType::ProfitLockIn { closed },
            AlertSeverity::Info,
            None,
            format!("Locked in profit on {} positions ({})", closed, reason),
        )
        .with_metric("total_profit", total)
        .emit();
        closed
    }

    /// Refresh the portfolio score. Alerts fire when a currency first crosses
    /// the exposure cap and hedge advice is logged when it changes.
    fn assess_portfolio(&self, ctx: &mut EngineContext) {
        let risk = self.guard.assess(&ctx.book);
        for breach in &risk.over_cap {
            if ctx.risk.over_cap.iter().any(|b| b.currency == breach.currency) {
                continue;
            }
            RiskAlert::new(
                RiskAlertType::ExposureCap {
                    currency: breach.currency.clone(),
                    exposure: breach.exposure,
                },
                AlertSeverity::Warning,
                None,
                format!(
                    "{} net exposure {} lots is past the cap, reduce toward {}",
                    breach.currency, breach.exposure, breach.target
                ),
            )
            .with_metric("exposure", breach.exposure)
            .with_metric("target", breach.target)
            .emit();
        }
        if risk.hedges != ctx.risk.hedges {
            for hedge in &risk.hedges {
                info!(currency = %hedge.currency, exposure = %hedge.exposure, "🛡️ [PORTFOLIO] Consider: {}", hedge);
            }
        }
        if risk.level != ctx.risk.level {
            info!(score = %risk.score, from = %ctx.risk.level, to = %risk.level, "Portfolio risk level changed");
        }
        ctx.risk = risk;
    }

    /// Close one ticket. Returns true when the terminal confirmed the close.
    #[allow(clippy::too_many_arguments)]
    async fn close(
        &self,
        ctx: &mut EngineContext,
        broker: &dyn Broker,
        events: &EventBus,
        ticket: u64,
        kind: CloseKind,
        reason: &str,
        now: DateTime<Utc>,
    ) -> bool {
        match broker.close_position(ticket).await {
            Ok(true) => {
                if let Some(position) = ctx.book.remove(ticket) {
                    info!(
                        ticket,
                        instrument = %position.instrument,
                        profit = %position.profit,
                        pips = %position.pips().round_dp(1),
                        %kind,
                        %reason,
                        "🔒 [EXIT] Position closed"
                    );
                    events.trade(close_event(&position, &ctx.market, reason, now));
                }
                ctx.stats.closed_positions += 1;
                true
            }
            Ok(false) => {
                warn!(ticket, %reason, "Close found no position, dropping from book");
                ctx.book.remove(ticket);
                false
            }
            Err(e) => {
                warn!(ticket, %reason, error = %e, "Close failed, retrying next cycle");
                events.error("transient_io", format!("close_position {}", ticket), &e, now);
                false
            }
        }
    }

    /// Flatten the account and drop every recovery state.
    async fn liquidate(
        &self,
        ctx: &mut EngineContext,
        broker: &dyn Broker,
        events: &EventBus,
        alert: RiskAlert,
        reason: &str,
        now: DateTime<Utc>,
    ) {
        alert.emit();
        ctx.stats.liquidations += 1;

        match broker.close_all_positions().await {
            Ok(closed) => {
                error!(closed, %reason, "🚨 [EMERGENCY] All positions liquidated");
                for position in ctx.book.positions() {
                    events.trade(close_event(position, &ctx.market, reason, now));
                }
                ctx.stats.closed_positions += closed as u64;
                ctx.book.clear();
            }
            Err(e) => {
                error!(%reason, error = %e, "🚨 [EMERGENCY] Liquidation failed, retrying next cycle");
                events.error("transient_io", "close_all_positions", &e, now);
            }
        }
        ctx.recovery.clear_all();
    }

    /// Fast when spreads are tight and prices move, slow while the breaker
    /// is open, base otherwise.
    pub fn next_interval(&self, ctx: &EngineContext) -> Duration {
        let engine = &self.config.engine;
        if ctx.breaker.is_open() {
            return Duration::from_millis(engine.slow_interval_ms);
        }
        let has_quotes = ctx.market.quotes().next().is_some();
        if has_quotes
            && ctx.market.average_spread_pips() <= engine.fast_max_spread_pips
            && ctx.market.max_volatility_pips() >= engine.fast_min_volatility_pips
        {
            return Duration::from_millis(engine.fast_interval_ms);
        }
        Duration::from_millis(engine.scan_interval_ms)
    }
}

fn record_open(ctx: &mut EngineContext, events: &EventBus, leg: &ExecutedLeg, now: DateTime<Utc>) {
    ctx.last_trade.insert(leg.instrument.clone(), now);
    let tag = parse_label(&leg.label);
    let strategy = tag.strategy();
    ctx.book.insert(Position {
        ticket: leg.ticket,
        instrument: leg.instrument.clone(),
        side: leg.side,
        size: leg.size,
        open_price: leg.price,
        current_price: leg.price,
        profit: Decimal::ZERO,
        open_time: now,
        label: leg.label.clone(),
        tag,
    });
    events.trade(TradeEvent {
        action: TradeAction::Open,
        ticket: leg.ticket,
        instrument: leg.instrument.clone(),
        side: leg.side,
        size: leg.size,
        price: leg.price,
        label: leg.label.clone(),
        strategy,
        profit: Decimal::ZERO,
        at: now,
    });
}

/// Close notification priced at the quote the position would exit on.
fn close_event(position: &Position, market: &MarketSnapshotCache, reason: &str, now: DateTime<Utc>) -> TradeEvent {
    let price = market
        .quote(&position.instrument)
        .map_or(position.current_price, |q| q.exit_price(position.side));
    TradeEvent {
        action: TradeAction::Close {
            reason: reason.to_string(),
        },
        ticket: position.ticket,
        instrument: position.instrument.clone(),
        side: position.side,
        size: position.size,
        price,
        label: position.label.clone(),
        strategy: position.strategy(),
        profit: position.profit,
        at: now,
    }
}

fn report_execution_error(signal: &Signal, e: &EngineError, events: &EventBus, now: DateTime<Utc>) {
    let context = format!("execute {}", signal.kind());
    match e {
        EngineError::PartialExecution {
            strategy, rolled_back, ..
        } => {
            error!(strategy = %signal.kind(), error = %e, "❌ [EXEC] Partial execution unwound");
            RiskAlert::new(
                RiskAlertType::PartialExecution {
                    strategy: strategy.clone(),
                    rolled_back: *rolled_back,
                },
                AlertSeverity::Error,
                Some(signal.primary_instrument()),
                e.to_string(),
            )
            .emit();
        }
        EngineError::Validation(_) => {
            debug!(strategy = %signal.kind(), error = %e, "Signal dropped");
        }
        _ => {
            warn!(strategy = %signal.kind(), error = %e, "❌ [EXEC] Signal failed");
        }
    }
    events.error(e.kind(), context, e, now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{MockBroker, OrderRequest, PaperBroker, Side};
    use crate::config::RecoveryMethod;
    use crate::position::recovery_label;
    use crate::error::BrokerError;
    use rust_decimal_macros::dec;

    fn config() -> Arc<Config> {
        Arc::new(Config::default())
    }

    async fn open(broker: &PaperBroker, instrument: &str, side: Side, size: Decimal, label: &str) -> u64 {
        broker
            .place_order(&OrderRequest::market(instrument, side, size, label))
            .await
            .unwrap()
            .ticket
    }

    #[tokio::test]
    async fn test_profit_target_closes_position() {
        let now = Utc::now();
        let config = config();
        let broker = PaperBroker::default();
        broker.set_tick("EURUSD", dec!(1.10000), dec!(1.10002), now).await;
        open(&broker, "EURUSD", Side::Buy, dec!(0.01), "HFX-MOMO").await;
        broker.set_tick("EURUSD", dec!(1.10200), dec!(1.10202), now).await;

        let events = EventBus::default();
        let mut trades = events.subscribe_trades();
        let mut ctx = EngineContext::new(&config);
        let mut pipeline = Pipeline::new(config);

        let report = pipeline.run_cycle(&mut ctx, &broker, &events, now).await;

        assert_eq!(report.closed, 1);
        assert!(!report.failed);
        assert!(ctx.book.is_empty());
        assert_eq!(broker.open_count().await, 0);
        let event = trades.recv().await.unwrap();
        assert_eq!(
            event.action,
            TradeAction::Close {
                reason: "PROFIT_TARGET_15P".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_small_move_is_held() {
        let now = Utc::now();
        let config = config();
        let broker = PaperBroker::default();
        broker.set_tick("EURUSD", dec!(1.10000), dec!(1.10000), now).await;
        open(&broker, "EURUSD", Side::Buy, dec!(0.01), "HFX-MOMO").await;
        broker.set_tick("EURUSD", dec!(1.10100), dec!(1.10102), now).await;

        let events = EventBus::default();
        let mut ctx = EngineContext::new(&config);
        let mut pipeline = Pipeline::new(config);

        let report = pipeline.run_cycle(&mut ctx, &broker, &events, now).await;
        assert_eq!(report.closed, 0);
        assert_eq!(ctx.book.len(), 1);
    }

    #[tokio::test]
    async fn test_emergency_liquidates_everything() {
        let now = Utc::now();
        let config = config();
        let broker = PaperBroker::default();
        broker.set_tick("EURUSD", dec!(1.10000), dec!(1.10002), now).await;
        open(&broker, "EURUSD", Side::Buy, dec!(1), "HFX-MOMO").await;
        let label = recovery_label(RecoveryMethod::Martingale, 1, Some("EURUSD"));
        open(&broker, "EURUSD", Side::Buy, dec!(1), &label).await;
        // roughly -200 each
        broker.set_tick("EURUSD", dec!(1.09800), dec!(1.09802), now).await;

        let events = EventBus::default();
        let mut ctx = EngineContext::new(&config);
        ctx.book.sync(broker.get_positions().await.unwrap());
        ctx.recovery.rebuild(&ctx.book, now);
        assert_eq!(ctx.recovery.active_count(), 1);
        let mut pipeline = Pipeline::new(config);

        let report = pipeline.run_cycle(&mut ctx, &broker, &events, now).await;

        assert!(report.liquidated);
        assert_eq!(report.executed, 0);
        assert_eq!(broker.open_count().await, 0);
        assert!(ctx.book.is_empty());
        assert!(ctx.recovery.states().is_empty());
        assert_eq!(ctx.stats.liquidations, 1);
    }

    #[tokio::test]
    async fn test_triangle_executes_all_legs() {
        let now = Utc::now();
        let config = config();
        let broker = PaperBroker::default();
        broker.set_tick("EURUSD", dec!(1.10000), dec!(1.10002), now).await;
        broker.set_tick("GBPUSD", dec!(1.30000), dec!(1.30002), now).await;
        broker.set_tick("EURGBP", dec!(0.84500), dec!(0.84502), now).await;

        let events = EventBus::default();
        let mut signals = events.subscribe_signals();
        let mut ctx = EngineContext::new(&config);
        let mut pipeline = Pipeline::new(config);

        let report = pipeline.run_cycle(&mut ctx, &broker, &events, now).await;

        assert_eq!(report.executed, 1);
        assert_eq!(broker.open_count().await, 3);
        assert_eq!(ctx.book.len(), 3);
        assert!(ctx.last_trade.contains_key("EURGBP"));
        assert_eq!(ctx.stats.executed_trades, 1);
        let event = signals.recv().await.unwrap();
        assert_eq!(event.signal.kind(), crate::strategy::StrategyKind::Triangular);
    }

    #[tokio::test]
    async fn test_failed_leg_leaves_nothing_open() {
        let now = Utc::now();
        let config = config();
        let broker = PaperBroker::default();
        broker.set_tick("EURUSD", dec!(1.10000), dec!(1.10002), now).await;
        broker.set_tick("GBPUSD", dec!(1.30000), dec!(1.30002), now).await;
        broker.set_tick("EURGBP", dec!(0.84500), dec!(0.84502), now).await;
        broker.reject_orders_for("GBPUSD").await;

        let events = EventBus::default();
        let mut errors = events.subscribe_errors();
        let mut ctx = EngineContext::new(&config);
        let mut pipeline = Pipeline::new(config);

        let report = pipeline.run_cycle(&mut ctx, &broker, &events, now).await;

        assert_eq!(report.executed, 0);
        assert_eq!(report.failed_executions, 1);
        assert_eq!(broker.open_count().await, 0);
        assert!(ctx.book.is_empty());
        assert_eq!(errors.recv().await.unwrap().kind, "partial_execution");
    }

    #[tokio::test]
    async fn test_underwater_position_escalates() {
        let now = Utc::now();
        let config = config();
        let broker = PaperBroker::default();
        broker.set_tick("EURUSD", dec!(1.10000), dec!(1.10002), now).await;
        open(&broker, "EURUSD", Side::Buy, dec!(0.01), "HFX-MOMO").await;
        broker.set_tick("EURUSD", dec!(1.09780), dec!(1.09782), now).await;

        let events = EventBus::default();
        let mut ctx = EngineContext::new(&config);
        let mut pipeline = Pipeline::new(config);

        let report = pipeline.run_cycle(&mut ctx, &broker, &events, now).await;

        assert_eq!(report.closed, 0);
        assert_eq!(report.recovery_orders, 1);
        assert_eq!(broker.open_count().await, 2);
        let state = ctx.recovery.state("EURUSD").unwrap();
        assert_eq!(state.active, Some(RecoveryMethod::Martingale));
        assert_eq!(state.level, 1);

        // same cycle time: cooldown holds the ladder
        let again = pipeline.run_cycle(&mut ctx, &broker, &events, now).await;
        assert_eq!(again.recovery_orders, 0);
    }

    #[tokio::test]
    async fn test_recovery_stops_at_position_ceiling() {
        let now = Utc::now();
        let mut config = Config::default();
        config.engine.max_open_positions = 1;
        let config = Arc::new(config);
        let broker = PaperBroker::default();
        broker.set_tick("EURUSD", dec!(1.10000), dec!(1.10002), now).await;
        open(&broker, "EURUSD", Side::Buy, dec!(0.01), "HFX-MOMO").await;
        broker.set_tick("EURUSD", dec!(1.09780), dec!(1.09782), now).await;

        let events = EventBus::default();
        let mut ctx = EngineContext::new(&config);
        let mut pipeline = Pipeline::new(config);

        let report = pipeline.run_cycle(&mut ctx, &broker, &events, now).await;

        assert_eq!(report.recovery_orders, 0);
        assert_eq!(broker.open_count().await, 1);
        assert_eq!(ctx.stats.recovery_orders, 0);
    }

    #[tokio::test]
    async fn test_forced_lock_closes_qualifying_winners() {
        let now = Utc::now();
        let config = config();
        let broker = PaperBroker::default();
        broker.set_tick("EURUSD", dec!(1.10000), dec!(1.10002), now).await;
        broker.set_tick("GBPUSD", dec!(1.30000), dec!(1.30002), now).await;
        let eurusd = open(&broker, "EURUSD", Side::Buy, dec!(1), "HFX-MOMO").await;
        let gbpusd = open(&broker, "GBPUSD", Side::Buy, dec!(1), "HFX-MOMO").await;
        // +23 and +10, both short of the per-position targets
        broker.set_tick("EURUSD", dec!(1.10025), dec!(1.10027), now).await;
        broker.set_tick("GBPUSD", dec!(1.30012), dec!(1.30014), now).await;

        let events = EventBus::default();
        let mut trades = events.subscribe_trades();
        let mut ctx = EngineContext::new(&config);
        ctx.force_lock_requested = true;
        let mut pipeline = Pipeline::new(config);

        let report = pipeline.run_cycle(&mut ctx, &broker, &events, now).await;

        assert_eq!(report.closed, 1);
        assert!(!ctx.force_lock_requested);
        assert!(ctx.book.get(eurusd).is_none());
        assert!(ctx.book.get(gbpusd).is_some());
        let event = trades.recv().await.unwrap();
        assert_eq!(event.ticket, eurusd);
        assert_eq!(
            event.action,
            TradeAction::Close {
                reason: "FORCED_LOCK_$20".to_string()
            }
        );
        assert_eq!(event.price, dec!(1.10025));
        assert_eq!((ctx.risk.winners, ctx.risk.losers), (1, 0));

        let again = pipeline.run_cycle(&mut ctx, &broker, &events, now).await;
        assert_eq!(again.closed, 0, "a forced lock is one-shot");
    }

    #[tokio::test]
    async fn test_failed_snapshots_open_breaker() {
        let mut broker = MockBroker::new();
        broker
            .expect_get_tick()
            .returning(|_| Err(BrokerError::Transport("connection refused".to_string())));
        broker
            .expect_get_positions()
            .returning(|| Err(BrokerError::Transport("connection refused".to_string())));
        broker
            .expect_account_balance()
            .returning(|| Err(BrokerError::Transport("connection refused".to_string())));

        let mut config = Config::default();
        config.engine.max_consecutive_failed_cycles = 2;
        let config = Arc::new(config);
        let events = EventBus::default();
        let mut ctx = EngineContext::new(&config);
        let mut pipeline = Pipeline::new(config.clone());
        let now = Utc::now();

        let first = pipeline.run_cycle(&mut ctx, &broker, &events, now).await;
        assert!(first.failed);
        assert_eq!(first.breaker, BreakerState::Closed { failures: 1 });
        assert_eq!(first.next_interval, Duration::from_millis(config.engine.scan_interval_ms));

        let second = pipeline.run_cycle(&mut ctx, &broker, &events, now).await;
        assert!(matches!(second.breaker, BreakerState::Open { .. }));
        assert_eq!(second.next_interval, Duration::from_millis(config.engine.slow_interval_ms));
    }
}
