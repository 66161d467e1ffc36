//! State owned by the scan loop, plus the read-only status snapshot.

use crate::config::Config;
use crate::market::MarketSnapshotCache;
use crate::position::PositionBook;
use crate::risk::{
    BreakerState, CycleBreaker, DrawdownTracker, HedgeRecommendation, PortfolioRisk, RecoveryEngine, RecoveryStats,
    RiskLevel,
};
use crate::strategy::StrategyKind;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Running counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub cycles: u64,
    /// Admitted signals dispatched for execution
    pub total_signals: u64,
    /// Signals whose every leg filled
    pub executed_trades: u64,
    pub failed_executions: u64,
    pub closed_positions: u64,
    pub recovery_orders: u64,
    pub liquidations: u64,
}

/// Everything a cycle reads and writes. Only the scan loop holds one.
pub struct EngineContext {
    pub market: MarketSnapshotCache,
    pub book: PositionBook,
    pub recovery: RecoveryEngine,
    pub breaker: CycleBreaker,
    pub drawdown: DrawdownTracker,
    /// Latest portfolio assessment
    pub risk: PortfolioRisk,
    /// Operator asked for a profit lock; consumed by the next cycle with fresh positions
    pub force_lock_requested: bool,
    /// Last successful open per instrument, for admission cooldowns
    pub last_trade: HashMap<String, DateTime<Utc>>,
    pub balance: Decimal,
    pub stats: EngineStats,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl EngineContext {
    pub fn new(config: &Config) -> Self {
        Self {
            market: MarketSnapshotCache::new(&config.market),
            book: PositionBook::new(),
            recovery: RecoveryEngine::new(config.recovery.clone(), config.sizing.clone()),
            breaker: CycleBreaker::new(
                config.engine.max_consecutive_failed_cycles,
                config.engine.breaker_cooldown_cycles,
            ),
            drawdown: DrawdownTracker::new(),
            risk: PortfolioRisk::default(),
            force_lock_requested: false,
            last_trade: HashMap::new(),
            balance: Decimal::ZERO,
            stats: EngineStats::default(),
            last_cycle_at: None,
        }
    }

    pub fn equity(&self) -> Decimal {
        self.balance + self.book.total_profit()
    }

    pub fn status(&self, running: bool, generated: &BTreeMap<StrategyKind, u64>) -> EngineStatus {
        let stats = &self.stats;
        let success_rate = if stats.total_signals == 0 {
            Decimal::ZERO
        } else {
            (Decimal::from(stats.executed_trades) / Decimal::from(stats.total_signals) * Decimal::ONE_HUNDRED)
                .round_dp(2)
        };

        EngineStatus {
            running,
            total_signals: stats.total_signals,
            executed_trades: stats.executed_trades,
            success_rate,
            open_positions: self.book.len(),
            per_strategy_counts: generated.clone(),
            cycles: stats.cycles,
            failed_executions: stats.failed_executions,
            closed_positions: stats.closed_positions,
            recovery_orders: stats.recovery_orders,
            liquidations: stats.liquidations,
            breaker: self.breaker.state(),
            active_recoveries: self.recovery.active_count(),
            recovery_stats: self.recovery.stats().clone(),
            balance: self.balance,
            equity: self.equity(),
            drawdown: self.drawdown.current(),
            session_mdd: self.drawdown.session_mdd(),
            risk_score: self.risk.score,
            risk_level: self.risk.level,
            net_exposure: self.book.net_exposure(),
            hedge_recommendations: self.risk.hedges.clone(),
            last_cycle_at: self.last_cycle_at,
        }
    }
}

/// Copy of engine counters handed to readers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub total_signals: u64,
    pub executed_trades: u64,
    /// executed / total, in percent
    pub success_rate: Decimal,
    pub open_positions: usize,
    /// Signals generated per strategy
    pub per_strategy_counts: BTreeMap<StrategyKind, u64>,
    pub cycles: u64,
    pub failed_executions: u64,
    pub closed_positions: u64,
    pub recovery_orders: u64,
    pub liquidations: u64,
    pub breaker: BreakerState,
    pub active_recoveries: usize,
    pub recovery_stats: RecoveryStats,
    pub balance: Decimal,
    pub equity: Decimal,
    /// Fraction below the session equity high
    pub drawdown: Decimal,
    pub session_mdd: Decimal,
    /// 0 to 100, higher is healthier
    pub risk_score: Decimal,
    pub risk_level: RiskLevel,
    /// Net lots per currency
    pub net_exposure: BTreeMap<String, Decimal>,
    pub hedge_recommendations: Vec<HedgeRecommendation>,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl Default for EngineStatus {
    fn default() -> Self {
        EngineContext::new(&Config::default()).status(false, &BTreeMap::new())
    }
}
