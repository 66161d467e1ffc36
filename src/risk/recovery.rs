//! Recovery escalation for underwater instruments.
//!
//! Each instrument runs at most one method at a time, walking the configured
//! ladder (martingale, grid, hedge, correlation by default):
//! - a fresh instrument starts with the first ladder method whose trigger fires
//! - an active method keeps control until it reaches its cap
//! - a capped method is marked exhausted and later ladder methods take over
//!
//! Planning and bookkeeping are split: `plan` proposes orders, and the caller
//! reports each outcome through `record_fill` or `record_failure`. State for an
//! instrument is cleared once its positions are flat or net profitable, and
//! the global emergency check clears everything.

use crate::broker::Side;
use crate::config::{RecoveryConfig, RecoveryMethod, SizingConfig};
use crate::market::MarketSnapshotCache;
use crate::position::{recovery_label, Position, PositionBook, PositionTag};
use crate::utils::clamp_lot;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Escalation progress for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryState {
    pub instrument: String,
    pub active: Option<RecoveryMethod>,
    /// Level reached by the active method
    pub level: u32,
    pub exhausted: Vec<RecoveryMethod>,
    pub hedge_opened: bool,
    pub correlation_opened: bool,
    /// Recovery orders placed for this instrument
    pub tickets: Vec<u64>,
    pub started_at: DateTime<Utc>,
    pub last_escalation: Option<DateTime<Utc>>,
}

impl RecoveryState {
    fn new(instrument: &str, now: DateTime<Utc>) -> Self {
        Self {
            instrument: instrument.to_string(),
            active: None,
            level: 0,
            exhausted: Vec::new(),
            hedge_opened: false,
            correlation_opened: false,
            tickets: Vec::new(),
            started_at: now,
            last_escalation: None,
        }
    }

    fn is_exhausted(&self, method: RecoveryMethod) -> bool {
        self.exhausted.contains(&method)
    }

    /// Level of `method` if it is the active one, else zero.
    fn level_of(&self, method: RecoveryMethod) -> u32 {
        if self.active == Some(method) {
            self.level
        } else {
            0
        }
    }

    fn exhaust(&mut self, method: RecoveryMethod) {
        if !self.is_exhausted(method) {
            self.exhausted.push(method);
        }
        if self.active == Some(method) {
            self.active = None;
            self.level = 0;
        }
    }
}

/// A proposed recovery order.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryOrder {
    /// Instrument being recovered
    pub origin: String,
    /// Instrument the order is placed on
    pub instrument: String,
    pub method: RecoveryMethod,
    pub level: u32,
    pub side: Side,
    pub size: Decimal,
    pub label: String,
}

/// Recovery orders filled per method and instruments brought back to profit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryStats {
    pub martingale: u64,
    pub grid: u64,
    pub hedge: u64,
    pub correlation: u64,
    /// Instruments cleared because their net profit turned non-negative
    pub recovered: u64,
    /// Net profit of those instruments when cleared
    pub recovered_profit: Decimal,
}

impl RecoveryStats {
    fn record(&mut self, method: RecoveryMethod) {
        match method {
            RecoveryMethod::Martingale => self.martingale += 1,
            RecoveryMethod::Grid => self.grid += 1,
            RecoveryMethod::Hedge => self.hedge += 1,
            RecoveryMethod::Correlation => self.correlation += 1,
        }
    }
}

/// Aggregate loss beyond the recovery ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct EmergencyBreach {
    pub loss: Decimal,
    pub drawdown_pct: Decimal,
}

pub struct RecoveryEngine {
    config: RecoveryConfig,
    sizing: SizingConfig,
    states: BTreeMap<String, RecoveryState>,
    stats: RecoveryStats,
}

impl RecoveryEngine {
    pub fn new(config: RecoveryConfig, sizing: SizingConfig) -> Self {
        Self {
            config,
            sizing,
            states: BTreeMap::new(),
            stats: RecoveryStats::default(),
        }
    }

    pub fn stats(&self) -> &RecoveryStats {
        &self.stats
    }

    pub fn states(&self) -> &BTreeMap<String, RecoveryState> {
        &self.states
    }

    pub fn state(&self, instrument: &str) -> Option<&RecoveryState> {
        self.states.get(instrument)
    }

    pub fn active_count(&self) -> usize {
        self.states.len()
    }

    /// Instruments with recovery in progress.
    pub fn recovering(&self) -> BTreeSet<String> {
        self.states.keys().cloned().collect()
    }

    pub fn clear_all(&mut self) {
        if !self.states.is_empty() {
            info!(cleared = self.states.len(), "Recovery state cleared");
        }
        self.states.clear();
    }

    /// Rebuild state from recovery-tagged positions, e.g. after a restart.
    pub fn rebuild(&mut self, book: &PositionBook, now: DateTime<Utc>) {
        self.states.clear();
        for position in book.positions() {
            let PositionTag::Recovery { method, level, origin } = &position.tag else {
                continue;
            };
            let key = origin.clone().unwrap_or_else(|| position.instrument.clone());
            let state = self
                .states
                .entry(key.clone())
                .or_insert_with(|| RecoveryState::new(&key, now));

            state.tickets.push(position.ticket);
            state.started_at = state.started_at.min(position.open_time);
            state.last_escalation = Some(
                state
                    .last_escalation
                    .map_or(position.open_time, |t| t.max(position.open_time)),
            );
            match method {
                RecoveryMethod::Hedge => state.hedge_opened = true,
                RecoveryMethod::Correlation => state.correlation_opened = true,
                _ => {}
            }

            let rank = |m: RecoveryMethod| self.config.ladder.iter().position(|x| *x == m);
            let replaces = match state.active {
                None => true,
                Some(current) => rank(*method) > rank(current),
            };
            if replaces {
                state.active = Some(*method);
                state.level = *level;
            } else if state.active == Some(*method) {
                state.level = state.level.max(*level);
            }
        }

        // methods earlier in the ladder than the active one are spent
        for state in self.states.values_mut() {
            let Some(active) = state.active else { continue };
            for method in &self.config.ladder {
                if *method == active {
                    break;
                }
                if !state.exhausted.contains(method) {
                    state.exhausted.push(*method);
                }
            }
        }

        if !self.states.is_empty() {
            info!(instruments = self.states.len(), "Recovery state rebuilt from position labels");
        }
    }

    /// Drop state for instruments that are flat or back in profit.
    pub fn reconcile(&mut self, book: &PositionBook) {
        let live: BTreeSet<u64> = book.tickets().into_iter().collect();
        let stats = &mut self.stats;
        self.states.retain(|instrument, state| {
            state.tickets.retain(|t| live.contains(t));

            let on_instrument: Vec<&Position> = book.for_instrument(instrument).collect();
            if on_instrument.is_empty() {
                info!(%instrument, "Recovery complete: instrument flat");
                return false;
            }
            let tracked_elsewhere: Decimal = state
                .tickets
                .iter()
                .filter_map(|t| book.get(*t))
                .filter(|p| p.instrument != *instrument)
                .map(|p| p.profit)
                .sum();
            let net = on_instrument.iter().map(|p| p.profit).sum::<Decimal>() + tracked_elsewhere;
            if net >= Decimal::ZERO {
                info!(%instrument, %net, "Recovery complete: net profitable");
                stats.recovered += 1;
                stats.recovered_profit += net;
                return false;
            }
            true
        });
    }

    /// Aggregate loss or drawdown beyond the global ceiling.
    pub fn check_emergency(&self, book: &PositionBook, balance: Decimal) -> Option<EmergencyBreach> {
        let loss = (-book.total_profit()).max(Decimal::ZERO);
        if loss.is_zero() {
            return None;
        }
        let drawdown_pct = if balance > Decimal::ZERO {
            loss / balance * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };
        if loss >= self.config.emergency_loss_usd || drawdown_pct >= self.config.emergency_drawdown_pct {
            return Some(EmergencyBreach {
                loss,
                drawdown_pct: drawdown_pct.round_dp(2),
            });
        }
        None
    }

    fn is_underwater(&self, anchor: &Position) -> bool {
        anchor.profit < -self.config.underwater_loss_usd || anchor.pips() < -self.config.underwater_pips
    }

    /// Oldest strategy or manual position on each instrument.
    fn anchors(book: &PositionBook) -> BTreeMap<String, &Position> {
        let mut anchors: BTreeMap<String, &Position> = BTreeMap::new();
        for position in book.positions().filter(|p| !p.is_recovery()) {
            anchors
                .entry(position.instrument.clone())
                .and_modify(|a| {
                    if (position.open_time, position.ticket) < (a.open_time, a.ticket) {
                        *a = position;
                    }
                })
                .or_insert(position);
        }
        anchors
    }

    fn at_cap(&self, method: RecoveryMethod, state: &RecoveryState) -> bool {
        match method {
            RecoveryMethod::Martingale => state.level_of(method) >= self.config.martingale.max_levels,
            RecoveryMethod::Grid => state.level_of(method) >= self.config.grid.max_levels,
            RecoveryMethod::Hedge => state.hedge_opened,
            RecoveryMethod::Correlation => state.correlation_opened,
        }
    }

    /// Recovery sizes never drop below the minimum lot.
    fn size(&self, raw: Decimal, method_max: Decimal) -> Option<Decimal> {
        clamp_lot(
            raw.max(self.sizing.min_lot),
            self.sizing.min_lot,
            method_max.min(self.sizing.max_lot),
            self.sizing.lot_step,
        )
    }

    fn order(&self, anchor: &Position, instrument: &str, method: RecoveryMethod, level: u32, side: Side, size: Decimal) -> RecoveryOrder {
        let origin = (instrument != anchor.instrument).then_some(anchor.instrument.as_str());
        RecoveryOrder {
            origin: anchor.instrument.clone(),
            instrument: instrument.to_string(),
            method,
            level,
            side,
            size,
            label: recovery_label(method, level, origin),
        }
    }

    /// Orders `method` would place now, if its trigger fires.
    fn trigger(
        &self,
        method: RecoveryMethod,
        anchor: &Position,
        state: &RecoveryState,
        market: &MarketSnapshotCache,
    ) -> Option<Vec<RecoveryOrder>> {
        let pip_loss = -anchor.pips();
        let loss = -anchor.profit;

        match method {
            RecoveryMethod::Martingale => {
                let m = &self.config.martingale;
                if pip_loss < m.trigger_pips {
                    return None;
                }
                let level = state.level_of(method) + 1;
                let size = self.size(anchor.size * m.multiplier.powu(u64::from(level)), m.max_lot)?;
                Some(vec![self.order(anchor, &anchor.instrument, method, level, anchor.side, size)])
            }
            RecoveryMethod::Grid => {
                let g = &self.config.grid;
                if g.step_pips <= Decimal::ZERO || pip_loss < g.step_pips {
                    return None;
                }
                let needed = (pip_loss / g.step_pips)
                    .floor()
                    .to_u32()
                    .unwrap_or(0)
                    .min(g.max_levels);
                let current = state.level_of(method);
                let orders: Vec<RecoveryOrder> = (current + 1..=needed)
                    .filter_map(|level| {
                        let size = self.size(anchor.size * g.lot_multiplier.powu(u64::from(level - 1)), g.max_lot)?;
                        Some(self.order(anchor, &anchor.instrument, method, level, anchor.side, size))
                    })
                    .collect();
                (!orders.is_empty()).then_some(orders)
            }
            RecoveryMethod::Hedge => {
                let h = &self.config.hedge;
                if loss < h.trigger_loss_usd {
                    return None;
                }
                let size = self.size(anchor.size * h.ratio, self.sizing.max_lot)?;
                Some(vec![self.order(anchor, &anchor.instrument, method, 1, anchor.side.opposite(), size)])
            }
            RecoveryMethod::Correlation => {
                let c = &self.config.correlation;
                if loss < c.trigger_loss_usd {
                    return None;
                }
                let hedge = c
                    .hedges_for(&anchor.instrument)
                    .iter()
                    .find(|h| market.quote(h).is_some())?;
                let side = if c.is_positive(&anchor.instrument, hedge) {
                    anchor.side
                } else {
                    anchor.side.opposite()
                };
                let size = self.size(anchor.size * c.hedge_strength, self.sizing.max_lot)?;
                Some(vec![self.order(anchor, hedge, method, 1, side, size)])
            }
        }
    }

    /// Propose this cycle's recovery orders, at most `capacity` of them.
    ///
    /// Orders past the capacity are dropped from the highest level down and
    /// the instrument is retried on a later cycle.
    pub fn plan(
        &mut self,
        book: &PositionBook,
        market: &MarketSnapshotCache,
        capacity: usize,
        now: DateTime<Utc>,
    ) -> Vec<RecoveryOrder> {
        if !self.config.enabled {
            return Vec::new();
        }
        let cooldown = Duration::seconds(self.config.escalation_cooldown_secs);
        let mut planned = Vec::new();

        for (instrument, anchor) in Self::anchors(book) {
            if !self.is_underwater(anchor) {
                continue;
            }
            let mut state = self
                .states
                .get(&instrument)
                .cloned()
                .unwrap_or_else(|| RecoveryState::new(&instrument, now));
            if state.last_escalation.is_some_and(|t| now - t < cooldown) {
                debug!(%instrument, "Recovery escalation cooling down");
                continue;
            }

            let mut orders = self.next_orders(anchor, &mut state, market);
            if orders.is_empty() && state.active.is_none() && state.exhausted.is_empty() {
                // nothing triggered and nothing to remember
                continue;
            }
            let room = capacity.saturating_sub(planned.len());
            if orders.len() > room {
                info!(
                    %instrument,
                    wanted = orders.len(),
                    room,
                    capacity,
                    "Recovery orders held back at the open-position ceiling"
                );
                orders.truncate(room);
            }
            self.states.insert(instrument, state);
            planned.extend(orders);
        }
        planned
    }

    fn next_orders(&self, anchor: &Position, state: &mut RecoveryState, market: &MarketSnapshotCache) -> Vec<RecoveryOrder> {
        if let Some(active) = state.active {
            if !self.at_cap(active, state) {
                return self.trigger(active, anchor, state, market).unwrap_or_default();
            }
            info!(instrument = %state.instrument, method = %active, level = state.level, "Recovery method exhausted");
            state.exhaust(active);
        }

        // an exhausted method hands over to the methods after it
        let start = self
            .config
            .ladder
            .iter()
            .rposition(|m| state.is_exhausted(*m))
            .map_or(0, |i| i + 1);

        for method in self.config.ladder.iter().skip(start).copied() {
            if state.is_exhausted(method) {
                continue;
            }
            if self.at_cap(method, state) {
                state.exhaust(method);
                continue;
            }
            if let Some(orders) = self.trigger(method, anchor, state, market) {
                return orders;
            }
        }
        Vec::new()
    }

    /// Record a filled recovery order.
    pub fn record_fill(&mut self, order: &RecoveryOrder, ticket: u64, now: DateTime<Utc>) {
        let state = self
            .states
            .entry(order.origin.clone())
            .or_insert_with(|| RecoveryState::new(&order.origin, now));

        if state.active != Some(order.method) {
            state.active = Some(order.method);
            state.level = 0;
        }
        state.level = state.level.max(order.level);
        match order.method {
            RecoveryMethod::Hedge => state.hedge_opened = true,
            RecoveryMethod::Correlation => state.correlation_opened = true,
            _ => {}
        }
        state.tickets.push(ticket);
        state.last_escalation = Some(now);
        self.stats.record(order.method);

        info!(
            instrument = %order.origin,
            target = %order.instrument,
            method = %order.method,
            level = order.level,
            side = %order.side,
            size = %order.size,
            ticket,
            "Recovery order filled"
        );
    }

    /// A recovery order failed; hold off until the cooldown passes.
    pub fn record_failure(&mut self, origin: &str, now: DateTime<Utc>) {
        if let Some(state) = self.states.get_mut(origin) {
            state.last_escalation = Some(now);
        }
        warn!(instrument = %origin, "Recovery order failed, retrying after cooldown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarketConfig;
    use crate::market::Quote;
    use crate::position::fixtures::position;
    use rust_decimal_macros::dec;

    fn engine() -> RecoveryEngine {
        RecoveryEngine::new(
            RecoveryConfig {
                escalation_cooldown_secs: 0,
                ..RecoveryConfig::default()
            },
            SizingConfig::default(),
        )
    }

    fn market() -> MarketSnapshotCache {
        let now = Utc::now();
        let mut cache = MarketSnapshotCache::new(&MarketConfig::default());
        cache.ingest(
            vec![
                Quote::new("EURUSD", dec!(1.0970), dec!(1.0971), now),
                Quote::new("GBPUSD", dec!(1.3000), dec!(1.3001), now),
            ],
            now,
        );
        cache
    }

    /// BUY EURUSD 0.01 from 1.1000, `pips` under water with `profit`.
    fn losing(book: &mut PositionBook, pips: i64, profit: Decimal) {
        let current = dec!(1.1000) - Decimal::new(pips, 4);
        book.insert(position(1, "EURUSD", Side::Buy, dec!(1.1000), current, profit, 30, "HFX-MOMO"));
    }

    /// Run plan + fill until no more orders, returning every order placed.
    fn drive(engine: &mut RecoveryEngine, book: &PositionBook, rounds: usize) -> Vec<RecoveryOrder> {
        let market = market();
        let mut placed = Vec::new();
        for round in 0..rounds {
            let now = Utc::now() + Duration::seconds(round as i64);
            for (i, order) in engine.plan(book, &market, usize::MAX, now).into_iter().enumerate() {
                engine.record_fill(&order, 1000 + (round * 10 + i) as u64, now);
                placed.push(order);
            }
        }
        placed
    }

    #[test]
    fn test_martingale_sizes_and_cap() {
        let mut engine = engine();
        let mut book = PositionBook::new();
        losing(&mut book, 22, dec!(-2.2));

        let placed = drive(&mut engine, &book, 6);
        let martingale: Vec<_> = placed.iter().filter(|o| o.method == RecoveryMethod::Martingale).collect();
        assert_eq!(martingale.len(), 3, "never past max_levels");
        // 0.01 * 1.5^n snapped down to 0.01 lots
        assert_eq!(martingale[0].size, dec!(0.01));
        assert_eq!(martingale[1].size, dec!(0.02));
        assert_eq!(martingale[2].size, dec!(0.03));
        assert_eq!(martingale[2].label, "HFX-RCV-MART-L3");
        assert!(martingale.iter().all(|o| o.side == Side::Buy));

        // 22 pips is one grid step: grid takes over with a single level
        let grid: Vec<_> = placed.iter().filter(|o| o.method == RecoveryMethod::Grid).collect();
        assert_eq!(grid.len(), 1);
        let state = engine.state("EURUSD").unwrap();
        assert_eq!(state.exhausted, vec![RecoveryMethod::Martingale]);
        assert_eq!(state.active, Some(RecoveryMethod::Grid));
    }

    #[test]
    fn test_idempotent_once_every_method_is_capped() {
        let mut engine = engine();
        let mut book = PositionBook::new();
        // deep enough for every trigger: 100 pips, $150
        losing(&mut book, 100, dec!(-150));

        let placed = drive(&mut engine, &book, 12);
        let count = |m: RecoveryMethod| placed.iter().filter(|o| o.method == m).count();
        assert_eq!(count(RecoveryMethod::Martingale), 3);
        assert_eq!(count(RecoveryMethod::Grid), 5);
        assert_eq!(count(RecoveryMethod::Hedge), 1);
        assert_eq!(count(RecoveryMethod::Correlation), 1);

        let hedge = placed.iter().find(|o| o.method == RecoveryMethod::Hedge).unwrap();
        assert_eq!(hedge.side, Side::Sell);
        let corr = placed.iter().find(|o| o.method == RecoveryMethod::Correlation).unwrap();
        // EURUSD/GBPUSD move together
        assert_eq!((corr.instrument.as_str(), corr.side), ("GBPUSD", Side::Buy));
        assert_eq!(corr.label, "HFX-RCV-CORR-L1-EURUSD");

        assert!(drive(&mut engine, &book, 3).is_empty(), "no orders once capped");
    }

    #[test]
    fn test_grid_places_missing_levels_at_once() {
        let mut engine = RecoveryEngine::new(
            RecoveryConfig {
                escalation_cooldown_secs: 0,
                ladder: vec![RecoveryMethod::Grid],
                ..RecoveryConfig::default()
            },
            SizingConfig::default(),
        );
        let mut book = PositionBook::new();
        losing(&mut book, 47, dec!(-4.7));

        let orders = engine.plan(&book, &market(), usize::MAX, Utc::now());
        let levels: Vec<u32> = orders.iter().map(|o| o.level).collect();
        assert_eq!(levels, vec![1, 2, 3]);
    }

    #[test]
    fn test_capacity_trims_grid_levels() {
        let mut engine = RecoveryEngine::new(
            RecoveryConfig {
                escalation_cooldown_secs: 0,
                ladder: vec![RecoveryMethod::Grid],
                ..RecoveryConfig::default()
            },
            SizingConfig::default(),
        );
        let mut book = PositionBook::new();
        losing(&mut book, 47, dec!(-4.7));

        assert!(engine.plan(&book, &market(), 0, Utc::now()).is_empty());
        let orders = engine.plan(&book, &market(), 2, Utc::now());
        let levels: Vec<u32> = orders.iter().map(|o| o.level).collect();
        assert_eq!(levels, vec![1, 2]);

        engine.record_fill(&orders[0], 501, Utc::now());
        engine.record_fill(&orders[1], 502, Utc::now());
        let rest = engine.plan(&book, &market(), 5, Utc::now());
        assert_eq!(rest.iter().map(|o| o.level).collect::<Vec<_>>(), vec![3]);
        assert_eq!(engine.stats().grid, 2);
    }

    #[test]
    fn test_cooldown_blocks_back_to_back_escalation() {
        let mut engine = RecoveryEngine::new(RecoveryConfig::default(), SizingConfig::default());
        let mut book = PositionBook::new();
        losing(&mut book, 25, dec!(-2.5));
        let now = Utc::now();

        let first = engine.plan(&book, &market(), usize::MAX, now);
        assert_eq!(first.len(), 1);
        engine.record_fill(&first[0], 77, now);
        assert!(engine.plan(&book, &market(), usize::MAX, now + Duration::seconds(5)).is_empty());
        assert_eq!(engine.plan(&book, &market(), usize::MAX, now + Duration::seconds(61)).len(), 1);
    }

    #[test]
    fn test_shallow_loss_starts_nothing() {
        let mut engine = engine();
        let mut book = PositionBook::new();
        losing(&mut book, 5, dec!(-0.5));
        assert!(engine.plan(&book, &market(), usize::MAX, Utc::now()).is_empty());
        assert_eq!(engine.active_count(), 0);
    }

    #[test]
    fn test_reconcile_clears_flat_and_profitable() {
        let mut engine = engine();
        let mut book = PositionBook::new();
        losing(&mut book, 25, dec!(-2.5));
        drive(&mut engine, &book, 1);
        assert!(engine.recovering().contains("EURUSD"));

        // still losing: kept
        engine.reconcile(&book);
        assert_eq!(engine.active_count(), 1);

        // back in profit once the recovery leg is counted
        book.insert(position(1000, "EURUSD", Side::Buy, dec!(1.0975), dec!(1.1000), dec!(3), 1, "HFX-RCV-MART-L1"));
        engine.reconcile(&book);
        assert_eq!(engine.active_count(), 0);
        assert_eq!(engine.stats().recovered, 1);
        assert_eq!(engine.stats().recovered_profit, dec!(0.5));
        assert_eq!(engine.stats().martingale, 1);

        drive(&mut engine, &book, 1);
        book.clear();
        engine.reconcile(&book);
        assert_eq!(engine.active_count(), 0);
    }

    #[test]
    fn test_emergency_thresholds() {
        let engine = engine();
        let mut book = PositionBook::new();
        losing(&mut book, 50, dec!(-400));
        assert!(engine.check_emergency(&book, dec!(10000)).is_none());

        let breach = engine.check_emergency(&book, dec!(2000)).unwrap();
        assert_eq!(breach.drawdown_pct, dec!(20));

        book.insert(position(2, "GBPUSD", Side::Sell, dec!(1.3), dec!(1.31), dec!(-650), 5, ""));
        assert!(engine.check_emergency(&book, dec!(100000)).is_some());
    }

    #[test]
    fn test_rebuild_from_labels() {
        let mut book = PositionBook::new();
        losing(&mut book, 60, dec!(-60));
        book.insert(position(11, "EURUSD", Side::Buy, dec!(1.099), dec!(1.094), dec!(-5), 20, "HFX-RCV-GRID-L1"));
        book.insert(position(12, "EURUSD", Side::Buy, dec!(1.097), dec!(1.094), dec!(-3), 10, "HFX-RCV-GRID-L2"));
        book.insert(position(13, "GBPUSD", Side::Buy, dec!(1.30), dec!(1.30), dec!(0), 5, "Corr-USDJPY"));

        let mut engine = engine();
        engine.rebuild(&book, Utc::now());

        let eur = engine.state("EURUSD").unwrap();
        assert_eq!(eur.active, Some(RecoveryMethod::Grid));
        assert_eq!(eur.level, 2);
        assert_eq!(eur.exhausted, vec![RecoveryMethod::Martingale]);
        assert_eq!(eur.tickets, vec![11, 12]);

        let jpy = engine.state("USDJPY").unwrap();
        assert!(jpy.correlation_opened);
        assert_eq!(jpy.exhausted.len(), 3);
    }
}
