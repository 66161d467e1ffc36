//! Admission control: decides which candidate signals may execute this cycle.
//!
//! Gates run in a fixed order:
//! - minimum confidence and edge
//! - strategy-specific maximum signal age
//! - same-direction exposure, per-instrument cooldown, instruments under recovery
//! - the per-currency exposure cap, when one is set
//! - the open-position ceiling
//!
//! Survivors are ranked by confidence then |edge| and taken greedily up to
//! the burst cap. Identical inputs always produce the identical selection.

use crate::config::{AdmissionConfig, EngineConfig};
use crate::market::currencies;
use crate::position::PositionBook;
use crate::strategy::signal::{Leg, Signal, StrategyKind};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

/// Why a candidate was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    LowConfidence,
    LowEdge,
    Expired,
    SameDirection,
    Cooldown,
    InRecovery,
    /// A currency is already at its net exposure cap in the leg's direction
    ExposureCap,
    Capacity,
    /// Lost to a higher-ranked signal on the same instrument
    Conflict,
    BurstCap,
}

pub struct AdmissionController {
    config: AdmissionConfig,
    max_open_positions: usize,
    burst_cap: usize,
    max_currency_exposure: Option<Decimal>,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig, engine: &EngineConfig) -> Self {
        Self {
            config,
            max_open_positions: engine.max_open_positions,
            burst_cap: engine.burst_cap,
            max_currency_exposure: None,
        }
    }

    /// Refuse legs that add to a currency already holding `lots` net.
    pub fn with_exposure_cap(mut self, lots: Decimal) -> Self {
        self.max_currency_exposure = Some(lots);
        self
    }

    fn max_age(&self, kind: StrategyKind) -> Duration {
        match kind {
            StrategyKind::Scalping => Duration::seconds(self.config.scalp_max_signal_age_secs),
            _ => Duration::seconds(self.config.max_signal_age_secs),
        }
    }

    fn cooldown(&self, kind: StrategyKind) -> Duration {
        match kind {
            StrategyKind::Scalping => Duration::seconds(self.config.scalp_cooldown_secs),
            _ => Duration::seconds(self.config.cooldown_secs),
        }
    }

    /// Per-signal gates that do not depend on other candidates.
    pub fn check(
        &self,
        signal: &Signal,
        book: &PositionBook,
        recovering: &BTreeSet<String>,
        last_trade: &HashMap<String, DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), RejectReason> {
        if signal.confidence() < self.config.min_confidence {
            return Err(RejectReason::LowConfidence);
        }
        if signal.edge_pips().abs() < self.config.min_edge_pips {
            return Err(RejectReason::LowEdge);
        }
        if now - signal.generated_at() > self.max_age(signal.kind()) {
            return Err(RejectReason::Expired);
        }

        let cooldown = self.cooldown(signal.kind());
        for leg in signal.legs() {
            if book.has_same_direction(&leg.instrument, leg.side) {
                return Err(RejectReason::SameDirection);
            }
            if recovering.contains(&leg.instrument) {
                return Err(RejectReason::InRecovery);
            }
            if last_trade
                .get(&leg.instrument)
                .is_some_and(|at| now - *at < cooldown)
            {
                return Err(RejectReason::Cooldown);
            }
        }

        if let Some(cap) = self.max_currency_exposure {
            let exposure = book.net_exposure();
            if signal.legs().iter().any(|leg| adds_past_cap(&exposure, leg, cap)) {
                return Err(RejectReason::ExposureCap);
            }
        }

        if book.len() + signal.legs().len() > self.max_open_positions {
            return Err(RejectReason::Capacity);
        }
        Ok(())
    }

    /// Filter, rank and cap this cycle's candidates.
    pub fn select(
        &self,
        candidates: Vec<Signal>,
        book: &PositionBook,
        recovering: &BTreeSet<String>,
        last_trade: &HashMap<String, DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Vec<Signal> {
        let total = candidates.len();
        let mut rejected: HashMap<RejectReason, usize> = HashMap::new();

        let mut eligible: Vec<Signal> = candidates
            .into_iter()
            .filter(|signal| match self.check(signal, book, recovering, last_trade, now) {
                Ok(()) => true,
                Err(reason) => {
                    *rejected.entry(reason).or_default() += 1;
                    false
                }
            })
            .collect();

        // stable: equal keys keep scanner order
        eligible.sort_by(|a, b| {
            b.confidence()
                .cmp(&a.confidence())
                .then_with(|| b.edge_pips().abs().cmp(&a.edge_pips().abs()))
        });

        let mut admitted = Vec::new();
        let mut claimed: BTreeSet<String> = BTreeSet::new();
        let mut reserved = 0usize;

        for signal in eligible {
            if admitted.len() >= self.burst_cap {
                *rejected.entry(RejectReason::BurstCap).or_default() += 1;
                continue;
            }
            let instruments = signal.instruments();
            if instruments.iter().any(|i| claimed.contains(i)) {
                *rejected.entry(RejectReason::Conflict).or_default() += 1;
                continue;
            }
            if book.len() + reserved + instruments.len() > self.max_open_positions {
                *rejected.entry(RejectReason::Capacity).or_default() += 1;
                continue;
            }
            debug!(
                strategy = %signal.kind(),
                instrument = %signal.primary_instrument(),
                confidence = %signal.confidence(),
                edge = %signal.edge_pips(),
                "Signal admitted"
            );
            reserved += instruments.len();
            claimed.extend(instruments);
            admitted.push(signal);
        }

        if total > 0 {
            let count = |r: RejectReason| rejected.get(&r).copied().unwrap_or(0);
            info!(
                candidates = total,
                admitted = admitted.len(),
                rejected_low_confidence = count(RejectReason::LowConfidence),
                rejected_low_edge = count(RejectReason::LowEdge),
                rejected_expired = count(RejectReason::Expired),
                rejected_same_direction = count(RejectReason::SameDirection),
                rejected_cooldown = count(RejectReason::Cooldown),
                rejected_in_recovery = count(RejectReason::InRecovery),
                rejected_exposure_cap = count(RejectReason::ExposureCap),
                rejected_capacity = count(RejectReason::Capacity),
                rejected_conflict = count(RejectReason::Conflict),
                rejected_burst_cap = count(RejectReason::BurstCap),
                "Admission complete"
            );
        }

        admitted
    }
}

fn adds_past_cap(exposure: &BTreeMap<String, Decimal>, leg: &Leg, cap: Decimal) -> bool {
    let Some((base, quote)) = currencies(&leg.instrument) else {
        return false;
    };
    let at_cap = |currency: &str, direction: Decimal| {
        exposure
            .get(&currency.to_ascii_uppercase())
            .is_some_and(|lots| *lots * direction >= cap)
    };
    let direction = leg.side.sign();
    at_cap(base, direction) || at_cap(quote, -direction)
}
