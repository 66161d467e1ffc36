//! Open positions as the engine sees them.
//!
//! The book is rebuilt from the terminal's position list every cycle; the
//! label on each position tells which strategy or recovery method owns it.

pub mod label;

pub use label::{parse_label, recovery_label, strategy_label, PositionTag, LABEL_PREFIX};

use crate::broker::{BrokerPosition, Side};
use crate::market::{currencies, pip_factor};
use crate::strategy::StrategyKind;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub ticket: u64,
    pub instrument: String,
    pub side: Side,
    pub size: Decimal,
    pub open_price: Decimal,
    pub current_price: Decimal,
    /// Floating profit in account currency
    pub profit: Decimal,
    pub open_time: DateTime<Utc>,
    pub label: String,
    #[serde(skip)]
    pub tag: PositionTag,
}

impl Position {
    /// Signed move in the position's favour, in pips.
    pub fn pips(&self) -> Decimal {
        (self.current_price - self.open_price) * self.side.sign() * pip_factor(&self.instrument)
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.open_time
    }

    pub fn is_recovery(&self) -> bool {
        self.tag.is_recovery()
    }

    pub fn strategy(&self) -> Option<StrategyKind> {
        self.tag.strategy()
    }
}

impl From<BrokerPosition> for Position {
    fn from(p: BrokerPosition) -> Self {
        let tag = parse_label(&p.label);
        Self {
            ticket: p.ticket,
            instrument: p.instrument,
            side: p.side,
            size: p.size,
            open_price: p.open_price,
            current_price: p.current_price,
            profit: p.profit,
            open_time: p.open_time,
            label: p.label,
            tag,
        }
    }
}

/// Open positions keyed by ticket.
#[derive(Debug, Clone, Default)]
pub struct PositionBook {
    positions: BTreeMap<u64, Position>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the book with the terminal's current view.
    pub fn sync(&mut self, positions: Vec<BrokerPosition>) {
        self.positions = positions
            .into_iter()
            .map(|p| (p.ticket, Position::from(p)))
            .collect();
    }

    /// Record a position opened this cycle, before the next sync sees it.
    pub fn insert(&mut self, position: Position) {
        self.positions.insert(position.ticket, position);
    }

    pub fn remove(&mut self, ticket: u64) -> Option<Position> {
        self.positions.remove(&ticket)
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }

    pub fn get(&self, ticket: u64) -> Option<&Position> {
        self.positions.get(&ticket)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn tickets(&self) -> Vec<u64> {
        self.positions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn for_instrument<'a>(&'a self, instrument: &'a str) -> impl Iterator<Item = &'a Position> + 'a {
        self.positions.values().filter(move |p| p.instrument == instrument)
    }

    pub fn total_profit(&self) -> Decimal {
        self.positions.values().map(|p| p.profit).sum()
    }

    pub fn has_same_direction(&self, instrument: &str, side: Side) -> bool {
        self.for_instrument(instrument).any(|p| p.side == side)
    }

    /// Net size per currency: buying EURUSD is long EUR and short USD.
    pub fn net_exposure(&self) -> BTreeMap<String, Decimal> {
        let mut exposure: BTreeMap<String, Decimal> = BTreeMap::new();
        for p in self.positions.values() {
            let Some((base, quote)) = currencies(&p.instrument) else {
                continue;
            };
            let signed = p.size * p.side.sign();
            *exposure.entry(base.to_ascii_uppercase()).or_default() += signed;
            *exposure.entry(quote.to_ascii_uppercase()).or_default() -= signed;
        }
        exposure.retain(|_, v| !v.is_zero());
        exposure
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Position with a label, opened `age_minutes` ago.
    #[allow(clippy::too_many_arguments)]
    pub fn position(
        ticket: u64,
        instrument: &str,
        side: Side,
        open_price: Decimal,
        current_price: Decimal,
        profit: Decimal,
        age_minutes: i64,
        label: &str,
    ) -> Position {
        Position::from(BrokerPosition {
            ticket,
            instrument: instrument.to_string(),
            side,
            size: Decimal::new(1, 2),
            open_price,
            current_price,
            profit,
            open_time: Utc::now() - Duration::minutes(age_minutes),
            label: label.to_string(),
        })
    }
}
