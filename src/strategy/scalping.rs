//! Scalping: tight spread plus live volatility, follow the last tick.

use crate::broker::Side;
use crate::config::ScalpingConfig;
use crate::market::{MarketSnapshotCache, Quote};
use crate::strategy::scanner::Scanner;
use crate::strategy::signal::{Leg, ScalpSignal, Signal, SignalMeta, StrategyKind};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub struct ScalpingScanner {
    config: ScalpingConfig,
}

impl ScalpingScanner {
    pub fn new(config: ScalpingConfig) -> Self {
        Self { config }
    }

    fn evaluate(&self, quote: &Quote, market: &MarketSnapshotCache, now: DateTime<Utc>) -> Option<Signal> {
        let spread = quote.spread_pips();
        if spread >= self.config.max_spread_pips {
            return None;
        }
        let volatility = market.volatility_pips(&quote.instrument);
        if volatility <= self.config.min_volatility_pips {
            return None;
        }

        let last = market.price_history(&quote.instrument)?.last_mids(2);
        let [prev, current] = last.as_slice() else {
            return None;
        };
        let side = match current.cmp(prev) {
            std::cmp::Ordering::Greater => Side::Buy,
            std::cmp::Ordering::Less => Side::Sell,
            std::cmp::Ordering::Equal => return None,
        };

        let confidence = dec!(45) + (volatility * dec!(5)).min(dec!(25));
        // expect roughly one average tick of movement
        let edge = (volatility - spread).max(Decimal::ZERO);

        Some(Signal::Scalp(ScalpSignal {
            meta: SignalMeta::new(confidence, edge, now),
            leg: Leg::new(&quote.instrument, side),
            spread_pips: spread.round_dp(2),
            volatility_pips: volatility.round_dp(2),
        }))
    }
}

impl Scanner for ScalpingScanner {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Scalping
    }

    fn scan(&self, market: &MarketSnapshotCache, now: DateTime<Utc>) -> Vec<Signal> {
        market
            .quotes()
            .filter_map(|q| self.evaluate(q, market, now))
            .collect()
    }
}
