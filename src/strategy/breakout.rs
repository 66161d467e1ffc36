//! Range breakout: trade when the current mid clears the prior window's
//! high or low.

use crate::broker::Side;
use crate::config::BreakoutConfig;
use crate::market::{pip_factor, MarketSnapshotCache};
use crate::strategy::scanner::Scanner;
use crate::strategy::signal::{BreakoutSignal, Leg, Signal, SignalMeta, StrategyKind};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub struct BreakoutScanner {
    config: BreakoutConfig,
}

impl BreakoutScanner {
    pub fn new(config: BreakoutConfig) -> Self {
        Self { config }
    }

    fn evaluate(&self, instrument: &str, market: &MarketSnapshotCache, now: DateTime<Utc>) -> Option<Signal> {
        let history = market.price_history(instrument)?;
        let window = self.config.window;
        if history.len() < window + 1 {
            return None;
        }
        let mids = history.last_mids(window + 1);
        let (current, prior) = mids.split_last()?;
        let high = prior.iter().copied().max()?;
        let low = prior.iter().copied().min()?;
        let range = high - low;
        let factor = pip_factor(instrument);
        let range_pips = range * factor;
        if range_pips < self.config.min_range_pips || range == Decimal::ZERO {
            return None;
        }

        let (side, level, excess) = if *current > high {
            (Side::Buy, high, *current - high)
        } else if *current < low {
            (Side::Sell, low, low - *current)
        } else {
            return None;
        };

        let confidence = dec!(65) + (excess / range * dec!(25)).min(dec!(25));
        Some(Signal::Breakout(BreakoutSignal {
            meta: SignalMeta::new(confidence, range_pips * dec!(0.5), now),
            leg: Leg::new(instrument, side),
            level,
            range_pips: range_pips.round_dp(2),
        }))
    }
}

impl Scanner for BreakoutScanner {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Breakout
    }

    fn scan(&self, market: &MarketSnapshotCache, now: DateTime<Utc>) -> Vec<Signal> {
        market
            .instruments()
            .filter_map(|i| self.evaluate(i, market, now))
            .collect()
    }
}
