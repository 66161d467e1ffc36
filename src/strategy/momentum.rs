//! Short-window momentum: trade in the direction the price has moved away
//! from its recent mean.

use crate::broker::Side;
use crate::config::MomentumConfig;
use crate::market::{pip_factor, MarketSnapshotCache};
use crate::strategy::scanner::Scanner;
use crate::strategy::signal::{Leg, MomentumSignal, Signal, SignalMeta, StrategyKind};
use crate::utils::mean;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub struct MomentumScanner {
    config: MomentumConfig,
}

impl MomentumScanner {
    pub fn new(config: MomentumConfig) -> Self {
        Self { config }
    }

    fn evaluate(&self, instrument: &str, market: &MarketSnapshotCache, now: DateTime<Utc>) -> Option<Signal> {
        let history = market.price_history(instrument)?;
        if history.len() < self.config.window {
            return None;
        }
        let mids = history.last_mids(self.config.window);
        let current = *mids.last()?;
        let diff = current - mean(&mids);
        let strength = diff.abs() * pip_factor(instrument);

        if strength < self.config.min_strength_pips || diff == Decimal::ZERO {
            return None;
        }
        let side = if diff > Decimal::ZERO { Side::Buy } else { Side::Sell };
        let confidence = dec!(50) + (strength * dec!(10)).min(dec!(40));

        Some(Signal::Momentum(MomentumSignal {
            meta: SignalMeta::new(confidence, strength * dec!(1.5), now),
            leg: Leg::new(instrument, side),
            strength_pips: strength.round_dp(2),
        }))
    }
}

impl Scanner for MomentumScanner {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Momentum
    }

    fn scan(&self, market: &MarketSnapshotCache, now: DateTime<Utc>) -> Vec<Signal> {
        market
            .instruments()
            .filter_map(|i| self.evaluate(i, market, now))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarketConfig;
    use crate::market::Quote;

    fn feed(mids: &[Decimal], instrument: &str) -> MarketSnapshotCache {
        let mut cache = MarketSnapshotCache::new(&MarketConfig::default());
        let now = Utc::now();
        for mid in mids {
            cache.ingest(vec![Quote::new(instrument, *mid, *mid, now)], now);
        }
        cache
    }

    #[test]
    fn test_uptrend_buys() {
        // mean of 1.1000..1.1004 is 1.1002, current 1.1004 -> 2 pips
        let mids = [dec!(1.1000), dec!(1.1001), dec!(1.1002), dec!(1.1003), dec!(1.1004)];
        let cache = feed(&mids, "EURUSD");
        let signals = MomentumScanner::new(MomentumConfig::default()).scan(&cache, Utc::now());

        assert_eq!(signals.len(), 1);
        let Signal::Momentum(sig) = &signals[0] else {
            panic!("expected momentum");
        };
        assert_eq!(sig.leg.side, Side::Buy);
        assert_eq!(sig.strength_pips, dec!(2));
        assert_eq!(sig.meta.confidence, dec!(70));
        assert_eq!(sig.meta.edge_pips, dec!(3));
    }

    #[test]
    fn test_downtrend_sells_with_capped_confidence() {
        let mids = [dec!(1.1050), dec!(1.1040), dec!(1.1030), dec!(1.1020), dec!(1.1010)];
        let cache = feed(&mids, "EURUSD");
        let signals = MomentumScanner::new(MomentumConfig::default()).scan(&cache, Utc::now());
        let Signal::Momentum(sig) = &signals[0] else {
            panic!("expected momentum");
        };
        assert_eq!(sig.leg.side, Side::Sell);
        assert_eq!(sig.meta.confidence, dec!(90));
    }

    #[test]
    fn test_weak_move_and_short_history_ignored() {
        let flat = [dec!(1.1000), dec!(1.1000), dec!(1.1001), dec!(1.1000), dec!(1.1001)];
        let scanner = MomentumScanner::new(MomentumConfig::default());
        assert!(scanner.scan(&feed(&flat, "EURUSD"), Utc::now()).is_empty());

        let short = [dec!(1.1000), dec!(1.1010)];
        assert!(scanner.scan(&feed(&short, "EURUSD"), Utc::now()).is_empty());
    }
}
