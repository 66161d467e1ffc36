//! Mean reversion: fade moves beyond a standard-deviation band.

use crate::broker::Side;
use crate::config::MeanReversionConfig;
use crate::market::{pip_factor, MarketSnapshotCache};
use crate::strategy::scanner::Scanner;
use crate::strategy::signal::{Leg, MeanReversionSignal, Signal, SignalMeta, StrategyKind};
use crate::utils::{mean, population_std};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub struct MeanReversionScanner {
    config: MeanReversionConfig,
}

impl MeanReversionScanner {
    pub fn new(config: MeanReversionConfig) -> Self {
        Self { config }
    }

    fn evaluate(&self, instrument: &str, market: &MarketSnapshotCache, now: DateTime<Utc>) -> Option<Signal> {
        let history = market.price_history(instrument)?;
        if history.len() < self.config.window {
            return None;
        }
        let mids = history.last_mids(self.config.window);
        let current = *mids.last()?;
        let avg = mean(&mids);
        let std = population_std(&mids);
        if std == Decimal::ZERO {
            return None;
        }

        let deviation = current - avg;
        if deviation.abs() <= self.config.std_multiplier * std {
            return None;
        }

        let side = if deviation > Decimal::ZERO { Side::Sell } else { Side::Buy };
        let z = deviation.abs() / std;
        let confidence = dec!(55) + (z * dec!(15)).min(dec!(35));
        let deviation_pips = deviation.abs() * pip_factor(instrument);

        Some(Signal::MeanReversion(MeanReversionSignal {
            meta: SignalMeta::new(confidence, deviation_pips, now),
            leg: Leg::new(instrument, side),
            mean: avg,
            std_dev: std,
            deviation_pips: deviation_pips.round_dp(2),
        }))
    }
}

impl Scanner for MeanReversionScanner {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MeanReversion
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

    fn feed(mids: &[Decimal]) -> MarketSnapshotCache {
        let mut cache = MarketSnapshotCache::new(&MarketConfig::default());
        let now = Utc::now();
        for mid in mids {
            cache.ingest(vec![Quote::new("EURUSD", *mid, *mid, now)], now);
        }
        cache
    }

    #[test]
    fn test_spike_up_is_faded() {
        let mut mids = vec![dec!(1.1000); 9];
        mids.push(dec!(1.1030));
        let signals = MeanReversionScanner::new(MeanReversionConfig::default()).scan(&feed(&mids), Utc::now());

        assert_eq!(signals.len(), 1);
        let Signal::MeanReversion(sig) = &signals[0] else {
            panic!("expected mean reversion");
        };
        assert_eq!(sig.leg.side, Side::Sell);
        // mean 1.1003, deviation 27 pips, z = 3 -> 55 + 35 (capped)
        assert_eq!(sig.deviation_pips, dec!(27));
        assert_eq!(sig.meta.confidence, dec!(90));
    }

    #[test]
    fn test_spike_down_is_bought() {
        let mut mids = vec![dec!(1.1000); 9];
        mids.push(dec!(1.0980));
        let signals = MeanReversionScanner::new(MeanReversionConfig::default()).scan(&feed(&mids), Utc::now());
        let Signal::MeanReversion(sig) = &signals[0] else {
            panic!("expected mean reversion");
        };
        assert_eq!(sig.leg.side, Side::Buy);
    }

    #[test]
    fn test_inside_band_and_flat_series_ignored() {
        let scanner = MeanReversionScanner::new(MeanReversionConfig::default());
        assert!(scanner.scan(&feed(&[dec!(1.1); 10]), Utc::now()).is_empty());

        let alternating: Vec<Decimal> = (0..10)
            .map(|i| if i % 2 == 0 { dec!(1.1000) } else { dec!(1.1002) })
            .collect();
        assert!(scanner.scan(&feed(&alternating), Utc::now()).is_empty());
    }
}
