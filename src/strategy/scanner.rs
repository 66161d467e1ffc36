//! Scanner trait and the per-cycle scanner set.

use crate::config::ScannerConfig;
use crate::market::MarketSnapshotCache;
use crate::strategy::breakout::BreakoutScanner;
use crate::strategy::correlation::CorrelationScanner;
use crate::strategy::mean_reversion::MeanReversionScanner;
use crate::strategy::momentum::MomentumScanner;
use crate::strategy::scalping::ScalpingScanner;
use crate::strategy::signal::{Signal, StrategyKind};
use crate::strategy::triangular::TriangularScanner;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

/// A pure signal generator over the snapshot cache.
///
/// Implementations never mutate shared state and never use randomness.
pub trait Scanner: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn scan(&self, market: &MarketSnapshotCache, now: DateTime<Utc>) -> Vec<Signal>;
}

/// All enabled scanners plus a signals-generated counter per strategy.
pub struct ScannerSet {
    scanners: Vec<Box<dyn Scanner>>,
    generated: BTreeMap<StrategyKind, u64>,
}

impl ScannerSet {
    pub fn new(scanners: Vec<Box<dyn Scanner>>) -> Self {
        let generated = scanners.iter().map(|s| (s.kind(), 0)).collect();
        Self { scanners, generated }
    }

    /// Build the enabled scanners from configuration.
    pub fn from_config(config: &ScannerConfig) -> Self {
        let mut scanners: Vec<Box<dyn Scanner>> = Vec::new();
        if config.triangular.enabled {
            scanners.push(Box::new(TriangularScanner::new(config.triangular.clone())));
        }
        if config.correlation.enabled {
            scanners.push(Box::new(CorrelationScanner::new(config.correlation.clone())));
        }
        if config.momentum.enabled {
            scanners.push(Box::new(MomentumScanner::new(config.momentum.clone())));
        }
        if config.mean_reversion.enabled {
            scanners.push(Box::new(MeanReversionScanner::new(config.mean_reversion.clone())));
        }
        if config.breakout.enabled {
            scanners.push(Box::new(BreakoutScanner::new(config.breakout.clone())));
        }
        if config.scalping.enabled {
            scanners.push(Box::new(ScalpingScanner::new(config.scalping.clone())));
        }
        Self::new(scanners)
    }

    /// Run every scanner in a fixed order and count what each produced.
    pub fn scan_all(&mut self, market: &MarketSnapshotCache, now: DateTime<Utc>) -> Vec<Signal> {
        let mut out = Vec::new();
        for scanner in &self.scanners {
            let signals = scanner.scan(market, now);
            if !signals.is_empty() {
                debug!(strategy = %scanner.kind(), count = signals.len(), "Signals generated");
            }
            *self.generated.entry(scanner.kind()).or_insert(0) += signals.len() as u64;
            out.extend(signals);
        }
        out
    }

    pub fn generated(&self) -> &BTreeMap<StrategyKind, u64> {
        &self.generated
    }

    pub fn len(&self) -> usize {
        self.scanners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scanners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::Side;
    use crate::strategy::signal::{Leg, MomentumSignal, SignalMeta};
    use rust_decimal_macros::dec;

    struct Fixed(usize);

    impl Scanner for Fixed {
        fn kind(&self) -> StrategyKind {
            StrategyKind::Momentum
        }

        fn scan(&self, _market: &MarketSnapshotCache, now: DateTime<Utc>) -> Vec<Signal> {
            (0..self.0)
                .map(|_| {
                    Signal::Momentum(MomentumSignal {
                        meta: SignalMeta::new(dec!(60), dec!(3), now),
                        leg: Leg::new("EURUSD", Side::Buy),
                        strength_pips: dec!(2),
                    })
                })
                .collect()
        }
    }

    #[test]
    fn test_counts_accumulate_across_cycles() {
        let mut set = ScannerSet::new(vec![Box::new(Fixed(2))]);
        let market = MarketSnapshotCache::new(&Default::default());
        let now = Utc::now();

        assert_eq!(set.scan_all(&market, now).len(), 2);
        assert_eq!(set.scan_all(&market, now).len(), 2);
        assert_eq!(set.generated()[&StrategyKind::Momentum], 4);
    }

    #[test]
    fn test_from_config_honours_enable_flags() {
        let mut config = ScannerConfig::default();
        assert_eq!(ScannerSet::from_config(&config).len(), 6);

        config.scalping.enabled = false;
        config.triangular.enabled = false;
        let set = ScannerSet::from_config(&config);
        assert_eq!(set.len(), 4);
        assert!(!set.generated().contains_key(&StrategyKind::Scalping));
    }
}
