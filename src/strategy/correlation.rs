//! Correlation pair-trade: instruments sharing a major currency should move
//! that currency by the same amount. When their returns diverge, sell the
//! leg where the shared currency outperformed and buy the one where it lagged.

use crate::broker::Side;
use crate::config::CorrelationConfig;
use crate::market::{currencies, is_major, pip_factor, MarketSnapshotCache};
use crate::strategy::scanner::Scanner;
use crate::strategy::signal::{Leg, PairTradeSignal, Signal, SignalMeta, StrategyKind};
use crate::utils::{safe_div, to_basis_points};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

pub struct CorrelationScanner {
    config: CorrelationConfig,
}

/// Group quoted instruments made of two major currencies by each currency.
/// Only groups with at least two members are returned.
pub fn currency_groups<'a>(instruments: impl Iterator<Item = &'a str>) -> BTreeMap<String, Vec<String>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for instrument in instruments {
        let Some((base, quote)) = currencies(instrument) else {
            continue;
        };
        if !is_major(base) || !is_major(quote) {
            continue;
        }
        for code in [base, quote] {
            groups
                .entry(code.to_ascii_uppercase())
                .or_default()
                .push(instrument.to_string());
        }
    }
    groups.retain(|_, members| members.len() >= 2);
    for members in groups.values_mut() {
        members.sort();
    }
    groups
}

impl CorrelationScanner {
    pub fn new(config: CorrelationConfig) -> Self {
        Self { config }
    }

    /// Window return in bps of `group` against the other currency of `instrument`.
    fn currency_return(&self, instrument: &str, group: &str, market: &MarketSnapshotCache) -> Option<Decimal> {
        let history = market.price_history(instrument)?;
        if history.len() < self.config.window + 1 {
            return None;
        }
        let mids = history.last_mids(self.config.window + 1);
        let first = *mids.first()?;
        let last = *mids.last()?;
        let ret = to_basis_points(safe_div(last - first, first));
        let (base, _) = currencies(instrument)?;
        Some(if base.eq_ignore_ascii_case(group) { ret } else { -ret })
    }

    /// Side that buys `group` on `instrument`.
    fn buy_side(instrument: &str, group: &str) -> Side {
        match currencies(instrument) {
            Some((base, _)) if base.eq_ignore_ascii_case(group) => Side::Buy,
            _ => Side::Sell,
        }
    }

    fn evaluate(
        &self,
        group: &str,
        a: &str,
        b: &str,
        market: &MarketSnapshotCache,
        now: DateTime<Utc>,
    ) -> Option<Signal> {
        let ra = self.currency_return(a, group, market)?;
        let rb = self.currency_return(b, group, market)?;
        let spread = ra - rb;
        if spread.abs() < self.config.min_divergence_bps {
            return None;
        }

        // strong leg: where the group currency outperformed
        let (strong, weak) = if spread > Decimal::ZERO { (a, b) } else { (b, a) };
        let short_leg = Leg::new(strong, Self::buy_side(strong, group).opposite());
        let long_leg = Leg::new(weak, Self::buy_side(weak, group));

        let mid = market.quote(strong)?.mid();
        // expect half of the divergence to close, measured on the strong leg
        let edge_pips = spread.abs() / dec!(2) / dec!(10000) * mid * pip_factor(strong);
        let confidence = dec!(60) + ((spread.abs() - self.config.min_divergence_bps) * dec!(2)).min(dec!(25));

        Some(Signal::PairTrade(PairTradeSignal {
            meta: SignalMeta::new(confidence, edge_pips, now),
            group: group.to_string(),
            short_leg,
            long_leg,
            divergence_bps: spread.abs().round_dp(2),
        }))
    }
}

impl Scanner for CorrelationScanner {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CorrelationPair
    }

    fn scan(&self, market: &MarketSnapshotCache, now: DateTime<Utc>) -> Vec<Signal> {
        let groups = currency_groups(market.instruments());
        let mut signals = Vec::new();
        for (group, members) in &groups {
            for pair in members.windows(2) {
                if let Some(signal) = self.evaluate(group, &pair[0], &pair[1], market, now) {
                    signals.push(signal);
                }
            }
        }
        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarketConfig;
    use crate::market::Quote;

    #[test]
    fn test_groups_need_two_major_members() {
        let groups = currency_groups(["EURUSD", "GBPUSD", "USDJPY", "XAUUSD", "EURGBP"].into_iter());
        assert_eq!(groups["USD"], vec!["EURUSD", "GBPUSD", "USDJPY"]);
        assert_eq!(groups["EUR"], vec!["EURGBP", "EURUSD"]);
        assert_eq!(groups["GBP"], vec!["EURGBP", "GBPUSD"]);
        assert!(!groups.contains_key("JPY"), "JPY has a single member");
        assert!(!groups.contains_key("XAU"));
    }

    fn cache(series: &[(&str, Decimal, Decimal)]) -> MarketSnapshotCache {
        // linear path from start to end over 11 samples
        let mut cache = MarketSnapshotCache::new(&MarketConfig::default());
        let now = Utc::now();
        for step in 0..=10 {
            let quotes = series
                .iter()
                .map(|(inst, start, end)| {
                    let mid = *start + (*end - *start) * Decimal::from(step) / dec!(10);
                    Quote::new(inst, mid, mid, now)
                })
                .collect();
            cache.ingest(quotes, now);
        }
        cache
    }

    #[test]
    fn test_sells_outperformer_buys_laggard() {
        // EURUSD +10 bps, GBPUSD flat: USD lagged on EURUSD, so EURUSD is
        // sold and GBPUSD bought
        let market = cache(&[
            ("EURUSD", dec!(1.1000), dec!(1.1011)),
            ("GBPUSD", dec!(1.3000), dec!(1.3000)),
        ]);
        let signals = CorrelationScanner::new(CorrelationConfig::default()).scan(&market, Utc::now());

        assert_eq!(signals.len(), 1);
        let Signal::PairTrade(sig) = &signals[0] else {
            panic!("expected pair trade");
        };
        assert_eq!(sig.group, "USD");
        assert_eq!(sig.short_leg, Leg::new("GBPUSD", Side::Buy));
        assert_eq!(sig.long_leg, Leg::new("EURUSD", Side::Sell));
        assert_eq!(sig.divergence_bps, dec!(10));
        // 60 + (10 - 5) * 2
        assert_eq!(sig.meta.confidence, dec!(70));
    }

    #[test]
    fn test_mixed_orientation_group() {
        // USD group with USDJPY (USD base) and EURUSD (USD quote). USD strengthens
        // 10 bps via USDJPY but is flat against EUR: sell USD on USDJPY, buy USD on EURUSD.
        let market = cache(&[
            ("USDJPY", dec!(150.00), dec!(150.15)),
            ("EURUSD", dec!(1.1000), dec!(1.1000)),
        ]);
        let signals = CorrelationScanner::new(CorrelationConfig::default()).scan(&market, Utc::now());
        let Signal::PairTrade(sig) = &signals[0] else {
            panic!("expected pair trade");
        };
        assert_eq!(sig.short_leg, Leg::new("USDJPY", Side::Sell));
        assert_eq!(sig.long_leg, Leg::new("EURUSD", Side::Sell));
    }

    #[test]
    fn test_small_divergence_ignored() {
        let market = cache(&[
            ("EURUSD", dec!(1.1000), dec!(1.1003)),
            ("GBPUSD", dec!(1.3000), dec!(1.3000)),
        ]);
        assert!(CorrelationScanner::new(CorrelationConfig::default())
            .scan(&market, Utc::now())
            .is_empty());
    }
}
