//! Per-cycle quote cache and rolling price history.

use crate::broker::Broker;
use crate::config::MarketConfig;
use crate::market::quote::{pip_factor, Quote, QuoteRejection};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, warn};

/// One mid-price observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceSample {
    pub mid: Decimal,
    pub at: DateTime<Utc>,
}

/// Bounded, append-only mid-price history for one instrument.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    samples: VecDeque<PriceSample>,
    capacity: usize,
}

impl PriceHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: PriceSample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<PriceSample> {
        self.samples.back().copied()
    }

    /// The most recent `n` mids, oldest first. Shorter if fewer exist.
    pub fn last_mids(&self, n: usize) -> Vec<Decimal> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).map(|s| s.mid).collect()
    }

    pub fn mids(&self) -> Vec<Decimal> {
        self.samples.iter().map(|s| s.mid).collect()
    }
}

/// Outcome of one refresh pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub stale: usize,
    pub invalid: usize,
    /// Instruments the terminal had no quote for
    pub missing: usize,
    /// Instruments whose tick request failed
    pub failed: Vec<String>,
}

impl RefreshReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Latest valid quote per instrument plus rolling mid history.
///
/// Owned and written only by the scan loop.
#[derive(Debug, Clone)]
pub struct MarketSnapshotCache {
    quotes: BTreeMap<String, Quote>,
    history: HashMap<String, PriceHistory>,
    history_len: usize,
    volatility_window: usize,
    max_quote_age_secs: i64,
}

impl MarketSnapshotCache {
    pub fn new(config: &MarketConfig) -> Self {
        Self {
            quotes: BTreeMap::new(),
            history: HashMap::new(),
            history_len: config.history_len,
            volatility_window: config.volatility_window,
            max_quote_age_secs: config.max_quote_age_secs,
        }
    }

    /// Fetch ticks for `instruments` and replace the quote map.
    ///
    /// A failed request is logged and counted; the instrument simply has no
    /// quote this cycle.
    pub async fn refresh(
        &mut self,
        broker: &dyn Broker,
        instruments: &[String],
        now: DateTime<Utc>,
    ) -> RefreshReport {
        let mut fetched = Vec::with_capacity(instruments.len());
        let mut failed = Vec::new();
        let mut missing = 0usize;

        for instrument in instruments {
            match broker.get_tick(instrument).await {
                Ok(Some(tick)) => fetched.push(Quote::from(tick)),
                Ok(None) => missing += 1,
                Err(e) => {
                    warn!(%instrument, error = %e, "Tick request failed");
                    failed.push(instrument.clone());
                }
            }
        }

        let mut report = self.ingest(fetched, now);
        report.missing = missing;
        report.failed = failed;
        report
    }

    /// Replace the quote map with the valid subset of `quotes` and extend
    /// history for each accepted quote.
    pub fn ingest(&mut self, quotes: Vec<Quote>, now: DateTime<Utc>) -> RefreshReport {
        let mut report = RefreshReport::default();
        let mut next = BTreeMap::new();

        for quote in quotes {
            match quote.validate(now, self.max_quote_age_secs) {
                Ok(()) => {
                    let capacity = self.history_len;
                    self.history
                        .entry(quote.instrument.clone())
                        .or_insert_with(|| PriceHistory::new(capacity))
                        .push(PriceSample {
                            mid: quote.mid(),
                            at: quote.timestamp,
                        });
                    report.refreshed += 1;
                    next.insert(quote.instrument.clone(), quote);
                }
                Err(QuoteRejection::Stale) => {
                    debug!(instrument = %quote.instrument, ts = %quote.timestamp, "Skipping stale quote");
                    report.stale += 1;
                }
                Err(reason) => {
                    debug!(instrument = %quote.instrument, ?reason, "Skipping invalid quote");
                    report.invalid += 1;
                }
            }
        }

        self.quotes = next;
        report
    }

    pub fn quote(&self, instrument: &str) -> Option<&Quote> {
        self.quotes.get(instrument)
    }

    /// Valid quotes from the last refresh, ordered by instrument.
    pub fn quotes(&self) -> impl Iterator<Item = &Quote> {
        self.quotes.values()
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.quotes.keys().map(String::as_str)
    }

    /// Rolling mids for `instrument`, oldest first.
    pub fn history(&self, instrument: &str) -> Vec<Decimal> {
        self.history
            .get(instrument)
            .map(PriceHistory::mids)
            .unwrap_or_default()
    }

    pub fn price_history(&self, instrument: &str) -> Option<&PriceHistory> {
        self.history.get(instrument)
    }

    /// Mean absolute first difference of the last N mids, in pips.
    ///
    /// Zero until N samples exist.
    pub fn volatility_pips(&self, instrument: &str) -> Decimal {
        let Some(history) = self.history.get(instrument) else {
            return Decimal::ZERO;
        };
        if history.len() < self.volatility_window || self.volatility_window < 2 {
            return Decimal::ZERO;
        }
        let mids = history.last_mids(self.volatility_window);
        let total: Decimal = mids.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
        let diffs = Decimal::from(mids.len() - 1);
        total / diffs * pip_factor(instrument)
    }

    pub fn average_spread_pips(&self) -> Decimal {
        if self.quotes.is_empty() {
            return Decimal::ZERO;
        }
        let total: Decimal = self.quotes.values().map(Quote::spread_pips).sum();
        total / Decimal::from(self.quotes.len())
    }

    pub fn max_volatility_pips(&self) -> Decimal {
        self.quotes
            .keys()
            .map(|i| self.volatility_pips(i))
            .max()
            .unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{MockBroker, Tick};
    use crate::error::BrokerError;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn cache() -> MarketSnapshotCache {
        MarketSnapshotCache::new(&MarketConfig {
            history_len: 5,
            volatility_window: 3,
            max_quote_age_secs: 10,
        })
    }

    fn q(instrument: &str, bid: Decimal, ask: Decimal, at: DateTime<Utc>) -> Quote {
        Quote::new(instrument, bid, ask, at)
    }

    #[test]
    fn test_history_is_bounded() {
        let mut c = cache();
        let now = Utc::now();
        for i in 0..8 {
            let bid = dec!(1.1000) + Decimal::new(i, 4);
            c.ingest(vec![q("EURUSD", bid, bid + dec!(0.0002), now)], now);
        }
        let mids = c.history("EURUSD");
        assert_eq!(mids.len(), 5, "history must evict past the bound");
        assert_eq!(mids[0], dec!(1.1004));
        assert_eq!(mids[4], dec!(1.1008));
    }

    #[test]
    fn test_ingest_skips_stale_and_crossed() {
        let mut c = cache();
        let now = Utc::now();
        let report = c.ingest(
            vec![
                q("EURUSD", dec!(1.1), dec!(1.1002), now),
                q("GBPUSD", dec!(1.3), dec!(1.3001), now - Duration::seconds(60)),
                q("USDJPY", dec!(150.2), dec!(150.1), now),
            ],
            now,
        );
        assert_eq!(report.refreshed, 1);
        assert_eq!(report.stale, 1);
        assert_eq!(report.invalid, 1);
        assert!(c.quote("EURUSD").is_some());
        assert!(c.quote("GBPUSD").is_none());
        assert!(c.history("USDJPY").is_empty());
    }

    #[test]
    fn test_quote_map_is_replaced_wholesale() {
        let mut c = cache();
        let now = Utc::now();
        c.ingest(vec![q("EURUSD", dec!(1.1), dec!(1.1002), now)], now);
        c.ingest(vec![q("GBPUSD", dec!(1.3), dec!(1.3002), now)], now);
        assert!(c.quote("EURUSD").is_none());
        assert_eq!(c.history("EURUSD").len(), 1, "history survives a missed refresh");
    }

    #[test]
    fn test_volatility_zero_until_window_filled() {
        let mut c = cache();
        let now = Utc::now();
        // mids 1.1001, 1.1004, 1.1002 -> diffs 3 and 2 pips -> mean 2.5
        for bid in [dec!(1.1000), dec!(1.1003)] {
            c.ingest(vec![q("EURUSD", bid, bid + dec!(0.0002), now)], now);
            assert_eq!(c.volatility_pips("EURUSD"), Decimal::ZERO);
        }
        c.ingest(vec![q("EURUSD", dec!(1.1001), dec!(1.1003), now)], now);
        assert_eq!(c.volatility_pips("EURUSD"), dec!(2.5));
    }

    #[test]
    fn test_average_spread() {
        let mut c = cache();
        let now = Utc::now();
        c.ingest(
            vec![
                q("EURUSD", dec!(1.1000), dec!(1.1001), now),
                q("USDJPY", dec!(150.00), dec!(150.03), now),
            ],
            now,
        );
        assert_eq!(c.average_spread_pips(), dec!(2));
    }

    #[tokio::test]
    async fn test_refresh_counts_failures_without_aborting() {
        let now = Utc::now();
        let mut broker = MockBroker::new();
        broker.expect_get_tick().returning(move |instrument| match instrument {
            "EURUSD" => Ok(Some(Tick {
                instrument: "EURUSD".to_string(),
                bid: dec!(1.1),
                ask: dec!(1.1001),
                time: now,
            })),
            "GBPUSD" => Err(BrokerError::Transport("timeout".to_string())),
            _ => Ok(None),
        });

        let mut c = cache();
        let instruments = vec!["EURUSD".to_string(), "GBPUSD".to_string(), "AUDUSD".to_string()];
        let report = c.refresh(&broker, &instruments, now).await;

        assert_eq!(report.refreshed, 1);
        assert_eq!(report.missing, 1);
        assert_eq!(report.failed, vec!["GBPUSD".to_string()]);
        assert!(c.quote("EURUSD").is_some());
    }
}
