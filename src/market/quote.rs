//! Quotes and pip arithmetic.

use crate::broker::{Side, Tick};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

/// ISO codes treated as major currencies for grouping instruments.
pub const MAJOR_CURRENCIES: [&str; 8] = ["USD", "EUR", "GBP", "JPY", "CHF", "AUD", "CAD", "NZD"];

/// Split a six-letter instrument code into (base, quote).
///
/// Broker suffixes such as `EURUSD.m` are ignored.
pub fn currencies(instrument: &str) -> Option<(&str, &str)> {
    let code = instrument.get(..6)?;
    if !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some((&code[..3], &code[3..]))
}

pub fn is_major(code: &str) -> bool {
    MAJOR_CURRENCIES.iter().any(|c| c.eq_ignore_ascii_case(code))
}

/// Price-units to pips multiplier: 100 for JPY-quoted pairs, 10,000 otherwise.
pub fn pip_factor(instrument: &str) -> Decimal {
    match currencies(instrument) {
        Some((_, quote)) if quote.eq_ignore_ascii_case("JPY") => dec!(100),
        _ => dec!(10000),
    }
}

/// Convert a price difference into pips for `instrument`.
pub fn to_pips(price_diff: Decimal, instrument: &str) -> Decimal {
    price_diff * pip_factor(instrument)
}

/// Why a quote was refused by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteRejection {
    NonPositive,
    Crossed,
    Stale,
}

/// Immutable bid/ask snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub instrument: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    pub fn new(instrument: &str, bid: Decimal, ask: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            instrument: instrument.to_string(),
            bid,
            ask,
            timestamp,
        }
    }

    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / dec!(2)
    }

    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    pub fn spread_pips(&self) -> Decimal {
        to_pips(self.spread(), &self.instrument)
    }

    pub fn pip_factor(&self) -> Decimal {
        pip_factor(&self.instrument)
    }

    /// Price paid to open a position on `side`.
    pub fn entry_price(&self, side: Side) -> Decimal {
        match side {
            Side::Buy => self.ask,
            Side::Sell => self.bid,
        }
    }

    /// Price a position on `side` would be closed at.
    pub fn exit_price(&self, side: Side) -> Decimal {
        self.entry_price(side.opposite())
    }

    pub fn validate(&self, now: DateTime<Utc>, max_age_secs: i64) -> Result<(), QuoteRejection> {
        if self.bid <= Decimal::ZERO || self.ask <= Decimal::ZERO {
            return Err(QuoteRejection::NonPositive);
        }
        if self.ask < self.bid {
            return Err(QuoteRejection::Crossed);
        }
        if (now - self.timestamp).num_seconds() > max_age_secs {
            return Err(QuoteRejection::Stale);
        }
        Ok(())
    }
}

impl From<Tick> for Quote {
    fn from(tick: Tick) -> Self {
        Self {
            instrument: tick.instrument,
            bid: tick.bid,
            ask: tick.ask,
            timestamp: tick.time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_pip_factor_by_quote_currency() {
        assert_eq!(pip_factor("EURUSD"), dec!(10000));
        assert_eq!(pip_factor("USDJPY"), dec!(100));
        assert_eq!(pip_factor("EURJPY.m"), dec!(100));
        assert_eq!(to_pips(dec!(0.15), "GBPJPY"), dec!(15));
    }

    #[test]
    fn test_currencies_split() {
        assert_eq!(currencies("EURGBP"), Some(("EUR", "GBP")));
        assert_eq!(currencies("XAU"), None);
        assert_eq!(currencies("US30.cash"), None);
    }

    #[test]
    fn test_spread_pips() {
        let now = Utc::now();
        let q = Quote::new("EURUSD", dec!(1.10000), dec!(1.10012), now);
        assert_eq!(q.spread_pips(), dec!(1.2));
        assert_eq!(q.mid(), dec!(1.10006));

        let jpy = Quote::new("USDJPY", dec!(150.100), dec!(150.120), now);
        assert_eq!(jpy.spread_pips(), dec!(2.0));
    }

    #[test]
    fn test_validate_rejects_bad_quotes() {
        let now = Utc::now();
        let crossed = Quote::new("EURUSD", dec!(1.1002), dec!(1.1000), now);
        assert_eq!(crossed.validate(now, 30), Err(QuoteRejection::Crossed));

        let zero = Quote::new("EURUSD", dec!(0), dec!(1.1000), now);
        assert_eq!(zero.validate(now, 30), Err(QuoteRejection::NonPositive));

        let stale = Quote::new("EURUSD", dec!(1.1), dec!(1.1001), now - Duration::seconds(31));
        assert_eq!(stale.validate(now, 30), Err(QuoteRejection::Stale));

        let fresh = Quote::new("EURUSD", dec!(1.1), dec!(1.1001), now - Duration::seconds(30));
        assert!(fresh.validate(now, 30).is_ok());
    }
}
