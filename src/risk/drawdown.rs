//! Equity drawdown from the session high-water mark.

use rust_decimal::Decimal;
use tracing::warn;

/// High-water mark of account equity and the deepest fall from it.
#[derive(Debug, Clone, Default)]
pub struct DrawdownTracker {
    high_water: Decimal,
    /// Fraction below the high-water mark after the last update
    current: Decimal,
    /// Deepest fraction seen since the engine started
    worst: Decimal,
}

impl DrawdownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark equity for this cycle and return the current drawdown fraction.
    pub fn update(&mut self, equity: Decimal) -> Decimal {
        if equity >= self.high_water {
            self.high_water = equity;
            self.current = Decimal::ZERO;
            return self.current;
        }
        if self.high_water.is_zero() {
            return self.current;
        }

        self.current = (self.high_water - equity) / self.high_water;
        if self.current > self.worst {
            self.worst = self.current;
            warn!(
                drawdown_pct = %(self.worst * Decimal::ONE_HUNDRED).round_dp(2),
                high_water = %self.high_water,
                %equity,
                "📉 [RISK] Session drawdown deepened"
            );
        }
        self.current
    }

    pub fn current(&self) -> Decimal {
        self.current
    }

    pub fn session_mdd(&self) -> Decimal {
        self.worst
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_session_worst_is_sticky() {
        let mut tracker = DrawdownTracker::new();
        assert_eq!(tracker.update(dec!(10000)), Decimal::ZERO);
        assert_eq!(tracker.update(dec!(10500)), Decimal::ZERO);

        // 1050 below a 10500 high
        assert_eq!(tracker.update(dec!(9450)), dec!(0.1));
        tracker.update(dec!(10000));
        assert!(tracker.current() < dec!(0.1));
        assert_eq!(tracker.session_mdd(), dec!(0.1));

        tracker.update(dec!(11000));
        assert_eq!(tracker.current(), Decimal::ZERO);
        assert_eq!(tracker.session_mdd(), dec!(0.1));
    }
}
