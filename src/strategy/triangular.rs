//! Triangular divergence scanner.
//!
//! For a cross X/Y and two legs sharing a currency C, the synthetic cross is
//! (X/C) * (C/Y), with inverted legs contributing 1/ask or 1/bid. The
//! executable gain of each direction is measured in cross pips:
//! - forward: sell the synthetic at its bid, buy the cross at its ask
//! - reverse: buy the synthetic at its ask, sell the cross at its bid

use crate::broker::Side;
use crate::config::{TriangleDef, TriangularConfig};
use crate::market::{currencies, pip_factor, MarketSnapshotCache, Quote};
use crate::strategy::scanner::Scanner;
use crate::strategy::signal::{Direction, Leg, Signal, SignalMeta, StrategyKind, TriangularSignal};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

/// Pick the direction with the strictly larger absolute divergence.
/// Ties go forward.
pub fn choose_direction(forward: Decimal, reverse: Decimal) -> Direction {
    if reverse.abs() > forward.abs() {
        Direction::Reverse
    } else {
        Direction::Forward
    }
}

/// Bid and ask of the synthetic cross plus the legs that sell it.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthetic {
    pub bid: Decimal,
    pub ask: Decimal,
    /// Orders that sell the synthetic cross (buying it flips every side)
    pub sell_legs: [Leg; 2],
}

/// A leg quoted against the currency we want to price.
struct Oriented<'a> {
    quote: &'a Quote,
    /// true when the instrument is quoted as `want/other`
    direct: bool,
}

impl Oriented<'_> {
    fn bid(&self) -> Option<Decimal> {
        if self.direct {
            Some(self.quote.bid)
        } else if self.quote.ask > Decimal::ZERO {
            Some(Decimal::ONE / self.quote.ask)
        } else {
            None
        }
    }

    fn ask(&self) -> Option<Decimal> {
        if self.direct {
            Some(self.quote.ask)
        } else if self.quote.bid > Decimal::ZERO {
            Some(Decimal::ONE / self.quote.bid)
        } else {
            None
        }
    }

    /// Side that sells the `want` currency on this instrument.
    fn sell_side(&self) -> Side {
        if self.direct {
            Side::Sell
        } else {
            Side::Buy
        }
    }
}

/// Price the synthetic cross implied by `a` and `b`.
///
/// Returns `None` when the three instruments do not form a triangle.
pub fn synthetic_cross(cross: &str, a: &Quote, b: &Quote) -> Option<Synthetic> {
    let (x, y) = currencies(cross)?;
    let (a_base, a_quote) = currencies(&a.instrument)?;
    let (b_base, b_quote) = currencies(&b.instrument)?;

    let contains = |base: &str, quote: &str, c: &str| base == c || quote == c;
    // leg carrying X, leg carrying Y
    let (xq, xb, xqt, yq, yb, yqt) = if contains(a_base, a_quote, x) && contains(b_base, b_quote, y) {
        (a, a_base, a_quote, b, b_base, b_quote)
    } else if contains(b_base, b_quote, x) && contains(a_base, a_quote, y) {
        (b, b_base, b_quote, a, a_base, a_quote)
    } else {
        return None;
    };

    let common = if xb == x { xqt } else { xb };
    if common == x || common == y || !contains(yb, yqt, common) {
        return None;
    }

    // X/C and C/Y
    let x_leg = Oriented {
        quote: xq,
        direct: xb == x,
    };
    let y_leg = Oriented {
        quote: yq,
        direct: yb == common,
    };

    let bid = x_leg.bid()? * y_leg.bid()?;
    let ask = x_leg.ask()? * y_leg.ask()?;

    Some(Synthetic {
        bid,
        ask,
        sell_legs: [
            Leg::new(&xq.instrument, x_leg.sell_side()),
            Leg::new(&yq.instrument, y_leg.sell_side()),
        ],
    })
}

pub struct TriangularScanner {
    config: TriangularConfig,
}

impl TriangularScanner {
    pub fn new(config: TriangularConfig) -> Self {
        Self { config }
    }

    fn evaluate(&self, triangle: &TriangleDef, market: &MarketSnapshotCache, now: DateTime<Utc>) -> Option<Signal> {
        let cross = market.quote(&triangle.cross)?;
        let a = market.quote(&triangle.leg_a)?;
        let b = market.quote(&triangle.leg_b)?;
        let synthetic = synthetic_cross(&triangle.cross, a, b)?;

        let factor = pip_factor(&triangle.cross);
        let forward = ((synthetic.bid - cross.ask) * factor).max(Decimal::ZERO);
        let reverse = ((cross.bid - synthetic.ask) * factor).max(Decimal::ZERO);
        let direction = choose_direction(forward, reverse);
        let divergence = match direction {
            Direction::Forward => forward,
            Direction::Reverse => reverse,
        };

        if divergence < self.config.min_divergence_pips {
            return None;
        }
        if divergence > self.config.max_divergence_pips {
            debug!(
                cross = %triangle.cross,
                divergence = %divergence,
                "Triangle divergence above realism ceiling, ignoring"
            );
            return None;
        }

        let [first, second] = synthetic.sell_legs;
        let legs = match direction {
            Direction::Forward => vec![Leg::new(&triangle.cross, Side::Buy), first, second],
            Direction::Reverse => vec![
                Leg::new(&triangle.cross, Side::Sell),
                Leg::new(&first.instrument, first.side.opposite()),
                Leg::new(&second.instrument, second.side.opposite()),
            ],
        };

        let confidence = (dec!(70) + divergence * dec!(2)).min(dec!(95));
        Some(Signal::Triangular(TriangularSignal {
            meta: SignalMeta::new(confidence, divergence, now),
            triangle: triangle.clone(),
            direction,
            divergence_pips: divergence.round_dp(2),
            legs,
        }))
    }
}

impl Scanner for TriangularScanner {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Triangular
    }

    fn scan(&self, market: &MarketSnapshotCache, now: DateTime<Utc>) -> Vec<Signal> {
        self.config
            .triangles
            .iter()
            .filter_map(|t| self.evaluate(t, market, now))
            .collect()
    }
}
