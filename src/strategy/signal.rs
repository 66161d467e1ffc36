//! Trading signals produced by the scanners.

use crate::broker::Side;
use crate::config::TriangleDef;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Scanner strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Triangular,
    CorrelationPair,
    Momentum,
    MeanReversion,
    Breakout,
    Scalping,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 6] = [
        StrategyKind::Triangular,
        StrategyKind::CorrelationPair,
        StrategyKind::Momentum,
        StrategyKind::MeanReversion,
        StrategyKind::Breakout,
        StrategyKind::Scalping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Triangular => "triangular",
            StrategyKind::CorrelationPair => "correlation_pair",
            StrategyKind::Momentum => "momentum",
            StrategyKind::MeanReversion => "mean_reversion",
            StrategyKind::Breakout => "breakout",
            StrategyKind::Scalping => "scalping",
        }
    }

    /// Code embedded in order labels.
    pub fn label_code(&self) -> &'static str {
        match self {
            StrategyKind::Triangular => "ARB",
            StrategyKind::CorrelationPair => "CORR",
            StrategyKind::Momentum => "MOMO",
            StrategyKind::MeanReversion => "MREV",
            StrategyKind::Breakout => "BRKO",
            StrategyKind::Scalping => "SCALP",
        }
    }

    pub fn from_label_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.label_code() == code)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One order of a signal's plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Leg {
    pub instrument: String,
    pub side: Side,
}

impl Leg {
    pub fn new(instrument: &str, side: Side) -> Self {
        Self {
            instrument: instrument.to_string(),
            side,
        }
    }
}

/// Fields every signal carries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalMeta {
    /// 0-100
    pub confidence: Decimal,
    pub edge_pips: Decimal,
    pub generated_at: DateTime<Utc>,
}

impl SignalMeta {
    pub fn new(confidence: Decimal, edge_pips: Decimal, generated_at: DateTime<Utc>) -> Self {
        Self {
            confidence: confidence.min(Decimal::ONE_HUNDRED).round_dp(2),
            edge_pips: edge_pips.round_dp(2),
            generated_at,
        }
    }
}

/// Which way round a triangle is traded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Buy the cross, sell the synthetic
    Forward,
    /// Sell the cross, buy the synthetic
    Reverse,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriangularSignal {
    pub meta: SignalMeta,
    pub triangle: TriangleDef,
    pub direction: Direction,
    pub divergence_pips: Decimal,
    /// Cross leg first, then the two synthetic legs
    pub legs: Vec<Leg>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairTradeSignal {
    pub meta: SignalMeta,
    /// Currency shared by both instruments
    pub group: String,
    /// Sells the shared currency where it outperformed
    pub short_leg: Leg,
    /// Buys the shared currency where it lagged
    pub long_leg: Leg,
    pub divergence_bps: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MomentumSignal {
    pub meta: SignalMeta,
    pub leg: Leg,
    pub strength_pips: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeanReversionSignal {
    pub meta: SignalMeta,
    pub leg: Leg,
    pub mean: Decimal,
    pub std_dev: Decimal,
    pub deviation_pips: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakoutSignal {
    pub meta: SignalMeta,
    pub leg: Leg,
    /// Level that was broken
    pub level: Decimal,
    pub range_pips: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalpSignal {
    pub meta: SignalMeta,
    pub leg: Leg,
    pub spread_pips: Decimal,
    pub volatility_pips: Decimal,
}

/// A trading opportunity. Immutable, consumed once.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Signal {
    Triangular(TriangularSignal),
    PairTrade(PairTradeSignal),
    Momentum(MomentumSignal),
    MeanReversion(MeanReversionSignal),
    Breakout(BreakoutSignal),
    Scalp(ScalpSignal),
}

impl Signal {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Signal::Triangular(_) => StrategyKind::Triangular,
            Signal::PairTrade(_) => StrategyKind::CorrelationPair,
            Signal::Momentum(_) => StrategyKind::Momentum,
            Signal::MeanReversion(_) => StrategyKind::MeanReversion,
            Signal::Breakout(_) => StrategyKind::Breakout,
            Signal::Scalp(_) => StrategyKind::Scalping,
        }
    }

    pub fn meta(&self) -> &SignalMeta {
        match self {
            Signal::Triangular(s) => &s.meta,
            Signal::PairTrade(s) => &s.meta,
            Signal::Momentum(s) => &s.meta,
            Signal::MeanReversion(s) => &s.meta,
            Signal::Breakout(s) => &s.meta,
            Signal::Scalp(s) => &s.meta,
        }
    }

    pub fn confidence(&self) -> Decimal {
        self.meta().confidence
    }

    pub fn edge_pips(&self) -> Decimal {
        self.meta().edge_pips
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.meta().generated_at
    }

    /// Orders in execution sequence.
    pub fn legs(&self) -> Vec<Leg> {
        match self {
            Signal::Triangular(s) => s.legs.clone(),
            Signal::PairTrade(s) => vec![s.short_leg.clone(), s.long_leg.clone()],
            Signal::Momentum(s) => vec![s.leg.clone()],
            Signal::MeanReversion(s) => vec![s.leg.clone()],
            Signal::Breakout(s) => vec![s.leg.clone()],
            Signal::Scalp(s) => vec![s.leg.clone()],
        }
    }

    pub fn instruments(&self) -> Vec<String> {
        self.legs().into_iter().map(|l| l.instrument).collect()
    }

    /// Instrument of the first leg.
    pub fn primary_instrument(&self) -> String {
        self.legs()
            .into_iter()
            .next()
            .map(|l| l.instrument)
            .unwrap_or_default()
    }

    pub fn is_multi_leg(&self) -> bool {
        matches!(self, Signal::Triangular(_) | Signal::PairTrade(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn meta() -> SignalMeta {
        SignalMeta {
            confidence: dec!(60),
            edge_pips: dec!(3),
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn test_pair_trade_leg_order() {
        let signal = Signal::PairTrade(PairTradeSignal {
            meta: meta(),
            group: "USD".to_string(),
            short_leg: Leg::new("GBPUSD", Side::Buy),
            long_leg: Leg::new("EURUSD", Side::Sell),
            divergence_bps: dec!(8),
        });
        assert_eq!(signal.kind(), StrategyKind::CorrelationPair);
        assert!(signal.is_multi_leg());
        assert_eq!(signal.instruments(), vec!["GBPUSD", "EURUSD"]);
        assert_eq!(signal.primary_instrument(), "GBPUSD");
    }

    #[test]
    fn test_label_codes_round_trip() {
        for kind in StrategyKind::ALL {
            assert_eq!(StrategyKind::from_label_code(kind.label_code()), Some(kind));
        }
        assert_eq!(StrategyKind::from_label_code("XYZ"), None);
    }

    #[test]
    fn test_signal_serializes_with_strategy_tag() {
        let signal = Signal::Momentum(MomentumSignal {
            meta: meta(),
            leg: Leg::new("EURUSD", Side::Buy),
            strength_pips: dec!(2.5),
        });
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["strategy"], "momentum");
        assert_eq!(json["leg"]["side"], "BUY");
    }
}
