//! Portfolio overlay evaluated before any per-position rule.
//!
//! Besides the lock-in and emergency thresholds, the guard scores the book:
//! - risk score from aggregate profit, winner share and currency spread
//! - net exposure per currency against the configured cap
//! - hedge recommendations while the book is losing

use crate::config::PortfolioConfig;
use crate::position::{Position, PositionBook};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortfolioAction {
    None,
    /// Close these tickets, most profitable first
    LockIn {
        tickets: Vec<u64>,
        total: Decimal,
        reason: String,
    },
    /// Close everything and skip the rest of the cycle
    Liquidate { total: Decimal },
}

/// Coarse reading of the risk score. A higher score is a healthier book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    fn from_score(score: Decimal) -> Self {
        if score > dec!(70) {
            RiskLevel::Low
        } else if score > dec!(40) {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        };
        f.write_str(s)
    }
}

/// Net exposure on one currency worth offsetting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HedgeRecommendation {
    pub currency: String,
    /// Signed net lots, long positive
    pub exposure: Decimal,
}

impl fmt::Display for HedgeRecommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hedge {} exposure of {} lots", self.currency, self.exposure.round_dp(2))
    }
}

/// Currency whose net lots exceed the cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExposureBreach {
    pub currency: String,
    pub exposure: Decimal,
    /// Cap with the sign of the exposure
    pub target: Decimal,
}

/// Read-only assessment of the whole book.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioRisk {
    pub total_profit: Decimal,
    pub winners: usize,
    pub losers: usize,
    /// 0 to 100
    pub score: Decimal,
    pub level: RiskLevel,
    pub exposure: BTreeMap<String, Decimal>,
    pub over_cap: Vec<ExposureBreach>,
    pub hedges: Vec<HedgeRecommendation>,
}

impl Default for PortfolioRisk {
    fn default() -> Self {
        Self {
            total_profit: Decimal::ZERO,
            winners: 0,
            losers: 0,
            score: Decimal::ONE_HUNDRED,
            level: RiskLevel::Low,
            exposure: BTreeMap::new(),
            over_cap: Vec::new(),
            hedges: Vec::new(),
        }
    }
}

pub struct PortfolioGuard {
    config: PortfolioConfig,
}

impl PortfolioGuard {
    pub fn new(config: PortfolioConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, book: &PositionBook) -> PortfolioAction {
        if book.is_empty() {
            return PortfolioAction::None;
        }
        let total = book.total_profit();

        if total <= -self.config.emergency_loss_usd {
            return PortfolioAction::Liquidate { total };
        }

        if total >= self.config.lock_in_profit_usd {
            let mut tickets = winners(book, Decimal::ZERO);
            if let Some(cap) = self.config.lock_in_max_closes {
                tickets.truncate(cap);
            }
            return PortfolioAction::LockIn {
                tickets,
                total,
                reason: format!("PORTFOLIO_TARGET_${}", self.config.lock_in_profit_usd.normalize()),
            };
        }

        PortfolioAction::None
    }

    /// Operator lock: every position at or above the forced minimum profit.
    pub fn forced_lock_in(&self, book: &PositionBook) -> PortfolioAction {
        let floor = self.config.force_lock_min_profit_usd;
        let tickets = winners(book, floor);
        if tickets.is_empty() {
            return PortfolioAction::None;
        }
        PortfolioAction::LockIn {
            tickets,
            total: book.total_profit(),
            reason: format!("FORCED_LOCK_${}", floor.normalize()),
        }
    }

    pub fn assess(&self, book: &PositionBook) -> PortfolioRisk {
        if book.is_empty() {
            return PortfolioRisk::default();
        }
        let total_profit = book.total_profit();
        let winners = book.positions().filter(|p| p.profit > Decimal::ZERO).count();
        let losers = book.len() - winners;
        let exposure = book.net_exposure();

        // profit maps -100..+100 onto 0..50, winner share onto 0..30,
        // and each exposed currency adds 2 up to 20
        let profit_factor = ((total_profit + dec!(100)) / dec!(4)).clamp(Decimal::ZERO, dec!(50));
        let share_factor = Decimal::from(winners) / Decimal::from(book.len()) * dec!(30);
        let spread_factor = (Decimal::from(exposure.len()) * dec!(2)).min(dec!(20));
        let score = (profit_factor + share_factor + spread_factor)
            .clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)
            .round_dp(2);

        let cap = self.config.max_currency_exposure;
        let over_cap = exposure
            .iter()
            .filter(|(_, lots)| lots.abs() > cap)
            .map(|(currency, lots)| ExposureBreach {
                currency: currency.clone(),
                exposure: *lots,
                target: if lots.is_sign_positive() { cap } else { -cap },
            })
            .collect();

        let hedges = if total_profit < -self.config.hedge_trigger_loss_usd {
            exposure
                .iter()
                .filter(|(_, lots)| lots.abs() > self.config.hedge_min_exposure)
                .map(|(currency, lots)| HedgeRecommendation {
                    currency: currency.clone(),
                    exposure: *lots,
                })
                .collect()
        } else {
            Vec::new()
        };

        PortfolioRisk {
            total_profit,
            winners,
            losers,
            score,
            level: RiskLevel::from_score(score),
            exposure,
            over_cap,
            hedges,
        }
    }
}

/// Profitable tickets worth at least `min_profit`, most profitable first.
fn winners(book: &PositionBook, min_profit: Decimal) -> Vec<u64> {
    let mut winners: Vec<&Position> = book
        .positions()
        .filter(|p| p.profit > Decimal::ZERO && p.profit >= min_profit)
        .collect();
    winners.sort_by(|a, b| match b.profit.cmp(&a.profit) {
        Ordering::Equal => a.ticket.cmp(&b.ticket),
        other => other,
    });
    winners.into_iter().map(|p| p.ticket).collect()
}
