//! Per-position exit rules.
//!
//! Rules are evaluated in a fixed priority order and the first match closes
//! the position:
//! 1. profit target (account currency or pips)
//! 2. scalp targets and scalp max age
//! 3. stop loss (account currency or pips)
//! 4. long-age exit, if profitable or still losing past a floor
//! 5. arbitrage max age and arbitrage profit target
//! 6. recovery success target and recovery timeout

use crate::config::LifecycleConfig;
use crate::position::Position;
use crate::strategy::StrategyKind;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Which terminal state a close moves the position to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseKind {
    ProfitClose,
    StopClose,
    TimeClose,
    PortfolioClose,
}

impl fmt::Display for CloseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseKind::ProfitClose => "profit_close",
            CloseKind::StopClose => "stop_close",
            CloseKind::TimeClose => "time_close",
            CloseKind::PortfolioClose => "portfolio_close",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitDecision {
    Hold,
    Close { kind: CloseKind, reason: String },
}

impl ExitDecision {
    fn close(kind: CloseKind, reason: String) -> Self {
        ExitDecision::Close { kind, reason }
    }

    pub fn is_close(&self) -> bool {
        matches!(self, ExitDecision::Close { .. })
    }
}

fn minutes_code(minutes: i64) -> String {
    if minutes % 60 == 0 {
        format!("{}H", minutes / 60)
    } else {
        format!("{}M", minutes)
    }
}

pub struct LifecycleManager {
    config: LifecycleConfig,
}

impl LifecycleManager {
    pub fn new(config: LifecycleConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, position: &Position, now: DateTime<Utc>) -> ExitDecision {
        let c = &self.config;
        let profit = position.profit;
        let pips = position.pips();
        let age = position.age(now);
        let strategy = position.strategy();

        if profit >= c.profit_target_usd {
            return ExitDecision::close(
                CloseKind::ProfitClose,
                format!("PROFIT_TARGET_${}", c.profit_target_usd.normalize()),
            );
        }
        if pips >= c.profit_target_pips {
            return ExitDecision::close(
                CloseKind::ProfitClose,
                format!("PROFIT_TARGET_{}P", c.profit_target_pips.normalize()),
            );
        }

        if strategy == Some(StrategyKind::Scalping) {
            if profit >= c.scalp_profit_usd {
                return ExitDecision::close(
                    CloseKind::ProfitClose,
                    format!("SCALP_PROFIT_${}", c.scalp_profit_usd.normalize()),
                );
            }
            if pips >= c.scalp_profit_pips {
                return ExitDecision::close(
                    CloseKind::ProfitClose,
                    format!("SCALP_PROFIT_{}P", c.scalp_profit_pips.normalize()),
                );
            }
            if age >= Duration::minutes(c.scalp_max_age_minutes) {
                return ExitDecision::close(
                    CloseKind::TimeClose,
                    format!("SCALP_TIME_{}", minutes_code(c.scalp_max_age_minutes)),
                );
            }
        }

        if profit <= -c.stop_loss_usd {
            return ExitDecision::close(
                CloseKind::StopClose,
                format!("STOP_LOSS_${}", c.stop_loss_usd.normalize()),
            );
        }
        if pips <= -c.stop_loss_pips {
            return ExitDecision::close(
                CloseKind::StopClose,
                format!("STOP_LOSS_{}P", c.stop_loss_pips.normalize()),
            );
        }

        if age >= Duration::hours(c.time_exit_hours) {
            if profit > Decimal::ZERO {
                return ExitDecision::close(CloseKind::TimeClose, format!("TIME_PROFIT_{}H", c.time_exit_hours));
            }
            if profit < -c.time_loss_usd {
                return ExitDecision::close(CloseKind::TimeClose, format!("TIME_LOSS_{}H", c.time_exit_hours));
            }
        }

        if strategy == Some(StrategyKind::Triangular) {
            if age >= Duration::minutes(c.arb_max_age_minutes) {
                return ExitDecision::close(
                    CloseKind::TimeClose,
                    format!("ARB_TIME_{}", minutes_code(c.arb_max_age_minutes)),
                );
            }
            if profit >= c.arb_profit_usd {
                return ExitDecision::close(
                    CloseKind::ProfitClose,
                    format!("ARB_PROFIT_${}", c.arb_profit_usd.normalize()),
                );
            }
        }

        if position.is_recovery() {
            if profit >= c.recovery_profit_usd {
                return ExitDecision::close(CloseKind::ProfitClose, "RECOVERY_SUCCESS".to_string());
            }
            if age >= Duration::minutes(c.recovery_timeout_minutes) {
                return ExitDecision::close(CloseKind::TimeClose, "RECOVERY_TIMEOUT".to_string());
            }
        }

        ExitDecision::Hold
    }
}
