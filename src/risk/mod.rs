//! Risk management for the scan loop.
//!
//! Provides:
//! - Per-position exit rules in fixed priority order
//! - Portfolio profit lock-in, emergency liquidation and risk scoring
//! - Recovery escalation for underwater instruments
//! - Cycle circuit breaker
//! - Session drawdown tracking
//! - Structured risk alerts

mod alert;
mod breaker;
mod drawdown;
mod guard;
mod lifecycle;
mod recovery;

pub use alert::{AlertSeverity, RiskAlert, RiskAlertType};
pub use breaker::{BreakerState, CycleBreaker};
pub use drawdown::DrawdownTracker;
pub use guard::{ExposureBreach, HedgeRecommendation, PortfolioAction, PortfolioGuard, PortfolioRisk, RiskLevel};
pub use lifecycle::{CloseKind, ExitDecision, LifecycleManager};
pub use recovery::{EmergencyBreach, RecoveryEngine, RecoveryOrder, RecoveryState, RecoveryStats};
