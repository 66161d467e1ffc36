//! Structured risk alerts.
//!
//! Alerts are emitted as single-line JSON on the `risk_alert` target so log
//! shippers can pick them out of the normal stream.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{error, info, warn};

/// Severity levels for alerts.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "INFO",
            AlertSeverity::Warning => "WARNING",
            AlertSeverity::Error => "ERROR",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

/// Types of risk alerts.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum RiskAlertType {
    /// Aggregate profit crossed the lock-in threshold
    ProfitLockIn { closed: usize },
    /// Aggregate loss crossed the portfolio emergency threshold
    PortfolioEmergency { limit: Decimal },
    /// Recovery-level loss or drawdown ceiling crossed
    RecoveryEmergency { drawdown_pct: Decimal },
    /// Consecutive failed cycles opened the circuit breaker
    CircuitBreakerOpen { failed_cycles: u32 },
    /// A multi-leg plan was unwound after a leg failed
    PartialExecution { strategy: String, rolled_back: usize },
    /// Net lots on a currency above the exposure cap
    ExposureCap { currency: String, exposure: Decimal },
    /// Operator closed every position and stopped the engine
    EmergencyStop { closed: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskAlert {
    pub alert_id: String,
    pub timestamp: DateTime<Utc>,
    pub alert_type: RiskAlertType,
    pub severity: AlertSeverity,
    pub instrument: Option<String>,
    pub message: String,
    pub metrics: BTreeMap<String, Decimal>,
}

impl RiskAlert {
    pub fn new(alert_type: RiskAlertType, severity: AlertSeverity, instrument: Option<String>, message: String) -> Self {
        let timestamp = Utc::now();
        let alert_id = format!(
            "risk-{}-{}",
            timestamp.timestamp(),
            timestamp.timestamp_subsec_nanos()
        );

        Self {
            alert_id,
            timestamp,
            alert_type,
            severity,
            instrument,
            message,
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_metric(mut self, key: &str, value: Decimal) -> Self {
        self.metrics.insert(key.to_string(), value);
        self
    }

    /// Emit as structured log for workflow parsing.
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();

        match self.severity {
            AlertSeverity::Info => info!(target: "risk_alert", "RISK_ALERT: {}", json),
            AlertSeverity::Warning => warn!(target: "risk_alert", "RISK_ALERT: {}", json),
            AlertSeverity::Error | AlertSeverity::Critical => {
                error!(target: "risk_alert", "RISK_ALERT: {}", json)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_alert_serializes_with_type_tag() {
        let alert = RiskAlert::new(
            RiskAlertType::PortfolioEmergency { limit: dec!(300) },
            AlertSeverity::Critical,
            None,
            "Liquidating".to_string(),
        )
        .with_metric("total_profit", dec!(-310));

        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["alert_type"]["type"], "PortfolioEmergency");
        assert_eq!(json["severity"], "Critical");
        assert!(alert.alert_id.starts_with("risk-"));
        assert_eq!(alert.severity.as_str(), "CRITICAL");
    }
}
