//! Order label encoding.
//!
//! Every order the engine places carries a label so that ownership survives
//! a restart:
//! - `HFX-<CODE>` for strategy entries (`HFX-ARB`, `HFX-SCALP`, ...)
//! - `HFX-RCV-<METHOD>-L<level>[-<ORIGIN>]` for recovery orders
//!
//! Labels written by older terminals (`ARB-...`, `CORR-1`, `Martingale-L2`,
//! `Grid-L3`, `Hedge-Recovery`, `Corr-EURUSD`, truncated strategy names) are
//! still recognised.

use crate::config::RecoveryMethod;
use crate::strategy::StrategyKind;

pub const LABEL_PREFIX: &str = "HFX";
const RECOVERY_SEGMENT: &str = "RCV";

/// Owner of a position, recovered from its label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionTag {
    Strategy(StrategyKind),
    Recovery {
        method: RecoveryMethod,
        level: u32,
        /// Instrument being recovered when it differs from the order's own
        origin: Option<String>,
    },
    /// Not placed by this engine, or unreadable
    Manual,
}

impl PositionTag {
    pub fn is_recovery(&self) -> bool {
        matches!(self, PositionTag::Recovery { .. })
    }

    pub fn strategy(&self) -> Option<StrategyKind> {
        match self {
            PositionTag::Strategy(kind) => Some(*kind),
            _ => None,
        }
    }
}

fn method_code(method: RecoveryMethod) -> &'static str {
    match method {
        RecoveryMethod::Martingale => "MART",
        RecoveryMethod::Grid => "GRID",
        RecoveryMethod::Hedge => "HEDGE",
        RecoveryMethod::Correlation => "CORR",
    }
}

fn method_from_code(code: &str) -> Option<RecoveryMethod> {
    match code {
        "MART" => Some(RecoveryMethod::Martingale),
        "GRID" => Some(RecoveryMethod::Grid),
        "HEDGE" => Some(RecoveryMethod::Hedge),
        "CORR" => Some(RecoveryMethod::Correlation),
        _ => None,
    }
}

pub fn strategy_label(kind: StrategyKind) -> String {
    format!("{}-{}", LABEL_PREFIX, kind.label_code())
}

pub fn recovery_label(method: RecoveryMethod, level: u32, origin: Option<&str>) -> String {
    let mut label = format!(
        "{}-{}-{}-L{}",
        LABEL_PREFIX,
        RECOVERY_SEGMENT,
        method_code(method),
        level
    );
    if let Some(origin) = origin {
        label.push('-');
        label.push_str(origin);
    }
    label
}

fn parse_level(raw: &str) -> Option<u32> {
    raw.strip_prefix('L')?.parse().ok()
}

pub fn parse_label(label: &str) -> PositionTag {
    let label = label.trim();
    if let Some(rest) = label.strip_prefix(LABEL_PREFIX).and_then(|r| r.strip_prefix('-')) {
        return parse_current(rest).unwrap_or(PositionTag::Manual);
    }
    parse_legacy(label).unwrap_or(PositionTag::Manual)
}

fn parse_current(rest: &str) -> Option<PositionTag> {
    let mut parts = rest.split('-');
    let head = parts.next()?;
    if head != RECOVERY_SEGMENT {
        return StrategyKind::from_label_code(head).map(PositionTag::Strategy);
    }
    let method = method_from_code(parts.next()?)?;
    let level = parse_level(parts.next()?)?;
    let origin = parts.next().filter(|o| !o.is_empty()).map(str::to_string);
    Some(PositionTag::Recovery { method, level, origin })
}

fn parse_legacy(label: &str) -> Option<PositionTag> {
    if let Some(level) = label.strip_prefix("Martingale-").and_then(parse_level) {
        return Some(PositionTag::Recovery {
            method: RecoveryMethod::Martingale,
            level,
            origin: None,
        });
    }
    if let Some(level) = label.strip_prefix("Grid-").and_then(parse_level) {
        return Some(PositionTag::Recovery {
            method: RecoveryMethod::Grid,
            level,
            origin: None,
        });
    }
    if label == "Hedge-Recovery" {
        return Some(PositionTag::Recovery {
            method: RecoveryMethod::Hedge,
            level: 1,
            origin: None,
        });
    }
    // case matters: "Corr-" is a recovery hedge, "CORR-" a pair-trade leg
    if let Some(origin) = label.strip_prefix("Corr-").filter(|o| !o.is_empty()) {
        return Some(PositionTag::Recovery {
            method: RecoveryMethod::Correlation,
            level: 1,
            origin: Some(origin.to_string()),
        });
    }

    let upper = label.to_ascii_uppercase();
    let kind = if upper.starts_with("ARB") {
        StrategyKind::Triangular
    } else if upper.starts_with("CORR") {
        StrategyKind::CorrelationPair
    } else if upper.starts_with("SCAL") {
        StrategyKind::Scalping
    } else if upper.starts_with("MOME") {
        StrategyKind::Momentum
    } else if upper.starts_with("MEAN") {
        StrategyKind::MeanReversion
    } else if upper.starts_with("BREA") {
        StrategyKind::Breakout
    } else {
        return None;
    };
    Some(PositionTag::Strategy(kind))
}
