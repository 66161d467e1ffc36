//! Trading strategy implementation.
//!
//! Contains the core logic for:
//! - Opportunity scanning across six deterministic strategies
//! - Admission control over the scanned candidates
//! - Order execution with multi-leg rollback

mod admission;
mod breakout;
mod correlation;
mod executor;
mod mean_reversion;
mod momentum;
mod scalping;
mod scanner;
pub mod signal;
mod triangular;

pub use admission::{AdmissionController, RejectReason};
pub use breakout::BreakoutScanner;
pub use correlation::{currency_groups, CorrelationScanner};
pub use executor::{ExecutedLeg, OrderExecutor};
pub use mean_reversion::MeanReversionScanner;
pub use momentum::MomentumScanner;
pub use scalping::ScalpingScanner;
pub use scanner::{Scanner, ScannerSet};
pub use signal::{
    BreakoutSignal, Direction, Leg, MeanReversionSignal, MomentumSignal, PairTradeSignal, ScalpSignal, Signal,
    SignalMeta, StrategyKind, TriangularSignal,
};
pub use triangular::{choose_direction, synthetic_cross, Synthetic, TriangularScanner};
