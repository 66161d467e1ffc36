//! Error types shared across the engine.
//!
//! - `EngineError`: cycle-level failure taxonomy, drives how the scan loop reacts
//! - `BrokerError`: failures reported by a `Broker` implementation

use thiserror::Error;

/// Failures surfaced by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A quote, order or snapshot call failed. Retried by a later cycle.
    #[error("transient I/O failure during {operation}: {message}")]
    TransientIo { operation: String, message: String },

    /// Malformed signal, out-of-bounds size or stale quote. Dropped, not retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A multi-leg plan failed after some legs were opened.
    #[error(
        "partial execution of {strategy}: {opened}/{legs} legs opened, {rolled_back} rolled back ({cause})"
    )]
    PartialExecution {
        strategy: String,
        opened: usize,
        legs: usize,
        rolled_back: usize,
        cause: String,
    },

    /// An aggregate portfolio threshold was crossed.
    #[error("portfolio breach: {0}")]
    PortfolioBreach(String),

    /// Invalid thresholds at startup.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl EngineError {
    pub fn transient(operation: impl Into<String>, message: impl ToString) -> Self {
        EngineError::TransientIo {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Whether a later cycle may succeed where this one failed.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::TransientIo { .. })
    }

    /// Short tag used in logs and error notifications.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::TransientIo { .. } => "transient_io",
            EngineError::Validation(_) => "validation",
            EngineError::PartialExecution { .. } => "partial_execution",
            EngineError::PortfolioBreach(_) => "portfolio_breach",
            EngineError::Configuration(_) => "configuration",
        }
    }
}

/// Failures reported by a broker adapter.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The terminal answered but refused the request.
    #[error("rejected with retcode {code}: {message}")]
    Rejected { code: u32, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("unknown instrument {0}")]
    UnknownInstrument(String),
}

impl From<reqwest::Error> for BrokerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BrokerError::Decode(err.to_string())
        } else {
            BrokerError::Transport(err.to_string())
        }
    }
}

impl From<BrokerError> for EngineError {
    fn from(err: BrokerError) -> Self {
        EngineError::transient("broker", err)
    }
}
