//! Fire-and-forget notification channels.
//!
//! Three broadcast channels carry raised signals, trade opens/closes and
//! errors. Sending never blocks the scan loop; with no subscribers, or a
//! lagging one, events are simply dropped.

use crate::broker::Side;
use crate::strategy::{Signal, StrategyKind};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct SignalEvent {
    pub signal: Signal,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TradeAction {
    Open,
    Close { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeEvent {
    pub action: TradeAction,
    pub ticket: u64,
    pub instrument: String,
    pub side: Side,
    pub size: Decimal,
    pub price: Decimal,
    pub label: String,
    pub strategy: Option<StrategyKind>,
    /// Profit at close; zero on open
    pub profit: Decimal,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    /// Error class, e.g. "transient_io"
    pub kind: String,
    /// What was being attempted
    pub context: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct EventBus {
    signals: broadcast::Sender<SignalEvent>,
    trades: broadcast::Sender<TradeEvent>,
    errors: broadcast::Sender<ErrorEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (signals, _) = broadcast::channel(capacity);
        let (trades, _) = broadcast::channel(capacity);
        let (errors, _) = broadcast::channel(capacity);
        Self { signals, trades, errors }
    }

    pub fn subscribe_signals(&self) -> broadcast::Receiver<SignalEvent> {
        self.signals.subscribe()
    }

    pub fn subscribe_trades(&self) -> broadcast::Receiver<TradeEvent> {
        self.trades.subscribe()
    }

    pub fn subscribe_errors(&self) -> broadcast::Receiver<ErrorEvent> {
        self.errors.subscribe()
    }

    pub fn signal(&self, signal: &Signal, at: DateTime<Utc>) {
        let _ = self.signals.send(SignalEvent {
            signal: signal.clone(),
            at,
        });
    }

    pub fn trade(&self, event: TradeEvent) {
        let _ = self.trades.send(event);
    }

    pub fn error(&self, kind: &str, context: impl Into<String>, message: impl ToString, at: DateTime<Utc>) {
        let _ = self.errors.send(ErrorEvent {
            kind: kind.to_string(),
            context: context.into(),
            message: message.to_string(),
            at,
        });
    }
}
