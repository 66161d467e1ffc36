//! The scan loop.
//!
//! - `cycle`: one fixed-order pass over snapshot, exits, entries and recovery
//! - `context`: state owned by the loop and the status snapshot it publishes
//! - `events`: broadcast channels for signals, trades and errors
//! - `runner`: start/stop/status around the loop task

mod context;
mod cycle;
pub mod events;
mod runner;

pub use context::{EngineContext, EngineStats, EngineStatus};
pub use cycle::{CycleReport, Pipeline};
pub use events::{ErrorEvent, EventBus, SignalEvent, TradeAction, TradeEvent};
pub use runner::Engine;
