//! Broker connectivity.
//!
//! - `traits`: the `Broker` interface the engine consumes
//! - `bridge`: HTTP client for a terminal bridge
//! - `paper`: simulated fills for paper trading

pub mod bridge;
pub mod paper;
pub mod traits;
pub mod types;

pub use bridge::BridgeClient;
pub use paper::PaperBroker;
pub use traits::Broker;
#[cfg(test)]
pub use traits::MockBroker;
pub use types::*;
