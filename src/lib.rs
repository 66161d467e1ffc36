//! # Hybrid FX Engine
//!
//! A multi-strategy FX trading engine driving a terminal bridge.
//!
//! ## Architecture
//!
//! - `config`: Configuration loading and validation
//! - `broker`: Terminal bridge client, paper broker and the `Broker` trait
//! - `market`: Quote validation and the per-cycle snapshot cache
//! - `position`: Open positions and label attribution
//! - `strategy`: Signal scanners, admission and order execution
//! - `risk`: Exit rules, portfolio overlay, recovery, breaker and alerts
//! - `engine`: The sequential scan loop and its notification channels
//! - `utils`: Shared decimal arithmetic

pub mod broker;
pub mod config;
pub mod engine;
pub mod error;
pub mod market;
pub mod position;
pub mod risk;
pub mod strategy;
pub mod utils;

pub use config::Config;
pub use engine::Engine;
pub use error::{BrokerError, EngineError};
