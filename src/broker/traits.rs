//! Broker abstraction consumed by the engine.
//!
//! Implemented by:
//! - `BridgeClient`: live terminal bridge over HTTP
//! - `PaperBroker`: in-memory fills for paper trading and tests

use crate::broker::types::{BrokerPosition, OrderReceipt, OrderRequest, Tick};
use crate::error::BrokerError;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Narrow order-routing and account interface.
///
/// Every call may fail transiently; the engine treats failures as
/// retry-next-cycle and never blocks on them.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Broker: Send + Sync {
    /// Latest tick, or `None` if the terminal has no quote for `instrument`.
    async fn get_tick(&self, instrument: &str) -> Result<Option<Tick>, BrokerError>;

    /// All open positions.
    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError>;

    /// Open positions on one instrument.
    async fn get_positions_for(&self, instrument: &str) -> Result<Vec<BrokerPosition>, BrokerError>;

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderReceipt, BrokerError>;

    /// Close one position. `Ok(false)` means the ticket was not open.
    async fn close_position(&self, ticket: u64) -> Result<bool, BrokerError>;

    /// Close everything. Returns how many positions were closed.
    async fn close_all_positions(&self) -> Result<usize, BrokerError>;

    async fn account_balance(&self) -> Result<Decimal, BrokerError>;
}
