//! Paper trading broker with simulated fills.
//!
//! Quotes come from `set_tick` or from an attached live feed. Positions are
//! marked to the latest quote: buys at the bid, sells at the ask.

use crate::broker::traits::Broker;
use crate::broker::types::*;
use crate::error::BrokerError;
use crate::market::pip_factor;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Retcode reported when an instrument is blocked via `reject_orders_for`.
pub const RETCODE_REJECTED: u32 = 10006;
/// Retcode reported when no quote is available.
pub const RETCODE_NO_QUOTES: u32 = 10021;

#[derive(Debug, Clone)]
struct PaperPosition {
    ticket: u64,
    instrument: String,
    side: Side,
    size: Decimal,
    open_price: Decimal,
    open_time: DateTime<Utc>,
    label: String,
}

/// Simulated account state.
#[derive(Debug)]
pub struct PaperState {
    pub initial_balance: Decimal,
    pub balance: Decimal,
    pub realized: Decimal,
    pub order_count: u64,
    positions: BTreeMap<u64, PaperPosition>,
    ticks: HashMap<String, Tick>,
    rejected: HashSet<String>,
}

/// In-memory broker used by the `paper` command and the tests.
pub struct PaperBroker {
    state: Arc<RwLock<PaperState>>,
    ticket_counter: AtomicU64,
    /// Account-currency value of one pip on one standard lot
    pip_value_per_lot: Decimal,
    feed: Option<Arc<dyn Broker>>,
}

impl PaperBroker {
    /// Create a paper broker with `initial_balance` and no quote feed.
    pub fn new(initial_balance: Decimal, pip_value_per_lot: Decimal) -> Self {
        Self {
            state: Arc::new(RwLock::new(PaperState {
                initial_balance,
                balance: initial_balance,
                realized: Decimal::ZERO,
                order_count: 0,
                positions: BTreeMap::new(),
                ticks: HashMap::new(),
                rejected: HashSet::new(),
            })),
            ticket_counter: AtomicU64::new(1),
            pip_value_per_lot,
            feed: None,
        }
    }

    /// Pull quotes from `feed` instead of `set_tick`.
    pub fn with_feed(mut self, feed: Arc<dyn Broker>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub async fn set_tick(&self, instrument: &str, bid: Decimal, ask: Decimal, time: DateTime<Utc>) {
        let tick = Tick {
            instrument: instrument.to_string(),
            bid,
            ask,
            time,
        };
        self.state.write().await.ticks.insert(instrument.to_string(), tick);
    }

    pub async fn clear_tick(&self, instrument: &str) {
        self.state.write().await.ticks.remove(instrument);
    }

    /// Make every subsequent order on `instrument` fail.
    pub async fn reject_orders_for(&self, instrument: &str) {
        self.state.write().await.rejected.insert(instrument.to_string());
    }

    pub async fn accept_orders_for(&self, instrument: &str) {
        self.state.write().await.rejected.remove(instrument);
    }

    /// Current balance plus floating profit.
    pub async fn equity(&self) -> Decimal {
        let state = self.state.read().await;
        let floating: Decimal = state
            .positions
            .values()
            .map(|p| self.mark(p, &state.ticks).1)
            .sum();
        state.balance + floating
    }

    pub async fn open_count(&self) -> usize {
        self.state.read().await.positions.len()
    }

    /// Realized profit and order count.
    pub async fn summary(&self) -> (Decimal, u64) {
        let state = self.state.read().await;
        (state.realized, state.order_count)
    }

    /// (current price, floating profit) for a position.
    fn mark(&self, position: &PaperPosition, ticks: &HashMap<String, Tick>) -> (Decimal, Decimal) {
        let current = match ticks.get(&position.instrument) {
            Some(tick) => match position.side {
                Side::Buy => tick.bid,
                Side::Sell => tick.ask,
            },
            None => position.open_price,
        };
        let pips = (current - position.open_price) * position.side.sign() * pip_factor(&position.instrument);
        let profit = (pips * self.pip_value_per_lot * position.size).round_dp(2);
        (current, profit)
    }

    fn to_broker_position(&self, position: &PaperPosition, ticks: &HashMap<String, Tick>) -> BrokerPosition {
        let (current_price, profit) = self.mark(position, ticks);
        BrokerPosition {
            ticket: position.ticket,
            instrument: position.instrument.clone(),
            side: position.side,
            size: position.size,
            open_price: position.open_price,
            current_price,
            profit,
            open_time: position.open_time,
            label: position.label.clone(),
        }
    }
}

#[async_trait]
impl Broker for PaperBroker {
    async fn get_tick(&self, instrument: &str) -> Result<Option<Tick>, BrokerError> {
        if let Some(feed) = &self.feed {
            let tick = feed.get_tick(instrument).await?;
            let mut state = self.state.write().await;
            match &tick {
                Some(t) => {
                    state.ticks.insert(instrument.to_string(), t.clone());
                }
                None => {
                    state.ticks.remove(instrument);
                }
            }
            return Ok(tick);
        }
        Ok(self.state.read().await.ticks.get(instrument).cloned())
    }

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        let state = self.state.read().await;
        Ok(state
            .positions
            .values()
            .map(|p| self.to_broker_position(p, &state.ticks))
            .collect())
    }

    async fn get_positions_for(&self, instrument: &str) -> Result<Vec<BrokerPosition>, BrokerError> {
        let state = self.state.read().await;
        Ok(state
            .positions
            .values()
            .filter(|p| p.instrument == instrument)
            .map(|p| self.to_broker_position(p, &state.ticks))
            .collect())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderReceipt, BrokerError> {
        let mut state = self.state.write().await;

        if state.rejected.contains(&order.instrument) {
            return Err(BrokerError::Rejected {
                code: RETCODE_REJECTED,
                message: format!("orders on {} are blocked", order.instrument),
            });
        }
        if order.size <= Decimal::ZERO {
            return Err(BrokerError::Rejected {
                code: RETCODE_REJECTED,
                message: "invalid volume".to_string(),
            });
        }

        let tick = state
            .ticks
            .get(&order.instrument)
            .cloned()
            .ok_or_else(|| BrokerError::Rejected {
                code: RETCODE_NO_QUOTES,
                message: format!("no quote for {}", order.instrument),
            })?;

        let price = match order.side {
            Side::Buy => tick.ask,
            Side::Sell => tick.bid,
        };
        let ticket = self.ticket_counter.fetch_add(1, Ordering::SeqCst);

        state.positions.insert(
            ticket,
            PaperPosition {
                ticket,
                instrument: order.instrument.clone(),
                side: order.side,
                size: order.size,
                open_price: price,
                open_time: tick.time,
                label: order.label.clone(),
            },
        );
        state.order_count += 1;

        debug!(
            ticket,
            instrument = %order.instrument,
            side = %order.side,
            size = %order.size,
            %price,
            label = %order.label,
            "Paper fill"
        );

        Ok(OrderReceipt {
            ticket,
            price,
            size: order.size,
        })
    }

    async fn close_position(&self, ticket: u64) -> Result<bool, BrokerError> {
        let mut state = self.state.write().await;
        let Some(position) = state.positions.remove(&ticket) else {
            return Ok(false);
        };
        let (exit_price, profit) = self.mark(&position, &state.ticks);
        state.balance += profit;
        state.realized += profit;

        debug!(
            ticket,
            instrument = %position.instrument,
            %exit_price,
            %profit,
            "Paper close"
        );
        Ok(true)
    }

    async fn close_all_positions(&self) -> Result<usize, BrokerError> {
        let mut state = self.state.write().await;
        let positions: Vec<PaperPosition> = std::mem::take(&mut state.positions).into_values().collect();
        let mut total = Decimal::ZERO;
        for position in &positions {
            total += self.mark(position, &state.ticks).1;
        }
        state.balance += total;
        state.realized += total;

        info!(closed = positions.len(), realized = %total, "Paper account flattened");
        Ok(positions.len())
    }

    async fn account_balance(&self) -> Result<Decimal, BrokerError> {
        Ok(self.state.read().await.balance)
    }
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new(dec!(10000), dec!(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fill_at_ask_and_mark_at_bid() {
        let broker = PaperBroker::default();
        let now = Utc::now();
        broker.set_tick("EURUSD", dec!(1.09940), dec!(1.09950), now).await;

        let order = OrderRequest::market("EURUSD", Side::Buy, dec!(0.10), "HFX-MOMO");
        let receipt = broker.place_order(&order).await.unwrap();
        assert_eq!(receipt.price, dec!(1.09950));

        broker.set_tick("EURUSD", dec!(1.10050), dec!(1.10060), now).await;
        let positions = broker.get_positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        // 10 pips * $10/pip/lot * 0.10 lots
        assert_eq!(positions[0].profit, dec!(10.00));
        assert_eq!(positions[0].current_price, dec!(1.10050));
    }

    #[tokio::test]
    async fn test_sell_marks_at_ask_for_jpy() {
        let broker = PaperBroker::default();
        let now = Utc::now();
        broker.set_tick("USDJPY", dec!(150.00), dec!(150.02), now).await;
        broker
            .place_order(&OrderRequest::market("USDJPY", Side::Sell, dec!(1), "HFX-BRKO"))
            .await
            .unwrap();

        broker.set_tick("USDJPY", dec!(149.88), dec!(149.90), now).await;
        let positions = broker.get_positions_for("USDJPY").await.unwrap();
        // (149.90 - 150.00) * -1 * 100 = 10 pips
        assert_eq!(positions[0].profit, dec!(100.00));
    }

    #[tokio::test]
    async fn test_rejection_injection() {
        let broker = PaperBroker::default();
        broker.set_tick("GBPUSD", dec!(1.3), dec!(1.3001), Utc::now()).await;
        broker.reject_orders_for("GBPUSD").await;

        let order = OrderRequest::market("GBPUSD", Side::Buy, dec!(0.01), "HFX-ARB");
        assert!(matches!(
            broker.place_order(&order).await,
            Err(BrokerError::Rejected { code: RETCODE_REJECTED, .. })
        ));

        broker.accept_orders_for("GBPUSD").await;
        assert!(broker.place_order(&order).await.is_ok());
    }

    #[tokio::test]
    async fn test_close_realizes_profit() {
        let broker = PaperBroker::new(dec!(1000), dec!(10));
        let now = Utc::now();
        broker.set_tick("EURUSD", dec!(1.1000), dec!(1.1001), now).await;
        let receipt = broker
            .place_order(&OrderRequest::market("EURUSD", Side::Buy, dec!(1), "HFX-SCALP"))
            .await
            .unwrap();

        broker.set_tick("EURUSD", dec!(1.1006), dec!(1.1007), now).await;
        assert!(broker.close_position(receipt.ticket).await.unwrap());
        assert!(!broker.close_position(receipt.ticket).await.unwrap());
        assert_eq!(broker.account_balance().await.unwrap(), dec!(1050.00));
    }

    #[tokio::test]
    async fn test_close_all_and_no_quote() {
        let broker = PaperBroker::default();
        let now = Utc::now();
        let no_quote = broker
            .place_order(&OrderRequest::market("EURGBP", Side::Buy, dec!(0.01), "HFX-ARB"))
            .await;
        assert!(matches!(
            no_quote,
            Err(BrokerError::Rejected { code: RETCODE_NO_QUOTES, .. })
        ));

        broker.set_tick("EURGBP", dec!(0.85), dec!(0.8501), now).await;
        for _ in 0..3 {
            broker
                .place_order(&OrderRequest::market("EURGBP", Side::Sell, dec!(0.01), "HFX-ARB"))
                .await
                .unwrap();
        }
        assert_eq!(broker.close_all_positions().await.unwrap(), 3);
        assert_eq!(broker.open_count().await, 0);
    }
}
