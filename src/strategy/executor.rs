//! Order execution with compensating rollback for multi-leg plans.

use crate::broker::{Broker, OrderRequest, Side};
use crate::config::SizingConfig;
use crate::error::EngineError;
use crate::market::MarketSnapshotCache;
use crate::position::strategy_label;
use crate::strategy::signal::Signal;
use crate::utils::round_down_to_lot;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

/// Places the orders for admitted signals and recovery plans.
pub struct OrderExecutor {
    config: SizingConfig,
}

/// One filled order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedLeg {
    pub ticket: u64,
    pub instrument: String,
    pub side: Side,
    pub size: Decimal,
    pub price: Decimal,
    pub label: String,
}

impl OrderExecutor {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    fn validate_size(&self, instrument: &str, size: Decimal) -> Result<(), EngineError> {
        if size < self.config.min_lot || size > self.config.max_lot {
            return Err(EngineError::Validation(format!(
                "{} size {} outside [{}, {}]",
                instrument, size, self.config.min_lot, self.config.max_lot
            )));
        }
        if round_down_to_lot(size, self.config.lot_step) != size.normalize() {
            return Err(EngineError::Validation(format!(
                "{} size {} is not a multiple of {}",
                instrument, size, self.config.lot_step
            )));
        }
        Ok(())
    }

    /// Execute every leg of `signal` in order.
    ///
    /// A failure on the first leg is a transient error. A failure on leg k
    /// closes legs 1..k-1 before returning `PartialExecution`, so no
    /// partially-filled plan stays open.
    pub async fn execute(
        &self,
        broker: &dyn Broker,
        market: &MarketSnapshotCache,
        signal: &Signal,
    ) -> Result<Vec<ExecutedLeg>, EngineError> {
        let legs = signal.legs();
        if legs.is_empty() {
            return Err(EngineError::Validation(format!("{} signal has no legs", signal.kind())));
        }
        let size = self.config.default_lot;
        let label = strategy_label(signal.kind());

        // validate the whole plan before the first order goes out
        let mut priced = Vec::with_capacity(legs.len());
        for leg in &legs {
            self.validate_size(&leg.instrument, size)?;
            let quote = market.quote(&leg.instrument).ok_or_else(|| {
                EngineError::Validation(format!("no valid quote for {}", leg.instrument))
            })?;
            priced.push((leg, quote.entry_price(leg.side)));
        }

        info!(
            strategy = %signal.kind(),
            legs = legs.len(),
            %size,
            confidence = %signal.confidence(),
            edge = %signal.edge_pips(),
            "Executing signal"
        );

        let mut opened: Vec<ExecutedLeg> = Vec::with_capacity(legs.len());
        for (index, (leg, price)) in priced.into_iter().enumerate() {
            let request = OrderRequest::market(&leg.instrument, leg.side, size, &label).with_price(price);
            match broker.place_order(&request).await {
                Ok(receipt) => {
                    info!(
                        instrument = %leg.instrument,
                        side = %leg.side,
                        ticket = receipt.ticket,
                        price = %receipt.price,
                        "Leg filled"
                    );
                    opened.push(ExecutedLeg {
                        ticket: receipt.ticket,
                        instrument: leg.instrument.clone(),
                        side: leg.side,
                        size: receipt.size,
                        price: receipt.price,
                        label: label.clone(),
                    });
                }
                Err(e) if index == 0 => {
                    warn!(instrument = %leg.instrument, side = %leg.side, error = %e, "Order failed");
                    return Err(EngineError::transient(
                        format!("place_order {} {}", leg.side, leg.instrument),
                        e,
                    ));
                }
                Err(e) => {
                    error!(
                        strategy = %signal.kind(),
                        instrument = %leg.instrument,
                        leg = index + 1,
                        error = %e,
                        "Leg failed - rolling back opened legs"
                    );
                    let rolled_back = self.rollback(broker, &opened).await;
                    return Err(EngineError::PartialExecution {
                        strategy: signal.kind().to_string(),
                        opened: opened.len(),
                        legs: legs.len(),
                        rolled_back,
                        cause: e.to_string(),
                    });
                }
            }
        }

        Ok(opened)
    }

    /// Close `opened` in reverse order. Returns how many closed.
    async fn rollback(&self, broker: &dyn Broker, opened: &[ExecutedLeg]) -> usize {
        let mut closed = 0;
        for leg in opened.iter().rev() {
            match broker.close_position(leg.ticket).await {
                Ok(true) => {
                    info!(ticket = leg.ticket, instrument = %leg.instrument, "Rolled back leg");
                    closed += 1;
                }
                Ok(false) => {
                    warn!(ticket = leg.ticket, instrument = %leg.instrument, "Rollback close found no position");
                }
                Err(e) => {
                    error!(
                        ticket = leg.ticket,
                        instrument = %leg.instrument,
                        error = %e,
                        "CRITICAL: Failed to roll back leg"
                    );
                }
            }
        }
        closed
    }

    /// Place one order outside a signal, e.g. a recovery entry.
    pub async fn place_single(
        &self,
        broker: &dyn Broker,
        market: &MarketSnapshotCache,
        instrument: &str,
        side: Side,
        size: Decimal,
        label: &str,
    ) -> Result<ExecutedLeg, EngineError> {
        self.validate_size(instrument, size)?;
        let price = market
            .quote(instrument)
            .map(|q| q.entry_price(side))
            .ok_or_else(|| EngineError::Validation(format!("no valid quote for {}", instrument)))?;

        let request = OrderRequest::market(instrument, side, size, label).with_price(price);
        let receipt = broker
            .place_order(&request)
            .await
            .map_err(|e| EngineError::transient(format!("place_order {} {}", side, instrument), e))?;

        info!(%instrument, %side, %size, ticket = receipt.ticket, %label, "Order filled");
        Ok(ExecutedLeg {
            ticket: receipt.ticket,
            instrument: instrument.to_string(),
            side,
            size: receipt.size,
            price: receipt.price,
            label: label.to_string(),
        })
    }
}
