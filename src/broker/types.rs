//! Broker-facing data types.
//!
//! Decimal fields travel as strings on the wire, matching the bridge's
//! JSON encoding.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order/position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// +1 for buy, -1 for sell.
    pub fn sign(self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Best bid/ask for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub instrument: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub bid: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub ask: Decimal,
    /// Terminal time of the quote (unix seconds on the wire)
    #[serde(with = "chrono::serde::ts_seconds")]
    pub time: DateTime<Utc>,
}

/// An open position as reported by the terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub ticket: u64,
    pub instrument: String,
    pub side: Side,
    #[serde(with = "rust_decimal::serde::str")]
    pub size: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub open_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub current_price: Decimal,
    /// Floating profit in account currency
    #[serde(with = "rust_decimal::serde::str")]
    pub profit: Decimal,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub open_time: DateTime<Utc>,
    /// Order comment carrying the strategy tag
    #[serde(default)]
    pub label: String,
}

/// Market order request.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub instrument: String,
    pub side: Side,
    pub size: Decimal,
    /// Expected fill price; the terminal fills at market within its deviation
    pub price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub label: String,
}

impl OrderRequest {
    pub fn market(instrument: &str, side: Side, size: Decimal, label: &str) -> Self {
        Self {
            instrument: instrument.to_string(),
            side,
            size,
            price: None,
            stop_loss: None,
            take_profit: None,
            label: label.to_string(),
        }
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }
}

/// Accepted order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderReceipt {
    pub ticket: u64,
    pub price: Decimal,
    pub size: Decimal,
}

/// Account snapshot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccountInfo {
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub equity: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_helpers() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.sign(), dec!(-1));
        assert_eq!(Side::Sell.to_string(), "SELL");
    }

    #[test]
    fn test_position_deserializes_from_bridge_json() {
        let raw = r#"{
            "ticket": 5001,
            "instrument": "EURUSD",
            "side": "BUY",
            "size": "0.02",
            "open_price": "1.09950",
            "current_price": "1.10010",
            "profit": "1.20",
            "open_time": 1760400000,
            "label": "HFX-MOMO"
        }"#;
        let pos: BrokerPosition = serde_json::from_str(raw).unwrap();
        assert_eq!(pos.ticket, 5001);
        assert_eq!(pos.side, Side::Buy);
        assert_eq!(pos.size, dec!(0.02));
        assert_eq!(pos.open_time.timestamp(), 1_760_400_000);
    }
}
