//! HTTP client for an MT5-style terminal bridge.
//!
//! Every request carries `X-API-KEY`, `X-TIMESTAMP` and `X-SIGNATURE`, the
//! latter an HMAC-SHA256 over `timestamp + method + path + body`.

use crate::broker::traits::Broker;
use crate::broker::types::*;
use crate::config::{BridgeConfig, SizingConfig};
use crate::error::BrokerError;
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Terminal return code for a completed request.
pub const RETCODE_DONE: u32 = 10009;
/// Terminal return code when the position no longer exists.
pub const RETCODE_POSITION_CLOSED: u32 = 10036;

#[derive(Debug, Serialize)]
struct OrderWire<'a> {
    instrument: &'a str,
    side: Side,
    #[serde(with = "rust_decimal::serde::str")]
    volume: Decimal,
    #[serde(with = "rust_decimal::serde::str_option", skip_serializing_if = "Option::is_none")]
    price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option", skip_serializing_if = "Option::is_none")]
    sl: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option", skip_serializing_if = "Option::is_none")]
    tp: Option<Decimal>,
    deviation: u32,
    magic: u64,
    comment: &'a str,
}

#[derive(Debug, Deserialize)]
struct TradeResult {
    retcode: u32,
    #[serde(default)]
    order: u64,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    price: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    volume: Option<Decimal>,
    #[serde(default)]
    comment: String,
}

#[derive(Debug, Deserialize)]
struct CloseAllResult {
    closed: usize,
}

/// Live broker backed by the terminal bridge.
pub struct BridgeClient {
    http: Client,
    base_url: String,
    api_key: String,
    secret_key: String,
    deviation: u32,
    magic: u64,
}

impl BridgeClient {
    /// Create a new bridge client from configuration.
    pub fn new(bridge: &BridgeConfig, sizing: &SizingConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(bridge.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: bridge.base_url.trim_end_matches('/').to_string(),
            api_key: bridge.api_key.clone(),
            secret_key: bridge.secret_key.clone(),
            deviation: sizing.deviation_points,
            magic: sizing.magic,
        })
    }

    /// Generate HMAC-SHA256 signature for a request.
    fn sign(&self, payload: &str) -> Result<String, BrokerError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| BrokerError::Transport(format!("invalid signing key: {e}")))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<Option<T>, BrokerError> {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let body = body.unwrap_or_default();
        let signature = self.sign(&format!("{}{}{}{}", timestamp, method.as_str(), path, body))?;

        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .request(method, &url)
            .header("X-API-KEY", &self.api_key)
            .header("X-TIMESTAMP", &timestamp)
            .header("X-SIGNATURE", signature);
        if !body.is_empty() {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| BrokerError::Decode(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, BrokerError> {
        self.request(Method::GET, path, None).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<T>, BrokerError> {
        let body = serde_json::to_string(body).map_err(|e| BrokerError::Decode(e.to_string()))?;
        self.request(Method::POST, path, Some(body)).await
    }
}

#[async_trait]
impl Broker for BridgeClient {
    #[instrument(skip(self))]
    async fn get_tick(&self, instrument: &str) -> Result<Option<Tick>, BrokerError> {
        let path = format!("/tick/{}", urlencoding::encode(instrument));
        self.get(&path).await
    }

    #[instrument(skip(self))]
    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        Ok(self.get("/positions").await?.unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn get_positions_for(&self, instrument: &str) -> Result<Vec<BrokerPosition>, BrokerError> {
        let path = format!("/positions?instrument={}", urlencoding::encode(instrument));
        Ok(self.get(&path).await?.unwrap_or_default())
    }

    #[instrument(skip(self), fields(instrument = %order.instrument, side = %order.side, size = %order.size))]
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderReceipt, BrokerError> {
        let wire = OrderWire {
            instrument: &order.instrument,
            side: order.side,
            volume: order.size,
            price: order.price,
            sl: order.stop_loss,
            tp: order.take_profit,
            deviation: self.deviation,
            magic: self.magic,
            comment: &order.label,
        };
        debug!(label = %order.label, "Placing order");

        let result: TradeResult = self
            .post("/order", &wire)
            .await?
            .ok_or_else(|| BrokerError::UnknownInstrument(order.instrument.clone()))?;

        if result.retcode != RETCODE_DONE {
            warn!(retcode = result.retcode, comment = %result.comment, "Order rejected");
            return Err(BrokerError::Rejected {
                code: result.retcode,
                message: result.comment,
            });
        }

        Ok(OrderReceipt {
            ticket: result.order,
            price: result.price.or(order.price).unwrap_or_default(),
            size: result.volume.unwrap_or(order.size),
        })
    }

    #[instrument(skip(self))]
    async fn close_position(&self, ticket: u64) -> Result<bool, BrokerError> {
        let path = format!("/positions/{}/close", ticket);
        let result: Option<TradeResult> = self.post(&path, &serde_json::json!({})).await?;
        match result {
            None => Ok(false),
            Some(r) if r.retcode == RETCODE_DONE => Ok(true),
            Some(r) if r.retcode == RETCODE_POSITION_CLOSED => Ok(false),
            Some(r) => Err(BrokerError::Rejected {
                code: r.retcode,
                message: r.comment,
            }),
        }
    }

    #[instrument(skip(self))]
    async fn close_all_positions(&self) -> Result<usize, BrokerError> {
        let result: Option<CloseAllResult> = self
            .post("/positions/close-all", &serde_json::json!({}))
            .await?;
        Ok(result.map(|r| r.closed).unwrap_or(0))
    }

    #[instrument(skip(self))]
    async fn account_balance(&self) -> Result<Decimal, BrokerError> {
        let info: AccountInfo = self
            .get("/account")
            .await?
            .ok_or_else(|| BrokerError::Decode("account endpoint returned 404".to_string()))?;
        Ok(info.balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> BridgeClient {
        let bridge = BridgeConfig {
            base_url: server.uri(),
            api_key: "test-key".to_string(),
            secret_key: "test-secret".to_string(),
            timeout_secs: 5,
        };
        BridgeClient::new(&bridge, &SizingConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_get_tick_sends_signed_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tick/EURUSD"))
            .and(header("X-API-KEY", "test-key"))
            .and(header_exists("X-SIGNATURE"))
            .and(header_exists("X-TIMESTAMP"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "instrument": "EURUSD",
                "bid": "1.10000",
                "ask": "1.10012",
                "time": 1760400000
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tick = client(&server).get_tick("EURUSD").await.unwrap().unwrap();
        assert_eq!(tick.bid, dec!(1.10000));
        assert_eq!(tick.ask, dec!(1.10012));
        assert_eq!(tick.time.timestamp(), 1_760_400_000);
    }

    #[tokio::test]
    async fn test_missing_tick_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tick/XAUUSD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(client(&server).get_tick("XAUUSD").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_error_maps_to_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/positions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("terminal offline"))
            .mount(&server)
            .await;

        let err = client(&server).get_positions().await.unwrap_err();
        assert!(matches!(err, BrokerError::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_positions_filtered_by_instrument() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/positions"))
            .and(query_param("instrument", "GBPUSD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "ticket": 7,
                "instrument": "GBPUSD",
                "side": "SELL",
                "size": "0.01",
                "open_price": "1.30000",
                "current_price": "1.30100",
                "profit": "-1.00",
                "open_time": 1760400000,
                "label": "HFX-CORR"
            }])))
            .mount(&server)
            .await;

        let positions = client(&server).get_positions_for("GBPUSD").await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].side, Side::Sell);
        assert_eq!(positions[0].profit, dec!(-1.00));
    }

    #[tokio::test]
    async fn test_place_order_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/order"))
            .and(body_partial_json(json!({
                "instrument": "EURUSD",
                "side": "BUY",
                "volume": "0.01",
                "deviation": 20,
                "magic": 234000,
                "comment": "HFX-MOMO"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "retcode": 10009,
                "order": 991,
                "price": "1.10012",
                "volume": "0.01"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let order = OrderRequest::market("EURUSD", Side::Buy, dec!(0.01), "HFX-MOMO");
        let receipt = client(&server).place_order(&order).await.unwrap();
        assert_eq!(receipt.ticket, 991);
        assert_eq!(receipt.price, dec!(1.10012));
    }

    #[tokio::test]
    async fn test_place_order_rejected_retcode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/order"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "retcode": 10019,
                "comment": "No money"
            })))
            .mount(&server)
            .await;

        let order = OrderRequest::market("EURUSD", Side::Sell, dec!(0.5), "HFX-SCALP");
        let err = client(&server).place_order(&order).await.unwrap_err();
        match err {
            BrokerError::Rejected { code, message } => {
                assert_eq!(code, 10019);
                assert_eq!(message, "No money");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_close_position_already_closed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/positions/42/close"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "retcode": 10036 })))
            .mount(&server)
            .await;

        assert!(!client(&server).close_position(42).await.unwrap());
    }

    #[tokio::test]
    async fn test_close_all_and_balance() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/positions/close-all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "closed": 4 })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/account"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "balance": "10250.50",
                "equity": "10180.00"
            })))
            .mount(&server)
            .await;

        let c = client(&server);
        assert_eq!(c.close_all_positions().await.unwrap(), 4);
        assert_eq!(c.account_balance().await.unwrap(), dec!(10250.50));
    }

    #[test]
    fn test_signature_is_deterministic_hex() {
        let bridge = BridgeConfig {
            secret_key: "secret".to_string(),
            ..BridgeConfig::default()
        };
        let c = BridgeClient::new(&bridge, &SizingConfig::default()).unwrap();
        let a = c.sign("1700000000000GET/positions").unwrap();
        let b = c.sign("1700000000000GET/positions").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, c.sign("1700000000000GET/account").unwrap());
    }
}
