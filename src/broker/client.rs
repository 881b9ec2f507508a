/// Client for the broker bridge's pinned HTTP interface. One instance per
/// account (§4.10): each account's `BrokerClient` is built from that
/// account's own `broker_base_url`, giving each account pooled connections
/// to a distinct broker instance.
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TradingError};
use crate::types::{OrderKind, TradeDirection};

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PriceQuote {
    pub bid: f64,
    pub ask: f64,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryBar {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenPosition {
    pub symbol: String,
    pub ticket: String,
    pub direction: TradeDirection,
    pub volume: f64,
    pub open_price: f64,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub open_time: DateTime<Utc>,
    pub profit: Option<f64>,
    #[serde(default)]
    pub commission: Option<f64>,
    #[serde(default)]
    pub swap: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenPositionsResponse {
    success: bool,
    #[serde(default)]
    positions: Vec<OpenPosition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PendingOrder {
    pub symbol: String,
    pub ticket: String,
    pub direction: TradeDirection,
    pub volume: f64,
    pub entry_price: f64,
    #[serde(default)]
    pub sl: Option<f64>,
    #[serde(default)]
    pub tp: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct PendingOrdersResponse {
    success: bool,
    #[serde(default)]
    orders: Vec<PendingOrder>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountSummary {
    pub success: bool,
    pub balance: f64,
    pub equity: f64,
    pub margin: f64,
    pub free_margin: f64,
    pub margin_level: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LargeOrder {
    pub volume: f64,
    pub side: String,
    pub price: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderFlowSnapshot {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub bid_volume: f64,
    pub ask_volume: f64,
    pub delta: f64,
    pub delta_sign: i32,
    pub imbalance_buy_pct: f64,
    pub imbalance_sell_pct: f64,
    #[serde(default)]
    pub large_orders: Vec<LargeOrder>,
}

#[derive(Debug, Serialize)]
struct OpenTradeRequest<'a> {
    symbol: &'a str,
    direction: &'a str,
    order_kind: &'a str,
    entry_price: f64,
    lot_size: f64,
    stop_loss: f64,
    take_profit: f64,
    strategy: &'a str,
    metadata: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct TradeOpenResponse {
    pub success: bool,
    pub ticket: Option<String>,
    pub error: Option<String>,
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct CloseTradeRequest<'a> {
    ticket: &'a str,
    reason: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct CancelTradeRequest<'a> {
    ticket: &'a str,
}

#[derive(Debug, Serialize)]
struct ModifyTradeRequest<'a> {
    ticket: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_loss: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    take_profit: Option<f64>,
}

#[derive(Debug, Serialize)]
struct PartialCloseRequest<'a> {
    ticket: &'a str,
    volume_percent: f64,
}

#[derive(Debug, Deserialize)]
struct ActionResponse {
    success: bool,
    error: Option<String>,
}

pub struct BrokerClient {
    http: Client,
    base_url: String,
}

impl BrokerClient {
    pub fn new(base_url: String, timeout_secs: u64) -> Self {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("failed to build broker http client");
        BrokerClient { http, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn price(&self, symbol: &str) -> Result<PriceQuote> {
        let resp = self.http.get(self.url(&format!("/api/v1/price/{}", symbol))).send().await?;
        Ok(resp.error_for_status()?.json().await?)
    }

    pub async fn history(&self, symbol: &str, timeframe: &str, days: u32) -> Result<Vec<HistoryBar>> {
        let resp = self
            .http
            .get(self.url("/api/v1/history"))
            .query(&[("symbol", symbol), ("timeframe", timeframe), ("days", &days.to_string())])
            .send()
            .await?;
        Ok(resp.error_for_status()?.json().await?)
    }

    pub async fn symbols(&self) -> Result<Vec<String>> {
        let resp = self.http.get(self.url("/api/v1/symbols")).send().await?;
        Ok(resp.error_for_status()?.json().await?)
    }

    pub async fn open_positions(&self) -> Result<Vec<OpenPosition>> {
        let resp = self.http.get(self.url("/api/v1/open-positions")).send().await?;
        let body: OpenPositionsResponse = resp.error_for_status()?.json().await?;
        if !body.success {
            return Err(TradingError::BrokerApiError {
                code: "OPEN_POSITIONS_FAILED".to_string(),
                message: "broker reported failure".to_string(),
            });
        }
        Ok(body.positions)
    }

    pub async fn pending_orders(&self) -> Result<Vec<PendingOrder>> {
        let resp = self.http.get(self.url("/api/v1/pending-orders")).send().await?;
        let body: PendingOrdersResponse = resp.error_for_status()?.json().await?;
        if !body.success {
            return Err(TradingError::BrokerApiError {
                code: "PENDING_ORDERS_FAILED".to_string(),
                message: "broker reported failure".to_string(),
            });
        }
        Ok(body.orders)
    }

    pub async fn account_summary(&self) -> Result<AccountSummary> {
        let resp = self.http.get(self.url("/api/v1/account-summary")).send().await?;
        let body: AccountSummary = resp.error_for_status()?.json().await?;
        if !body.success {
            return Err(TradingError::BrokerApiError {
                code: "ACCOUNT_SUMMARY_FAILED".to_string(),
                message: "broker reported failure".to_string(),
            });
        }
        Ok(body)
    }

    /// `None` on a 404: the order-flow feature is absent for this broker
    /// bridge deployment, and callers treat that as "stay silent".
    pub async fn order_flow(&self, symbol: &str) -> Result<Option<OrderFlowSnapshot>> {
        let resp = self.http.get(self.url(&format!("/api/v1/order-flow/{}", symbol))).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(resp.error_for_status()?.json().await?))
    }

    pub async fn open_trade(
        &self,
        symbol: &str,
        direction: TradeDirection,
        order_kind: OrderKind,
        entry_price: f64,
        lot_size: f64,
        stop_loss: f64,
        take_profit: f64,
        strategy: &str,
        metadata: serde_json::Value,
    ) -> Result<TradeOpenResponse> {
        let req = OpenTradeRequest {
            symbol,
            direction: direction.as_str(),
            order_kind: order_kind.as_str(),
            entry_price,
            lot_size,
            stop_loss,
            take_profit,
            strategy,
            metadata,
        };

        let resp = self.http.post(self.url("/api/v1/trades/open")).json(&req).send().await?;
        let body: TradeOpenResponse = resp.json().await?;

        if !body.success {
            let err = body.error.clone().unwrap_or_default();
            // The broker bridge owns INVALID_STOPS retry semantics; this
            // client surfaces INVALID_VOLUME as a fatal rejection for the
            // attempt and treats everything else as a plain order rejection.
            if err.contains("INVALID_VOLUME") {
                return Err(TradingError::InvalidVolume(err));
            }
            return Err(TradingError::OrderRejected(err));
        }

        Ok(body)
    }

    pub async fn close_trade(&self, ticket: &str, reason: Option<&str>) -> Result<()> {
        let req = CloseTradeRequest { ticket, reason };
        let resp = self.http.post(self.url("/api/v1/trades/close")).json(&req).send().await?;
        self.expect_success(resp).await
    }

    pub async fn cancel_trade(&self, ticket: &str) -> Result<()> {
        let req = CancelTradeRequest { ticket };
        let resp = self.http.post(self.url("/api/v1/trades/cancel")).json(&req).send().await?;
        self.expect_success(resp).await
    }

    pub async fn modify_trade(&self, ticket: &str, stop_loss: Option<f64>, take_profit: Option<f64>) -> Result<()> {
        let req = ModifyTradeRequest { ticket, stop_loss, take_profit };
        let resp = self.http.post(self.url("/api/v1/trades/modify")).json(&req).send().await?;
        self.expect_success(resp).await
    }

    pub async fn partial_close(&self, ticket: &str, volume_percent: f64) -> Result<()> {
        let req = PartialCloseRequest { ticket, volume_percent };
        let resp = self.http.post(self.url("/api/v1/trades/partial-close")).json(&req).send().await?;
        self.expect_success(resp).await
    }

    async fn expect_success(&self, resp: reqwest::Response) -> Result<()> {
        let body: ActionResponse = resp.json().await?;
        if !body.success {
            return Err(TradingError::OrderRejected(body.error.unwrap_or_default()));
        }
        Ok(())
    }
}
