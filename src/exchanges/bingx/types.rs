use crate::core::errors::BingxError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Candle period as spelled by the venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1min")]
    Minutes1,
    #[serde(rename = "3min")]
    Minutes3,
    #[serde(rename = "5min")]
    Minutes5,
    #[serde(rename = "15min")]
    Minutes15,
    #[serde(rename = "30min")]
    Minutes30,
    #[serde(rename = "60min")]
    Minutes60,
    #[serde(rename = "2hour")]
    Hours2,
    #[serde(rename = "4hour")]
    Hours4,
    #[serde(rename = "6hour")]
    Hours6,
    #[serde(rename = "8hour")]
    Hours8,
    #[serde(rename = "12hour")]
    Hours12,
    #[serde(rename = "1day")]
    Days1,
    #[serde(rename = "3day")]
    Days3,
    #[serde(rename = "1week")]
    Weeks1,
    #[serde(rename = "1mon")]
    Months1,
}

impl Interval {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minutes1 => "1min",
            Self::Minutes3 => "3min",
            Self::Minutes5 => "5min",
            Self::Minutes15 => "15min",
            Self::Minutes30 => "30min",
            Self::Minutes60 => "60min",
            Self::Hours2 => "2hour",
            Self::Hours4 => "4hour",
            Self::Hours6 => "6hour",
            Self::Hours8 => "8hour",
            Self::Hours12 => "12hour",
            Self::Days1 => "1day",
            Self::Days3 => "3day",
            Self::Weeks1 => "1week",
            Self::Months1 => "1mon",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Market,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Limit => "LIMIT",
            Self::Market => "MARKET",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Expired,
    #[serde(other)]
    Unknown,
}

// ---------------------------------------------------------------------------
// REST envelope and payloads
// ---------------------------------------------------------------------------

/// Outer wrapper of every REST response
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default, rename = "debugMsg")]
    pub debug_msg: String,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Fail with `ApiError` when the application code is non-zero
    pub fn check(&self) -> Result<(), BingxError> {
        if self.code == 0 {
            return Ok(());
        }
        let message = if self.debug_msg.is_empty() {
            self.msg.clone()
        } else {
            format!("{} ({})", self.msg, self.debug_msg)
        };
        Err(BingxError::ApiError {
            code: self.code,
            message,
        })
    }

    pub fn into_result(self) -> Result<T, BingxError> {
        self.check()?;
        self.data.ok_or_else(|| {
            BingxError::JsonError(serde::de::Error::custom("envelope is missing `data`"))
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenKeyResponse {
    #[serde(rename = "listenKey")]
    pub listen_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalancesData {
    pub balances: Vec<SpotBalance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotBalance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpotOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub quantity: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(rename = "timeInForce", skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<String>,
    #[serde(rename = "newClientOrderId", skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotOrderResponse {
    pub symbol: String,
    #[serde(rename = "orderId")]
    pub order_id: i64,
    #[serde(rename = "transactTime")]
    pub transact_time: i64,
    pub price: String,
    #[serde(rename = "origQty")]
    pub orig_qty: String,
    #[serde(rename = "executedQty")]
    pub executed_qty: String,
    pub status: OrderStatus,
    #[serde(rename = "type")]
    pub order_type: String,
    pub side: OrderSide,
    #[serde(rename = "clientOrderID", default)]
    pub client_order_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchOrdersData {
    pub orders: Vec<SpotOrderResponse>,
}

/// Closed or in-progress candle from the history endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoricalKline {
    pub start_time: i64,
    pub end_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl TryFrom<Vec<Decimal>> for HistoricalKline {
    type Error = BingxError;

    /// Rows are `[open_time, open, high, low, close, _, close_time, volume]`.
    fn try_from(row: Vec<Decimal>) -> Result<Self, Self::Error> {
        if row.len() < 8 {
            return Err(BingxError::JsonError(serde::de::Error::custom(format!(
                "invalid kline row of length {}",
                row.len()
            ))));
        }
        let millis = |d: Decimal| {
            d.trunc().to_i64().ok_or_else(|| {
                BingxError::JsonError(serde::de::Error::custom(format!(
                    "kline time out of range: {}",
                    d
                )))
            })
        };
        Ok(Self {
            start_time: millis(row[0])?,
            end_time: millis(row[6])?,
            open: row[1],
            high: row[2],
            low: row[3],
            close: row[4],
            volume: row[7],
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrdersData {
    pub orders: Vec<SpotOrder>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotOrder {
    #[serde(rename = "orderId")]
    pub order_id: i64,
    #[serde(rename = "clientOrderID", default)]
    pub client_order_id: String,
    pub symbol: String,
    pub price: String,
    #[serde(rename = "origQty")]
    pub orig_qty: String,
    #[serde(rename = "executedQty")]
    pub executed_qty: String,
    pub status: OrderStatus,
    #[serde(rename = "type")]
    pub order_type: String,
    pub side: OrderSide,
    pub time: i64,
    #[serde(rename = "updateTime")]
    pub update_time: i64,
    #[serde(default)]
    pub fee: String,
    #[serde(rename = "feeAsset", default)]
    pub fee_asset: String,
}

// ---------------------------------------------------------------------------
// Stream frames
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    #[serde(rename = "sub")]
    Subscribe,
    #[serde(rename = "unsub")]
    Unsubscribe,
}

/// `{id, reqType, dataType}` subscription frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub id: Uuid,
    #[serde(rename = "reqType")]
    pub req_type: RequestType,
    #[serde(rename = "dataType")]
    pub data_type: String,
}

/// Normalized candle update delivered to kline handlers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KlineEvent {
    pub symbol: String,
    pub interval: Interval,
    pub open: Decimal,
    pub close: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub volume: Decimal,
    pub start_time: Option<i64>,
    pub end_time: i64,
    /// See `CompletionDetector` for the exact meaning.
    pub completed: bool,
}

/// Order record carried by `ORDER_TRADE_UPDATE` events
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WsOrder {
    #[serde(rename = "t", default)]
    pub transaction_id: String,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "S")]
    pub side: OrderSide,
    #[serde(rename = "o")]
    pub order_type: String,
    #[serde(rename = "p", default)]
    pub price: String,
    #[serde(rename = "ap", default)]
    pub average_price: String,
    #[serde(rename = "q", default)]
    pub quantity: String,
    #[serde(rename = "Q", default)]
    pub amount: String,
    #[serde(rename = "sp", default)]
    pub stop_price: String,
    #[serde(rename = "X")]
    pub status: OrderStatus,
    #[serde(rename = "x", default)]
    pub execution_type: String,
    #[serde(rename = "T", default)]
    pub timestamp: i64,
    #[serde(rename = "i")]
    pub order_id: i64,
    #[serde(rename = "c", default)]
    pub client_order_id: String,
}

/// `ORDER_TRADE_UPDATE` account event
#[derive(Debug, Clone, Deserialize)]
pub struct OrderUpdateEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E", default)]
    pub event_time: i64,
    #[serde(rename = "o")]
    pub order: WsOrder,
}
