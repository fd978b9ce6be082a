use crate::core::errors::BingxError;
use crate::core::kernel::codec::JsonCodec;
use crate::core::kernel::signer::ParameterSet;
use crate::core::kernel::{ListenKeyRenewer, RestClient};
use crate::exchanges::bingx::types::{
    BalancesData, BatchOrdersData, Envelope, HistoricalKline, Interval, ListenKeyResponse, OrdersData,
    SpotBalance, SpotOrder, SpotOrderRequest, SpotOrderResponse,
};
use async_trait::async_trait;
use reqwest::Method;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tracing::instrument;

pub const ACCOUNT_BALANCE: &str = "/openApi/spot/v1/account/balance";
pub const TRADE_ORDER: &str = "/openApi/spot/v1/trade/order";
pub const TRADE_BATCH_ORDERS: &str = "/openApi/spot/v1/trade/batchOrders";
pub const TRADE_CANCEL: &str = "/openApi/spot/v1/trade/cancel";
pub const TRADE_CANCEL_OPEN_ORDERS: &str = "/openApi/spot/v1/trade/cancelOpenOrders";
pub const TRADE_QUERY: &str = "/openApi/spot/v1/trade/query";
pub const OPEN_ORDERS: &str = "/openApi/spot/v1/trade/openOrders";
pub const HISTORY_ORDERS: &str = "/openApi/spot/v1/trade/historyOrders";
pub const KLINE_HISTORY: &str = "/openApi/market/his/v1/kline";
pub const USER_DATA_STREAM: &str = "/openApi/user/auth/userDataStream";

/// Receive window sent with calls that carry no other parameter
const DEFAULT_RECV_WINDOW_MS: u64 = 5000;

/// Thin typed wrapper around `RestClient` for the BingX spot API
#[derive(Debug, Clone)]
pub struct BingxRestClient<R: RestClient, C: JsonCodec> {
    client: R,
    codec: C,
}

impl<R: RestClient, C: JsonCodec> BingxRestClient<R, C> {
    pub fn new(client: R, codec: C) -> Self {
        Self { client, codec }
    }

    pub fn inner(&self) -> &R {
        &self.client
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    fn unwrap_envelope<T: DeserializeOwned>(&self, body: &[u8]) -> Result<T, BingxError> {
        self.codec.decode::<Envelope<T>>(body)?.into_result()
    }

    /// Issue a listen key for the private account stream
    #[instrument(skip(self))]
    pub async fn create_listen_key(&self) -> Result<String, BingxError> {
        let body = self
            .client
            .send_keyed(Method::POST, USER_DATA_STREAM, &ParameterSet::new())
            .await?;
        let response: ListenKeyResponse = self.codec.decode(&body)?;
        if response.listen_key.is_empty() {
            return Err(BingxError::AuthError("venue returned an empty listen key".to_string()));
        }
        Ok(response.listen_key)
    }

    /// Push back the expiry of `listen_key`
    #[instrument(skip(self, listen_key))]
    pub async fn extend_listen_key(&self, listen_key: &str) -> Result<(), BingxError> {
        let params = ParameterSet::new().with("listenKey", listen_key);
        self.client
            .send(Method::PUT, USER_DATA_STREAM, &params)
            .await
            .map(|_| ())
    }

    #[instrument(skip(self))]
    pub async fn get_balances(&self) -> Result<Vec<SpotBalance>, BingxError> {
        let params = ParameterSet::new().with("recvWindow", DEFAULT_RECV_WINDOW_MS);
        let body = self
            .client
            .send(Method::GET, ACCOUNT_BALANCE, &params)
            .await?;
        let data: BalancesData = self.unwrap_envelope(&body)?;
        Ok(data.balances)
    }

    #[instrument(skip(self, order), fields(symbol = %order.symbol, side = %order.side))]
    pub async fn create_order(
        &self,
        order: &SpotOrderRequest,
    ) -> Result<SpotOrderResponse, BingxError> {
        let mut params = ParameterSet::new()
            .with("symbol", &order.symbol)
            .with("side", order.side)
            .with("type", order.order_type)
            .with("quantity", order.quantity.normalize());
        if let Some(price) = order.price {
            params.insert("price", price.normalize());
        }
        if let Some(tif) = &order.time_in_force {
            params.insert("timeInForce", tif);
        }
        if let Some(id) = &order.client_order_id {
            params.insert("newClientOrderId", id);
        }

        let body = self.client.send(Method::POST, TRADE_ORDER, &params).await?;
        self.unwrap_envelope(&body)
    }

    /// Place several orders in one call. The orders travel as a JSON array in
    /// the `data` parameter.
    #[instrument(skip(self, orders), fields(count = orders.len()))]
    pub async fn create_batch_orders(
        &self,
        orders: &[SpotOrderRequest],
        sync: bool,
    ) -> Result<Vec<SpotOrderResponse>, BingxError> {
        if orders.is_empty() {
            return Err(BingxError::InvalidParameters(
                "batch must contain at least one order".to_string(),
            ));
        }
        let data = String::from_utf8(self.codec.encode(&orders)?).map_err(|e| {
            BingxError::InvalidParameters(format!("batch payload is not UTF-8: {}", e))
        })?;
        let params = ParameterSet::new().with("data", data).with("sync", sync);

        let body = self
            .client
            .send(Method::POST, TRADE_BATCH_ORDERS, &params)
            .await?;
        let data: BatchOrdersData = self.unwrap_envelope(&body)?;
        Ok(data.orders)
    }

    #[instrument(skip(self))]
    pub async fn cancel_order(&self, symbol: &str, order_id: i64) -> Result<(), BingxError> {
        let params = ParameterSet::new()
            .with("symbol", symbol)
            .with("orderId", order_id);
        let body = self
            .client
            .send(Method::POST, TRADE_CANCEL, &params)
            .await?;
        self.codec.decode::<Envelope<serde_json::Value>>(&body)?.check()
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, symbol: &str, order_id: i64) -> Result<SpotOrder, BingxError> {
        let params = ParameterSet::new()
            .with("symbol", symbol)
            .with("orderId", order_id);
        let body = self.client.send(Method::GET, TRADE_QUERY, &params).await?;
        self.unwrap_envelope(&body)
    }

    #[instrument(skip(self))]
    pub async fn get_open_orders(&self, symbol: &str) -> Result<Vec<SpotOrder>, BingxError> {
        let params = ParameterSet::new().with("symbol", symbol);
        let body = self.client.send(Method::GET, OPEN_ORDERS, &params).await?;
        let data: OrdersData = self.unwrap_envelope(&body)?;
        Ok(data.orders)
    }

    #[instrument(skip(self))]
    pub async fn cancel_all_open_orders(&self, symbol: &str) -> Result<(), BingxError> {
        let params = ParameterSet::new().with("symbol", symbol);
        let body = self
            .client
            .send(Method::POST, TRADE_CANCEL_OPEN_ORDERS, &params)
            .await?;
        self.codec.decode::<Envelope<serde_json::Value>>(&body)?.check()
    }

    #[instrument(skip(self))]
    pub async fn get_order_history(&self, symbol: &str) -> Result<Vec<SpotOrder>, BingxError> {
        let params = ParameterSet::new().with("symbol", symbol);
        let body = self
            .client
            .send(Method::GET, HISTORY_ORDERS, &params)
            .await?;
        let data: OrdersData = self.unwrap_envelope(&body)?;
        Ok(data.orders)
    }

    /// Get historical candles, oldest first
    #[instrument(skip(self))]
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: Interval,
        limit: Option<u32>,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Result<Vec<HistoricalKline>, BingxError> {
        let mut params = ParameterSet::new()
            .with("symbol", symbol)
            .with("interval", interval);
        if let Some(limit) = limit {
            params.insert("limit", limit);
        }
        if let Some(start) = start_time {
            params.insert("startTime", start);
        }
        if let Some(end) = end_time {
            params.insert("endTime", end);
        }

        let body = self
            .client
            .send(Method::GET, KLINE_HISTORY, &params)
            .await?;
        let rows: Vec<Vec<Decimal>> = self.unwrap_envelope(&body)?;
        rows.into_iter().map(HistoricalKline::try_from).collect()
    }
}

#[async_trait]
impl<R, C> ListenKeyRenewer for BingxRestClient<R, C>
where
    R: RestClient,
    C: JsonCodec,
{
    async fn extend_listen_key(&self, listen_key: &str) -> Result<(), BingxError> {
        Self::extend_listen_key(self, listen_key).await
    }
}
