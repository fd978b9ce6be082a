use crate::core::errors::BingxError;
use crate::core::kernel::codec::JsonCodec;
use crate::exchanges::bingx::types::{
    Interval, KlineEvent, OrderUpdateEvent, RequestType, SubscriptionRequest, WsOrder,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;
use uuid::Uuid;

pub const ORDER_TRADE_UPDATE: &str = "ORDER_TRADE_UPDATE";

/// Stream name of a candle subscription, e.g. `BTC-USDT@kline_1min`
pub fn kline_data_type(symbol: &str, interval: Interval) -> String {
    format!("{}@kline_{}", symbol, interval)
}

pub fn subscribe_request(data_type: impl Into<String>) -> SubscriptionRequest {
    SubscriptionRequest {
        id: Uuid::new_v4(),
        req_type: RequestType::Subscribe,
        data_type: data_type.into(),
    }
}

pub fn unsubscribe_request(data_type: impl Into<String>) -> SubscriptionRequest {
    SubscriptionRequest {
        id: Uuid::new_v4(),
        req_type: RequestType::Unsubscribe,
        data_type: data_type.into(),
    }
}

/// Derives a candle's completion flag from end-time transitions.
///
/// The first observation only records the end time. After that, an end time
/// different from the previous one is recorded and reported as `true` for the
/// event that carried it; a repeated end time reports `false`.
///
/// The flag therefore marks the first update of a *new* period, which is also
/// the moment the previous period is known to be closed. Whether consumers
/// should read it as "this bar is final" or "the prior bar just closed" is not
/// settled by the venue documentation; the observed behaviour is kept as is.
#[derive(Debug, Default, Clone)]
pub struct CompletionDetector {
    previous_end_time: Option<i64>,
}

impl CompletionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, end_time: i64) -> bool {
        match self.previous_end_time {
            None => {
                self.previous_end_time = Some(end_time);
                false
            }
            Some(previous) if previous != end_time => {
                self.previous_end_time = Some(end_time);
                true
            }
            Some(_) => false,
        }
    }

    pub fn previous_end_time(&self) -> Option<i64> {
        self.previous_end_time
    }
}

/// Only the routing field of a market frame
#[derive(Debug, Deserialize)]
struct FrameHeader {
    #[serde(rename = "dataType", default)]
    data_type: Value,
}

#[derive(Debug, Deserialize)]
struct RawKlineFrame {
    #[serde(rename = "s", default)]
    symbol: Option<String>,
    #[serde(default)]
    data: Vec<RawKline>,
}

#[derive(Debug, Deserialize)]
struct RawKline {
    #[serde(rename = "o")]
    open: Decimal,
    #[serde(rename = "c")]
    close: Decimal,
    #[serde(rename = "h")]
    high: Decimal,
    #[serde(rename = "l")]
    low: Decimal,
    #[serde(rename = "v")]
    volume: Decimal,
    #[serde(rename = "t", default)]
    start_time: Option<i64>,
    #[serde(rename = "T")]
    end_time: i64,
}

/// Stateful decoder for one `symbol@kline_interval` subscription
#[derive(Debug, Clone)]
pub struct KlineDecoder<C: JsonCodec> {
    symbol: String,
    interval: Interval,
    data_type: String,
    detector: CompletionDetector,
    codec: C,
}

impl<C: JsonCodec> KlineDecoder<C> {
    pub fn new(symbol: &str, interval: Interval, codec: C) -> Self {
        Self {
            symbol: symbol.to_string(),
            interval,
            data_type: kline_data_type(symbol, interval),
            detector: CompletionDetector::new(),
            codec,
        }
    }

    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    /// Decode one decompressed frame.
    ///
    /// Frames for other streams and subscription acknowledgements yield no
    /// events. Malformed JSON is an error.
    pub fn decode(&mut self, frame: &[u8]) -> Result<Vec<KlineEvent>, BingxError> {
        let header: FrameHeader = self.codec.decode(frame)?;
        if header.data_type.as_str() != Some(self.data_type.as_str()) {
            trace!(data_type = ?header.data_type, "ignoring frame");
            return Ok(Vec::new());
        }

        let raw: RawKlineFrame = self.codec.decode(frame)?;
        let symbol = raw.symbol.unwrap_or_else(|| self.symbol.clone());

        Ok(raw
            .data
            .into_iter()
            .map(|k| KlineEvent {
                symbol: symbol.clone(),
                interval: self.interval,
                open: k.open,
                close: k.close,
                high: k.high,
                low: k.low,
                volume: k.volume,
                start_time: k.start_time,
                end_time: k.end_time,
                completed: self.detector.observe(k.end_time),
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct EventTag {
    #[serde(default)]
    e: Value,
}

/// Filters account frames down to order updates
#[derive(Debug, Clone)]
pub struct OrderUpdateDecoder<C: JsonCodec> {
    codec: C,
}

impl<C: JsonCodec> OrderUpdateDecoder<C> {
    pub fn new(codec: C) -> Self {
        Self { codec }
    }

    /// `Ok(None)` for every frame that is not an `ORDER_TRADE_UPDATE`,
    /// including frames whose `e` is missing or not a string.
    pub fn decode(&self, frame: &[u8]) -> Result<Option<WsOrder>, BingxError> {
        let tag: EventTag = self.codec.decode(frame)?;
        if tag.e.as_str() != Some(ORDER_TRADE_UPDATE) {
            trace!(event = ?tag.e, "ignoring account event");
            return Ok(None);
        }

        let event: OrderUpdateEvent = self.codec.decode(frame)?;
        Ok(Some(event.order))
    }
}

/// Session handler delivering decoded candles to `on_event`
pub fn kline_handler<C, F>(
    mut decoder: KlineDecoder<C>,
    mut on_event: F,
) -> impl FnMut(Vec<u8>) -> Result<(), BingxError> + Send + 'static
where
    C: JsonCodec,
    F: FnMut(KlineEvent) + Send + 'static,
{
    move |frame| {
        for event in decoder.decode(&frame)? {
            on_event(event);
        }
        Ok(())
    }
}

/// Session handler delivering order updates to `on_order`
pub fn order_update_handler<C, F>(
    decoder: OrderUpdateDecoder<C>,
    mut on_order: F,
) -> impl FnMut(Vec<u8>) -> Result<(), BingxError> + Send + 'static
where
    C: JsonCodec,
    F: FnMut(WsOrder) + Send + 'static,
{
    move |frame| {
        if let Some(order) = decoder.decode(&frame)? {
            on_order(order);
        }
        Ok(())
    }
}
