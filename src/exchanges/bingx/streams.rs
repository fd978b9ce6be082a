use crate::core::config::ClientConfig;
use crate::core::errors::BingxError;
use crate::core::kernel::codec::JsonCodec;
use crate::core::kernel::{ListenKeyRenewer, RestClient, SessionHandle, StreamSession, WsConfig};
use crate::exchanges::bingx::codec::{
    kline_handler, order_update_handler, subscribe_request, KlineDecoder, OrderUpdateDecoder,
};
use crate::exchanges::bingx::rest::BingxRestClient;
use crate::exchanges::bingx::types::{Interval, KlineEvent, WsOrder};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// Account stream address for `listen_key`
pub fn account_stream_url(ws_url: &str, listen_key: &str) -> String {
    format!("{}?listenKey={}", ws_url, urlencoding::encode(listen_key))
}

/// Entry points that open one stream session per subscription
#[derive(Debug, Clone)]
pub struct BingxStreams<C: JsonCodec> {
    /// Settings every session starts from; `endpoint` holds the market URL
    template: WsConfig,
    codec: C,
}

impl<C: JsonCodec> BingxStreams<C> {
    pub fn new(ws_url: String, codec: C) -> Self {
        Self {
            template: WsConfig::new(ws_url),
            codec,
        }
    }

    pub fn from_client_config(config: &ClientConfig, codec: C) -> Self {
        Self {
            template: WsConfig::from_client_config(config.ws_url.clone(), config),
            codec,
        }
    }

    pub fn with_renewal_interval(mut self, interval: Duration) -> Self {
        self.template = self.template.with_renewal_interval(interval);
        self
    }

    pub fn ws_url(&self) -> &str {
        &self.template.endpoint
    }

    fn session(&self, endpoint: String) -> StreamSession<C> {
        StreamSession::new(self.template.clone().with_endpoint(endpoint), self.codec.clone())
    }

    /// Stream candles for `symbol`.
    ///
    /// Each update is delivered with its completion flag; see
    /// [`CompletionDetector`](crate::exchanges::bingx::codec::CompletionDetector).
    #[instrument(skip(self, on_event, on_error))]
    pub async fn subscribe_klines<F, E>(
        &self,
        symbol: &str,
        interval: Interval,
        on_event: F,
        on_error: E,
    ) -> Result<SessionHandle, BingxError>
    where
        F: FnMut(KlineEvent) + Send + 'static,
        E: FnMut(BingxError) + Send + 'static,
    {
        let decoder = KlineDecoder::new(symbol, interval, self.codec.clone());
        let request = subscribe_request(decoder.data_type());
        info!(data_type = %request.data_type, "subscribing");

        self.session(self.ws_url().to_string())
            .with_init_message(&request)?
            .serve(kline_handler(decoder, on_event), on_error)
            .await
    }

    /// Stream order updates of the account behind `rest`.
    ///
    /// A listen key is issued first and renewed for as long as the session
    /// stays active.
    #[instrument(skip_all)]
    pub async fn subscribe_order_updates<R, F, E>(
        &self,
        rest: Arc<BingxRestClient<R, C>>,
        on_order: F,
        on_error: E,
    ) -> Result<SessionHandle, BingxError>
    where
        R: RestClient + 'static,
        F: FnMut(WsOrder) + Send + 'static,
        E: FnMut(BingxError) + Send + 'static,
    {
        let listen_key = rest.create_listen_key().await?;
        let renewer: Arc<dyn ListenKeyRenewer> = rest;

        self.session(account_stream_url(self.ws_url(), &listen_key))
            .with_renewal(renewer, listen_key)
            .serve(
                order_update_handler(OrderUpdateDecoder::new(self.codec.clone()), on_order),
                on_error,
            )
            .await
    }
}
