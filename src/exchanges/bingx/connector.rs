use crate::core::config::ClientConfig;
use crate::core::errors::BingxError;
use crate::core::kernel::codec::JsonCodec;
use crate::core::kernel::{RestClient, SessionHandle};
use crate::exchanges::bingx::rest::BingxRestClient;
use crate::exchanges::bingx::streams::BingxStreams;
use crate::exchanges::bingx::types::{Interval, KlineEvent, WsOrder};
use std::sync::Arc;

/// REST wrappers and stream entry points behind one configuration
pub struct BingxConnector<R: RestClient, C: JsonCodec> {
    rest: Arc<BingxRestClient<R, C>>,
    streams: BingxStreams<C>,
    config: ClientConfig,
}

impl<R: RestClient + 'static, C: JsonCodec> BingxConnector<R, C> {
    pub fn new(rest: R, codec: C, config: ClientConfig) -> Self {
        Self {
            rest: Arc::new(BingxRestClient::new(rest, codec.clone())),
            streams: BingxStreams::from_client_config(&config, codec),
            config,
        }
    }

    pub fn rest(&self) -> &BingxRestClient<R, C> {
        &self.rest
    }

    pub fn streams(&self) -> &BingxStreams<C> {
        &self.streams
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

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
        self.streams
            .subscribe_klines(symbol, interval, on_event, on_error)
            .await
    }

    /// Requires credentials
    pub async fn subscribe_order_updates<F, E>(
        &self,
        on_order: F,
        on_error: E,
    ) -> Result<SessionHandle, BingxError>
    where
        F: FnMut(WsOrder) + Send + 'static,
        E: FnMut(BingxError) + Send + 'static,
    {
        if !self.config.has_credentials() {
            return Err(BingxError::AuthError(
                "order updates require API credentials".to_string(),
            ));
        }
        self.streams
            .subscribe_order_updates(self.rest.clone(), on_order, on_error)
            .await
    }
}

impl<R: RestClient, C: JsonCodec> std::fmt::Debug for BingxConnector<R, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BingxConnector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
