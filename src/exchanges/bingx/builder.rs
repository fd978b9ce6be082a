use crate::core::config::ClientConfig;
use crate::core::errors::BingxError;
use crate::core::kernel::codec::{JsonCodec, SerdeJson};
use crate::core::kernel::{
    HmacSigner, RateLimiter, ReqwestRest, RestClientBuilder, RestClientConfig,
};
use crate::exchanges::bingx::connector::BingxConnector;
use std::sync::Arc;

/// Create a BingX connector using `serde_json`
pub fn build_connector(
    config: ClientConfig,
) -> Result<BingxConnector<ReqwestRest<SerdeJson>, SerdeJson>, BingxError> {
    build_connector_with_codec(config, SerdeJson, None)
}

/// Create a BingX connector with a custom codec and, optionally, a rate
/// limiter shared with other connectors
pub fn build_connector_with_codec<C: JsonCodec>(
    config: ClientConfig,
    codec: C,
    rate_limiter: Option<Arc<RateLimiter>>,
) -> Result<BingxConnector<ReqwestRest<C>, C>, BingxError> {
    config.validate()?;

    let mut rest_builder = RestClientBuilder::new(RestClientConfig::from_client_config(&config))
        .with_codec(codec.clone());

    // Add authentication if credentials are provided
    if config.has_credentials() {
        let signer = Arc::new(HmacSigner::new(
            config.credentials.api_key().to_string(),
            config.credentials.secret_key().to_string(),
        ));
        rest_builder = rest_builder.with_signer(signer);
    }
    if let Some(limiter) = rate_limiter {
        rest_builder = rest_builder.with_rate_limiter(limiter);
    }

    let rest = rest_builder.build()?;
    Ok(BingxConnector::new(rest, codec, config))
}
