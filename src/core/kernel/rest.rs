use crate::core::config::ClientConfig;
use crate::core::errors::BingxError;
use crate::core::kernel::codec::{JsonCodec, SerdeJson};
use crate::core::kernel::rate_limiter::{RateLimiter, MAX_COOLDOWN};
use crate::core::kernel::signer::{ParameterSet, SignatureContext, Signer};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument, warn};

/// Request dispatcher contract
///
/// Both operations return the raw response body of a successful call.
/// Unwrapping the `{code, msg, data}` envelope is left to the caller.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Send a signed request
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `endpoint` - The API endpoint path
    /// * `params` - Caller parameters; must not be empty
    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        params: &ParameterSet,
    ) -> Result<Vec<u8>, BingxError>;

    /// Send a request authorized by the API key header alone (no signature)
    async fn send_keyed(
        &self,
        method: Method,
        endpoint: &str,
        params: &ParameterSet,
    ) -> Result<Vec<u8>, BingxError>;
}

/// Configuration for the REST client
#[derive(Clone, Debug)]
pub struct RestClientConfig {
    /// Base URL for the API
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// User agent string to include in requests
    pub user_agent: String,
    /// Log raw parameters, URLs, headers and response bodies
    pub debug: bool,
}

impl RestClientConfig {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            timeout: crate::core::config::DEFAULT_REQUEST_TIMEOUT,
            user_agent: "bingx-connector/0.1".to_string(),
            debug: false,
        }
    }

    pub fn from_client_config(config: &ClientConfig) -> Self {
        Self::new(config.base_url.clone())
            .with_timeout(config.request_timeout)
            .with_debug(config.debug)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Builder for creating REST client instances
pub struct RestClientBuilder<C: JsonCodec = SerdeJson> {
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
    rate_limiter: Option<Arc<RateLimiter>>,
    codec: C,
}

impl RestClientBuilder<SerdeJson> {
    pub fn new(config: RestClientConfig) -> Self {
        Self {
            config,
            signer: None,
            rate_limiter: None,
            codec: SerdeJson,
        }
    }
}

impl<C: JsonCodec> RestClientBuilder<C> {
    /// Set the signer for authenticated requests
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Share a rate limiter with other clients; a private one is created otherwise
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    pub fn with_codec<C2: JsonCodec>(self, codec: C2) -> RestClientBuilder<C2> {
        RestClientBuilder {
            config: self.config,
            signer: self.signer,
            rate_limiter: self.rate_limiter,
            codec,
        }
    }

    pub fn build(self) -> Result<ReqwestRest<C>, BingxError> {
        let client = Client::builder()
            .timeout(self.config.timeout)
            .user_agent(&self.config.user_agent)
            .build()?;

        Ok(ReqwestRest {
            client,
            config: self.config,
            signer: self.signer,
            rate_limiter: self.rate_limiter.unwrap_or_default(),
            codec: self.codec,
        })
    }
}

/// `Retry-After` in delta-seconds, clamped to [`MAX_COOLDOWN`]
fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs = value.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(secs.min(MAX_COOLDOWN.as_secs())))
}

/// Structured error body returned on non-success statuses
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: i64,
    #[serde(alias = "message")]
    msg: String,
}

/// Implementation of `RestClient` using reqwest
#[derive(Clone)]
pub struct ReqwestRest<C: JsonCodec = SerdeJson> {
    client: Client,
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
    rate_limiter: Arc<RateLimiter>,
    codec: C,
}

impl<C: JsonCodec> std::fmt::Debug for ReqwestRest<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestRest")
            .field("config", &self.config)
            .field("has_signer", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}

impl<C: JsonCodec> ReqwestRest<C> {
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Get the current timestamp in milliseconds
    fn get_timestamp() -> Result<u64, BingxError> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .map_err(|e| BingxError::InvalidParameters(format!("System clock error: {}", e)))
    }

    fn signer(&self) -> Result<&Arc<dyn Signer>, BingxError> {
        self.signer.as_ref().ok_or_else(|| {
            BingxError::AuthError("Authentication required but no signer provided".to_string())
        })
    }

    fn build_signed_url(&self, endpoint: &str, ctx: &SignatureContext) -> String {
        format!(
            "{}{}?{}&signature={}",
            self.config.base_url, endpoint, ctx.encoded, ctx.signature
        )
    }

    fn build_plain_url(&self, endpoint: &str, params: &ParameterSet) -> String {
        if params.is_empty() {
            return format!("{}{}", self.config.base_url, endpoint);
        }
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}{}?{}", self.config.base_url, endpoint, query)
    }

    fn classify_error(&self, status: StatusCode, body: &[u8]) -> BingxError {
        match self.codec.decode::<ErrorBody>(body) {
            Ok(err) => BingxError::ApiError {
                code: err.code,
                message: err.msg,
            },
            Err(_) => BingxError::HttpStatus {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
                body: String::from_utf8_lossy(body).into_owned(),
            },
        }
    }

    /// Issue the request and classify the response
    #[instrument(skip(self, url), fields(method = %method, endpoint = %endpoint))]
    async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        url: String,
    ) -> Result<Vec<u8>, BingxError> {
        let (header, api_key) = self.signer()?.api_key_header();

        if self.config.debug {
            debug!(url = %url, "full URL");
            debug!(headers = ?[(header, "[REDACTED]")], "request headers");
        }

        let response = self
            .client
            .request(method, &url)
            .header(header, api_key)
            .send()
            .await?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.bytes().await?.to_vec();

        if self.config.debug {
            debug!(status = %status, body = %String::from_utf8_lossy(&body), "response body");
        }

        if status.is_success() {
            return Ok(body);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            if let Some(cooldown) = retry_after {
                warn!(?cooldown, "rate limited; arming cooldown");
                self.rate_limiter.add(endpoint, cooldown);
            }
        }

        Err(self.classify_error(status, &body))
    }
}

#[async_trait]
impl<C: JsonCodec> RestClient for ReqwestRest<C> {
    #[instrument(skip(self, params), fields(method = %method, endpoint = %endpoint, param_count = params.len()))]
    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        params: &ParameterSet,
    ) -> Result<Vec<u8>, BingxError> {
        if params.is_empty() {
            return Err(BingxError::InvalidParameters(
                "params map is nil or empty".to_string(),
            ));
        }

        self.rate_limiter.wait(endpoint).await;

        let ctx = self.signer()?.sign(params, Self::get_timestamp()?)?;
        if self.config.debug {
            debug!(raw = %ctx.raw, "raw params");
        }

        let url = self.build_signed_url(endpoint, &ctx);
        self.execute(method, endpoint, url).await
    }

    #[instrument(skip(self, params), fields(method = %method, endpoint = %endpoint, param_count = params.len()))]
    async fn send_keyed(
        &self,
        method: Method,
        endpoint: &str,
        params: &ParameterSet,
    ) -> Result<Vec<u8>, BingxError> {
        self.rate_limiter.wait(endpoint).await;

        let url = self.build_plain_url(endpoint, params);
        self.execute(method, endpoint, url).await
    }
}
