//! Transport kernel for the BingX connector
//!
//! Exchange-agnostic plumbing shared by every endpoint wrapper and stream
//! entry point:
//!
//! ## Transport
//! - `RestClient` / `ReqwestRest`: signed and key-only request dispatch
//! - `StreamSession`: one gzip-framed WebSocket connection with keepalive,
//!   listen-key renewal and cooperative shutdown
//!
//! ## Authentication
//! - `Signer` / `HmacSigner`: canonical query string plus HMAC-SHA256
//!
//! ## Flow control
//! - `RateLimiter`: per-endpoint cooldowns honoured before each request
//!
//! ## Serialization
//! - `JsonCodec` / `SerdeJson`: codec instance handed to the dispatcher and to
//!   sessions
//!
//! # Example
//! ```rust,no_run
//! use bingx_connector::core::kernel::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), bingx_connector::core::errors::BingxError> {
//! let signer = Arc::new(HmacSigner::new("api_key".to_string(), "secret".to_string()));
//! let rest = RestClientBuilder::new(RestClientConfig::new(
//!     "https://open-api.bingx.com".to_string(),
//! ))
//! .with_signer(signer)
//! .build()?;
//!
//! let params = ParameterSet::new().with("symbol", "BTC-USDT");
//! let body = rest
//!     .send(reqwest::Method::GET, "/openApi/spot/v1/trade/openOrders", &params)
//!     .await?;
//! # let _ = body;
//! # Ok(())
//! # }
//! ```
pub mod codec;
pub mod rate_limiter;
pub mod rest;
pub mod signer;
pub mod ws;

pub use codec::{decode_gzip, JsonCodec, SerdeJson};
pub use rate_limiter::RateLimiter;
pub use rest::{ReqwestRest, RestClient, RestClientBuilder, RestClientConfig};
pub use signer::{canonicalize, HmacSigner, ParameterSet, SignatureContext, Signer, API_KEY_HEADER};
pub use ws::{
    ListenKeyRenewer, SessionHandle, SessionState, StopHandle, StreamSession, WsConfig,
};
