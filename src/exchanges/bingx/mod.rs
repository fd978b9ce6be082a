pub mod builder;
pub mod codec;
pub mod connector;
pub mod rest;
pub mod streams;
pub mod types;

// Re-export main types for easier importing
pub use builder::{build_connector, build_connector_with_codec};
pub use codec::{CompletionDetector, KlineDecoder, OrderUpdateDecoder};
pub use connector::BingxConnector;
pub use rest::BingxRestClient;
pub use streams::BingxStreams;
pub use types::{
    HistoricalKline, Interval, KlineEvent, OrderSide, OrderStatus, OrderType, SpotBalance,
    SpotOrder, SpotOrderRequest, SpotOrderResponse, WsOrder,
};
