pub mod core;
pub mod exchanges;

pub use crate::core::{
    config::ClientConfig,
    errors::{BingxError, ErrorKind},
};
pub use exchanges::bingx::{build_connector, BingxConnector};
