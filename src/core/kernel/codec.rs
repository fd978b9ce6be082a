use crate::core::errors::BingxError;
use flate2::read::GzDecoder;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Read;

/// JSON codec handed to the dispatcher and to stream sessions.
///
/// Passing it explicitly keeps decoding configuration out of global state and
/// lets tests substitute their own implementation.
pub trait JsonCodec: Clone + Send + Sync + 'static {
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, BingxError>;

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, BingxError>;
}

/// `serde_json` backed codec
#[derive(Debug, Clone, Copy, Default)]
pub struct SerdeJson;

impl JsonCodec for SerdeJson {
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, BingxError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, BingxError> {
        Ok(serde_json::to_vec(value)?)
    }
}

/// Inflate one gzip-compressed stream frame, refusing output longer than
/// `limit` bytes.
pub fn decode_gzip(payload: &[u8], limit: usize) -> Result<Vec<u8>, BingxError> {
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let mut decoder = GzDecoder::new(payload).take(cap);
    let mut out = Vec::with_capacity(payload.len().saturating_mul(4).min(limit));
    decoder
        .read_to_end(&mut out)
        .map_err(|e| BingxError::DecompressionError(format!("gzip: {}", e)))?;
    if out.len() > limit {
        return Err(BingxError::DecompressionError(format!(
            "gzip: frame inflates past {} bytes",
            limit
        )));
    }
    Ok(out)
}
