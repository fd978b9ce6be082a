use crate::core::errors::BingxError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fmt::Display;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the API key on every private request.
pub const API_KEY_HEADER: &str = "X-BX-APIKEY";

/// Request parameters keyed by name.
///
/// Keys are unique and kept sorted, so iteration order is the canonical order
/// regardless of insertion order. Values are stored in their text form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet {
    params: BTreeMap<String, String>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a parameter, replacing any previous value under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Display) -> &mut Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Display> FromIterator<(K, V)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

/// Everything derived for one signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureContext {
    /// `k=v&...&timestamp=T` with raw values; this is what gets signed.
    pub raw: String,
    /// Same sequence with percent-encoded values; this goes on the wire.
    pub encoded: String,
    pub timestamp: u64,
    pub signature: String,
}

/// Build the raw and encoded canonical strings in one pass over the sorted
/// parameters. The timestamp goes last in both.
pub fn canonicalize(params: &ParameterSet, timestamp: u64) -> (String, String) {
    let mut raw = String::new();
    let mut encoded = String::new();

    for (key, value) in params.iter() {
        raw.push_str(key);
        raw.push('=');
        raw.push_str(value);
        raw.push('&');

        encoded.push_str(key);
        encoded.push('=');
        // unreserved set only; space becomes %20, never '+'
        encoded.push_str(&urlencoding::encode(value));
        encoded.push('&');
    }

    let ts = format!("timestamp={}", timestamp);
    raw.push_str(&ts);
    encoded.push_str(&ts);

    (raw, encoded)
}

/// Signer trait for request authentication
pub trait Signer: Send + Sync {
    /// Canonicalize and sign `params` for the given millisecond timestamp
    fn sign(&self, params: &ParameterSet, timestamp: u64) -> Result<SignatureContext, BingxError>;

    /// Header name and value identifying the caller
    fn api_key_header(&self) -> (&'static str, &str);
}

/// HMAC-SHA256 signer over the raw canonical string
pub struct HmacSigner {
    api_key: String,
    secret_key: String,
}

impl HmacSigner {
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key,
            secret_key,
        }
    }

    fn generate_signature(&self, payload: &str) -> Result<String, BingxError> {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| BingxError::AuthError(format!("Invalid secret key: {}", e)))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSigner").finish_non_exhaustive()
    }
}

impl Signer for HmacSigner {
    fn sign(&self, params: &ParameterSet, timestamp: u64) -> Result<SignatureContext, BingxError> {
        let (raw, encoded) = canonicalize(params, timestamp);
        let signature = self.generate_signature(&raw)?;

        Ok(SignatureContext {
            raw,
            encoded,
            timestamp,
            signature,
        })
    }

    fn api_key_header(&self) -> (&'static str, &str) {
        (API_KEY_HEADER, &self.api_key)
    }
}
