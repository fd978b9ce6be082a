use thiserror::Error;

#[derive(Error, Debug)]
pub enum BingxError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Decompression error: {0}")]
    DecompressionError(String),

    #[error("API error: {code} - {message}")]
    ApiError { code: i64, message: String },

    #[error("HTTP status {status} ({reason}), body: {body}")]
    HttpStatus {
        status: u16,
        reason: String,
        body: String,
    },
}

/// Coarse classification of a [`BingxError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing caller input.
    Validation,
    /// Dial, read or write failure.
    Transport,
    /// Malformed JSON or undecodable payload.
    Decode,
    /// Structured rejection from the venue.
    Api,
}

impl BingxError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParameters(_) | Self::AuthError(_) | Self::ConfigError(_) => {
                ErrorKind::Validation
            }
            Self::HttpError(_) | Self::NetworkError(_) => ErrorKind::Transport,
            Self::JsonError(_) | Self::DecompressionError(_) => ErrorKind::Decode,
            Self::ApiError { .. } | Self::HttpStatus { .. } => ErrorKind::Api,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BingxError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::NetworkError(format!("WebSocket error: {}", err))
    }
}
