use secrecy::{ExposeSecret, Secret};
use serde::{Serialize, Serializer};
use std::env;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://open-api.bingx.com";
pub const DEFAULT_WS_URL: &str = "wss://open-api-ws.bingx.com/market";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Listen keys expire after 60 minutes; renew well ahead of that.
pub const DEFAULT_RENEWAL_INTERVAL: Duration = Duration::from_secs(40 * 60);
pub const DEFAULT_WS_READ_LIMIT: usize = 655_350;
/// Largest size a single stream frame may inflate to
pub const DEFAULT_WS_INFLATE_LIMIT: usize = 16 * 1024 * 1024;

/// API key and secret. Immutable once built.
#[derive(Clone)]
pub struct Credentials {
    api_key: Secret<String>,
    secret_key: Secret<String>,
}

impl Credentials {
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.api_key.expose_secret().is_empty() || self.secret_key.expose_secret().is_empty()
    }

    /// Get API key (use carefully - exposes secret)
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Get secret key (use carefully - exposes secret)
    pub fn secret_key(&self) -> &str {
        self.secret_key.expose_secret()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// Client configuration shared by the dispatcher and the stream sessions.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub credentials: Credentials,
    pub base_url: String,
    pub ws_url: String,
    pub request_timeout: Duration,
    pub renewal_interval: Duration,
    pub ws_read_limit: usize,
    pub ws_inflate_limit: usize,
    /// Log raw parameters, URLs, headers and bodies of every request.
    pub debug: bool,
}

// Never expose secrets in serialization
impl Serialize for ClientConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ClientConfig", 9)?;
        state.serialize_field("api_key", "[REDACTED]")?;
        state.serialize_field("secret_key", "[REDACTED]")?;
        state.serialize_field("base_url", &self.base_url)?;
        state.serialize_field("ws_url", &self.ws_url)?;
        state.serialize_field("request_timeout_ms", &self.request_timeout.as_millis())?;
        state.serialize_field("renewal_interval_ms", &self.renewal_interval.as_millis())?;
        state.serialize_field("ws_read_limit", &self.ws_read_limit)?;
        state.serialize_field("ws_inflate_limit", &self.ws_inflate_limit)?;
        state.serialize_field("debug", &self.debug)?;
        state.end()
    }
}

impl ClientConfig {
    /// Create a new configuration with API credentials and default endpoints
    #[must_use]
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            credentials: Credentials::new(api_key, secret_key),
            base_url: DEFAULT_BASE_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            renewal_interval: DEFAULT_RENEWAL_INTERVAL,
            ws_read_limit: DEFAULT_WS_READ_LIMIT,
            ws_inflate_limit: DEFAULT_WS_INFLATE_LIMIT,
            debug: false,
        }
    }

    /// Configuration for public market data only
    #[must_use]
    pub fn read_only() -> Self {
        Self::new(String::new(), String::new())
    }

    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `{PREFIX}_API_KEY`
    /// - `{PREFIX}_SECRET_KEY`
    /// - `{PREFIX}_BASE_URL` (optional)
    /// - `{PREFIX}_WS_URL` (optional)
    /// - `{PREFIX}_DEBUG` (optional, defaults to false)
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let prefix = prefix.to_uppercase();
        let api_key_var = format!("{}_API_KEY", prefix);
        let secret_key_var = format!("{}_SECRET_KEY", prefix);

        let api_key = env::var(&api_key_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(api_key_var))?;
        let secret_key = env::var(&secret_key_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(secret_key_var))?;

        let mut config = Self::new(api_key, secret_key);
        if let Ok(base_url) = env::var(format!("{}_BASE_URL", prefix)) {
            config = config.with_base_url(base_url);
        }
        if let Ok(ws_url) = env::var(format!("{}_WS_URL", prefix)) {
            config = config.with_ws_url(ws_url);
        }
        config.debug = env::var(format!("{}_DEBUG", prefix))
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(false);

        config.validate()?;
        Ok(config)
    }

    /// Load a .env file (if present) and then read the environment
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(prefix, ".env")
    }

    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(prefix: &str, env_file_path: &str) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(()) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {
                // no file, fall back to the process environment
            }
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{}': {}",
                    env_file_path, e
                )));
            }
        }

        Self::from_env(prefix)
    }

    pub fn has_credentials(&self) -> bool {
        !self.credentials.is_empty()
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_ws_url(mut self, ws_url: String) -> Self {
        self.ws_url = ws_url;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_renewal_interval(mut self, interval: Duration) -> Self {
        self.renewal_interval = interval;
        self
    }

    pub fn with_ws_read_limit(mut self, limit: usize) -> Self {
        self.ws_read_limit = limit;
        self
    }

    pub fn with_ws_inflate_limit(mut self, limit: usize) -> Self {
        self.ws_inflate_limit = limit;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidConfiguration(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if !self.ws_url.starts_with("ws://") && !self.ws_url.starts_with("wss://") {
            return Err(ConfigError::InvalidConfiguration(format!(
                "ws_url must be a ws(s) URL, got '{}'",
                self.ws_url
            )));
        }
        if self.request_timeout.is_zero() || self.renewal_interval.is_zero() {
            return Err(ConfigError::InvalidConfiguration(
                "timeouts and intervals must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
