//! Stream and REST client configuration.

use reqwest::header::HeaderMap;
use reqwest::Response;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use zeroize::Zeroize;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("API key cannot be empty")]
    EmptyApiKey,

    #[error("API secret cannot be empty")]
    EmptyApiSecret,

    #[error("stream URL cannot be empty")]
    EmptyStreamUrl,

    #[error("high availability requires at least 2 distinct stream origins, found {0}")]
    InsufficientOrigins(usize),
}

/// Whether the Stream should maintain concurrent connections to multiple
/// origins for fault tolerance, or a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebSocketHighAvailability {
    Enabled,
    Disabled,
}

impl Default for WebSocketHighAvailability {
    fn default() -> Self {
        WebSocketHighAvailability::Disabled
    }
}

/// Invoked asynchronously on every edge transition into or out of
/// `Connected` for a given Managed Connection: `(connected, host, origin)`.
pub type ConnectionStatusCallback = Arc<dyn Fn(bool, &str, &str) + Send + Sync>;

/// Invoked to inspect (never modify) a completed REST response.
pub type InspectHttpResponse = Arc<dyn Fn(&Response) + Send + Sync>;

/// Immutable, validated client configuration.
///
/// Built via [`Config::new`] followed by `with_*` builder calls and
/// [`ConfigBuilder::build`]. All configuration is supplied at construction;
/// the Stream Core never reads environment variables on its own.
pub struct Config {
    pub api_key: String,
    pub api_secret: String,
    pub rest_url: String,
    pub ws_url: String,
    pub ws_ha: WebSocketHighAvailability,
    pub ws_max_reconnect: u32,
    pub connect_timeout: Duration,
    pub reconnect_base_delay: Duration,
    pub custom_headers: Option<HeaderMap>,
    pub connection_status_callback: Option<ConnectionStatusCallback>,
    pub insecure_skip_verify: bool,
    pub inspect_http_response: Option<InspectHttpResponse>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Config {
            api_key: self.api_key.clone(),
            api_secret: self.api_secret.clone(),
            rest_url: self.rest_url.clone(),
            ws_url: self.ws_url.clone(),
            ws_ha: self.ws_ha,
            ws_max_reconnect: self.ws_max_reconnect,
            connect_timeout: self.connect_timeout,
            reconnect_base_delay: self.reconnect_base_delay,
            custom_headers: self.custom_headers.clone(),
            connection_status_callback: self.connection_status_callback.clone(),
            insecure_skip_verify: self.insecure_skip_verify,
            inspect_http_response: self.inspect_http_response.clone(),
        }
    }
}

impl Config {
    const DEFAULT_WS_MAX_RECONNECT: u32 = 5;
    const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_millis(1000);

    /// Starts building a `Config` from the required fields.
    ///
    /// `ws_url` may encode multiple origins as a comma-delimited list; it is
    /// split and, when HA is enabled and at least two origins are present,
    /// used to multi-home the Stream across independent sockets.
    pub fn new(api_key: String, api_secret: String, rest_url: String, ws_url: String) -> ConfigBuilder {
        ConfigBuilder {
            api_key,
            api_secret,
            rest_url,
            ws_url,
            ws_ha: WebSocketHighAvailability::Disabled,
            ws_max_reconnect: Self::DEFAULT_WS_MAX_RECONNECT,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            reconnect_base_delay: Self::DEFAULT_RECONNECT_BASE_DELAY,
            custom_headers: None,
            connection_status_callback: None,
            insecure_skip_verify: false,
            inspect_http_response: None,
        }
    }

    /// The origins encoded in `ws_url`, trimmed and split on `,`.
    pub fn ws_origins(&self) -> Vec<String> {
        self.ws_url
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl Zeroize for Config {
    fn zeroize(&mut self) {
        self.api_key.zeroize();
        self.api_secret.zeroize();
    }
}

impl Drop for Config {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// Builder returned by [`Config::new`].
pub struct ConfigBuilder {
    api_key: String,
    api_secret: String,
    rest_url: String,
    ws_url: String,
    ws_ha: WebSocketHighAvailability,
    ws_max_reconnect: u32,
    connect_timeout: Duration,
    reconnect_base_delay: Duration,
    custom_headers: Option<HeaderMap>,
    connection_status_callback: Option<ConnectionStatusCallback>,
    insecure_skip_verify: bool,
    inspect_http_response: Option<InspectHttpResponse>,
}

impl ConfigBuilder {
    pub fn with_ws_ha(mut self, ws_ha: WebSocketHighAvailability) -> Self {
        self.ws_ha = ws_ha;
        self
    }

    pub fn with_ws_max_reconnect(mut self, attempts: u32) -> Self {
        self.ws_max_reconnect = attempts;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect_base_delay = delay;
        self
    }

    pub fn with_custom_headers(mut self, headers: HeaderMap) -> Self {
        self.custom_headers = Some(headers);
        self
    }

    pub fn with_connection_status_callback(mut self, callback: ConnectionStatusCallback) -> Self {
        self.connection_status_callback = Some(callback);
        self
    }

    pub fn with_insecure_skip_verify(mut self, skip: bool) -> Self {
        self.insecure_skip_verify = skip;
        self
    }

    pub fn with_inspect_http_response(mut self, inspect: InspectHttpResponse) -> Self {
        self.inspect_http_response = Some(inspect);
        self
    }

    /// Validates the accumulated fields and produces an immutable `Config`.
    pub fn build(self) -> Result<Config, ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        if self.api_secret.trim().is_empty() {
            return Err(ConfigError::EmptyApiSecret);
        }
        if self.ws_url.trim().is_empty() {
            return Err(ConfigError::EmptyStreamUrl);
        }

        let origins: Vec<String> = self
            .ws_url
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if self.ws_ha == WebSocketHighAvailability::Enabled && origins.len() < 2 {
            // A caller who explicitly asked for HA with fewer than two
            // origins has misconfigured the stream URL; fail here rather
            // than silently running as a single connection.
            return Err(ConfigError::InsufficientOrigins(origins.len()));
        }

        Ok(Config {
            api_key: self.api_key,
            api_secret: self.api_secret,
            rest_url: self.rest_url,
            ws_url: self.ws_url,
            ws_ha: self.ws_ha,
            ws_max_reconnect: self.ws_max_reconnect,
            connect_timeout: self.connect_timeout,
            reconnect_base_delay: self.reconnect_base_delay,
            custom_headers: self.custom_headers,
            connection_status_callback: self.connection_status_callback,
            insecure_skip_verify: self.insecure_skip_verify,
            inspect_http_response: self.inspect_http_response,
        })
    }
}
