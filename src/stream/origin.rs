//! Discovers the set of backend origins available for multi-homing
//! (component C2).

use crate::auth::generate_auth_headers;
use crate::config::Config;
use crate::endpoints::avail_origins_header;

use reqwest::Client as HttpClient;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as i64
}

fn parse_origins_header(value: &str) -> Vec<String> {
    let trimmed = value.trim().trim_start_matches('{').trim_end_matches('}');
    trimmed
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Issues a single authenticated headers-only probe against the REST base
/// and returns the origins advertised in `X-Cll-Available-Origins`.
///
/// Returns an empty list (never an error) when the probe fails or the
/// header is absent; the caller falls back to a single connection with an
/// empty origin, per spec.md §4.2.
pub(crate) async fn discover_origins(http: &HttpClient, config: &Config) -> Vec<String> {
    let headers = match generate_auth_headers(
        "HEAD",
        "/",
        b"",
        &config.api_key,
        &config.api_secret,
        now_ms(),
    ) {
        Ok(headers) => headers,
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!("origin discovery: failed to sign probe: {e}");
            let _ = e;
            return Vec::new();
        }
    };

    let response = match http.head(&config.rest_url).headers(headers).send().await {
        Ok(response) => response,
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!("origin discovery: probe request failed: {e}");
            let _ = e;
            return Vec::new();
        }
    };

    match response.headers().get(avail_origins_header()) {
        Some(value) => match value.to_str() {
            Ok(s) => parse_origins_header(s),
            Err(_) => Vec::new(),
        },
        None => Vec::new(),
    }
}
