//! Point-in-time REST retrieval of report envelopes.
//!
//! This is an external collaborator of the Stream Core per spec.md §1: it is
//! kept intentionally thin, reusing the [`crate::auth`] signer the same way
//! the realtime stream does.

use crate::auth::{generate_auth_headers, AuthError};
use crate::config::Config;
use crate::endpoints::{API_V1_FEEDS, API_V1_REPORTS_LATEST};
use crate::feed::{Feed, ID};
use crate::report::Report;

use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to sign request: {0}")]
    Auth(#[from] AuthError),

    #[error("API returned an error: {0}")]
    Api(String),
}

#[derive(Debug, Deserialize)]
struct FeedsResponse {
    feeds: Vec<Feed>,
}

#[derive(Debug, Deserialize)]
pub struct ReportResponse {
    pub report: Report,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as i64
}

/// Authenticated point-in-time REST client.
pub struct Client {
    config: Config,
    http: HttpClient,
}

impl Client {
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        let http = HttpClient::builder()
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()?;

        Ok(Client { config, http })
    }

    /// `GET /api/v1/feeds` — the set of feeds available to this API key.
    pub async fn get_feeds(&self) -> Result<Vec<Feed>, ClientError> {
        let url = format!("{}{}", self.config.rest_url, API_V1_FEEDS);
        let headers = generate_auth_headers(
            "GET",
            API_V1_FEEDS,
            b"",
            &self.config.api_key,
            &self.config.api_secret,
            now_ms(),
        )?;

        let response = self
            .http
            .get(url)
            .headers(headers)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ClientError::Api(e.to_string()))?;

        if let Some(ref inspect) = self.config.inspect_http_response {
            inspect(&response);
        }

        Ok(response.json::<FeedsResponse>().await?.feeds)
    }

    /// `GET /api/v1/reports/latest?feedID=<id>` — the newest report for a feed.
    pub async fn get_latest_report(&self, feed_id: ID) -> Result<ReportResponse, ClientError> {
        let feed_id_hex = feed_id.to_hex_string();
        let url = format!("{}{}", self.config.rest_url, API_V1_REPORTS_LATEST);
        let path = format!("{}?feedID={}", API_V1_REPORTS_LATEST, feed_id_hex);

        let headers = generate_auth_headers(
            "GET",
            &path,
            b"",
            &self.config.api_key,
            &self.config.api_secret,
            now_ms(),
        )?;

        let response = self
            .http
            .get(url)
            .query(&[("feedID", feed_id_hex)])
            .headers(headers)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ClientError::Api(e.to_string()))?;

        if let Some(ref inspect) = self.config.inspect_http_response {
            inspect(&response);
        }

        Ok(response.json::<ReportResponse>().await?)
    }
}
