//! HTTP client for the daemon's request/response API.

use std::time::Duration;

use anidl_core::prelude::*;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;

use super::types::{
    AnimeInfo, DaemonConfig, Envelope, Episode, LogQuery, LogsResponse, StatusResponse,
};

/// Path prefix of every façade endpoint on the daemon.
pub const API_PREFIX: &str = "/api/v1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the daemon's `/api/v1` endpoints.
///
/// Every call is a single request; failures are returned, never retried.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for `base_url`, e.g. `http://localhost:8091/api/v1`.
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::http(e.to_string()))?;
        Self::with_client(http, base_url)
    }

    /// Create a client that reuses an existing `reqwest::Client`.
    pub fn with_client(http: Client, base_url: &str) -> Result<Self> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| Error::invalid_address(format!("{base_url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::invalid_address(format!(
                "{base_url}: expected an http or https URL"
            )));
        }
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create a client for a daemon origin such as `http://localhost:8091`.
    pub fn for_daemon(daemon_url: &str) -> Result<Self> {
        Self::new(&format!(
            "{}{}",
            daemon_url.trim_end_matches('/'),
            API_PREFIX
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ─────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────

    pub async fn get_status(&self) -> Result<StatusResponse> {
        self.fetch(Method::GET, "/status").await
    }

    pub async fn get_config(&self) -> Result<DaemonConfig> {
        self.fetch(Method::GET, "/config").await
    }

    /// Replace the daemon configuration. Invalid input is rejected locally.
    pub async fn update_config(&self, config: &DaemonConfig) -> Result<()> {
        config.validate()?;
        let request = self.request(Method::PUT, "/config").json(config);
        self.send::<serde_json::Value>(request).await.map(drop)
    }

    pub async fn get_animes(&self) -> Result<Vec<AnimeInfo>> {
        self.fetch_list("/animes").await
    }

    pub async fn get_episodes(&self) -> Result<Vec<Episode>> {
        self.fetch_list("/episodes").await
    }

    /// Ask the daemon to run a check now.
    pub async fn trigger_check(&self) -> Result<()> {
        self.post("/check").await
    }

    pub async fn start_daemon(&self) -> Result<()> {
        self.post("/daemon/start").await
    }

    pub async fn stop_daemon(&self) -> Result<()> {
        self.post("/daemon/stop").await
    }

    pub async fn get_logs(&self, query: &LogQuery) -> Result<LogsResponse> {
        let request = self.request(Method::GET, "/logs").query(&query.params());
        let logs: Option<LogsResponse> = self.send(request).await?;
        Ok(logs.unwrap_or_default())
    }

    // ─────────────────────────────────────────────────────────
    // Plumbing
    // ─────────────────────────────────────────────────────────

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, endpoint))
    }

    async fn fetch<T: DeserializeOwned>(&self, method: Method, endpoint: &str) -> Result<T> {
        self.send(self.request(method, endpoint))
            .await?
            .ok_or_else(|| Error::protocol(format!("{endpoint}: response carried no data")))
    }

    /// List endpoints answer `null` when there is nothing to list.
    async fn fetch_list<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Vec<T>> {
        let items: Option<Vec<T>> = self.send(self.request(Method::GET, endpoint)).await?;
        Ok(items.unwrap_or_default())
    }

    async fn post(&self, endpoint: &str) -> Result<()> {
        self.send::<serde_json::Value>(self.request(Method::POST, endpoint))
            .await
            .map(drop)
    }

    /// Send one request and unwrap the envelope.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Option<T>> {
        let response = request.send().await.map_err(|e| {
            warn!("API request failed: {}", e);
            Error::http(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::http(e.to_string()))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<Envelope<serde_json::Value>>(&body)
                .ok()
                .and_then(|envelope| envelope.error);
            let err = match detail {
                Some(info) => Error::api(status.as_u16(), info.code, info.message),
                None => Error::api(
                    status.as_u16(),
                    "HTTP_ERROR",
                    format!("HTTP error! status: {}", status.as_u16()),
                ),
            };
            warn!("API request failed: {}", err);
            return Err(err);
        }

        let envelope: Envelope<T> = serde_json::from_str(&body)?;
        Ok(envelope.data)
    }
}
