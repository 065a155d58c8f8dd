//! Request and response bodies of the daemon's `/api/v1` endpoints.

use anidl_core::prelude::*;
use serde::{Deserialize, Serialize};

/// Payload of `GET /status`. Same shape as a status channel event.
pub type StatusResponse = anidl_core::StatusEvent;

/// Every endpoint wraps its payload in this envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: Option<T>,
    pub error: Option<ErrorInfo>,
}

/// Error detail carried by a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

/// Daemon configuration as exposed by `GET/PUT /config`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DaemonConfig {
    pub anilist_username: String,
    pub save_path: String,
    pub completed_anime_path: String,
    /// Minutes between automatic checks.
    pub check_interval: i64,
    pub qbittorrent_url: String,
    pub max_episodes_per_anime: i64,
    pub episode_retry_limit: i64,
    pub delete_watched_episodes: bool,
    pub excluded_list: String,
}

impl DaemonConfig {
    /// Apply the same checks the daemon runs on `PUT /config`, so bad input
    /// fails before a request is made.
    pub fn validate(&self) -> Result<()> {
        if self.anilist_username.trim().is_empty() {
            return Err(Error::config_invalid("Anilist username is required"));
        }
        if self.save_path.trim().is_empty() {
            return Err(Error::config_invalid("Save path is required"));
        }
        if self.qbittorrent_url.trim().is_empty() {
            return Err(Error::config_invalid("qBittorrent URL is required"));
        }
        if self.check_interval <= 0 {
            return Err(Error::config_invalid(
                "Check interval must be greater than 0",
            ));
        }
        if self.max_episodes_per_anime <= 0 {
            return Err(Error::config_invalid(
                "Max episodes per anime must be greater than 0",
            ));
        }
        if self.episode_retry_limit < 0 {
            return Err(Error::config_invalid(
                "Episode retry limit must be non-negative",
            ));
        }
        Ok(())
    }
}

/// One anime aggregated from the downloaded episodes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AnimeInfo {
    pub name: String,
    pub episodes_count: u32,
    pub latest_episode_id: i64,
}

/// One downloaded episode.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Episode {
    pub episode_id: i64,
    pub episode_name: String,
    pub episode_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_date: Option<String>,
}

/// Query for `GET /logs`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogQuery {
    /// Number of trailing lines; the daemon defaults to 100.
    pub lines: Option<u32>,
    /// Level filter (`debug`, `info`, `warn`, `error`).
    pub level: Option<String>,
}

impl LogQuery {
    pub(crate) fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(lines) = self.lines.filter(|n| *n > 0) {
            params.push(("lines", lines.to_string()));
        }
        if let Some(level) = self.level.as_deref().filter(|l| !l.is_empty()) {
            params.push(("level", level.to_string()));
        }
        params
    }
}

/// Payload of `GET /logs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LogsResponse {
    #[serde(default)]
    pub lines: Vec<String>,
    #[serde(default)]
    pub total: usize,
}
