//! Configuration types for the anidl client
//!
//! Defines:
//! - `Settings` - Top-level `config.toml` document
//! - `DaemonSettings`, `StatusChannelSettings`, `UiSettings` - Its sections

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Daemon origin used when nothing is configured.
pub const DEFAULT_DAEMON_URL: &str = "http://localhost:8091";

/// Global client settings from `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub daemon: DaemonSettings,

    #[serde(default)]
    pub status_channel: StatusChannelSettings,

    #[serde(default)]
    pub ui: UiSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DaemonSettings {
    /// Base origin of the daemon, e.g. `http://localhost:8091`.
    ///
    /// The scheme selects `ws` or `wss` for the status channel; the host is
    /// used unless `status_channel.host_override` is set.
    #[serde(default = "default_daemon_url")]
    pub url: String,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            url: default_daemon_url(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StatusChannelSettings {
    /// Host (`name[:port]`) or URL to connect to instead of the daemon host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_override: Option<String>,

    /// Fixed delay between reconnection attempts
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    /// Reconnection attempts before giving up (0 = never retry)
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

impl Default for StatusChannelSettings {
    fn default() -> Self {
        Self {
            host_override: None,
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct UiSettings {
    /// Where the theme preference is stored (defaults to `theme.toml` next
    /// to `config.toml`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_file: Option<PathBuf>,
}

fn default_daemon_url() -> String {
    DEFAULT_DAEMON_URL.to_string()
}

fn default_reconnect_interval_ms() -> u64 {
    anidl_daemon::channel::DEFAULT_RECONNECT_INTERVAL.as_millis() as u64
}

fn default_max_reconnect_attempts() -> u32 {
    anidl_daemon::channel::DEFAULT_MAX_RECONNECT_ATTEMPTS
}
