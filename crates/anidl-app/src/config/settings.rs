//! Settings parser for `config.toml`

use super::types::Settings;
use anidl_core::prelude::*;
use anidl_daemon::channel::{status_channel_url, ChannelOptions, PageOrigin};
use anidl_daemon::api::API_PREFIX;
use fs2::FileExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILENAME: &str = "config.toml";
const THEME_FILENAME: &str = "theme.toml";
const APP_DIR: &str = "anidl";

/// Platform config directory for anidl, e.g. `~/.config/anidl`.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

// ─────────────────────────────────────────────────────────────────────────────
// Derived values
// ─────────────────────────────────────────────────────────────────────────────

impl Settings {
    /// Options for the status channel client.
    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            reconnect_interval: Duration::from_millis(self.status_channel.reconnect_interval_ms),
            max_reconnect_attempts: self.status_channel.max_reconnect_attempts,
            host_override: self
                .status_channel
                .host_override
                .as_deref()
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string),
        }
    }

    /// Base URL of the HTTP API, `<daemon.url>/api/v1`.
    pub fn api_base_url(&self) -> String {
        format!("{}{}", self.daemon.url.trim_end_matches('/'), API_PREFIX)
    }

    /// Theme preference file: `ui.theme_file` or `theme.toml` in `config_dir`.
    pub fn theme_path(&self, config_dir: &Path) -> PathBuf {
        self.ui
            .theme_file
            .clone()
            .unwrap_or_else(|| config_dir.join(THEME_FILENAME))
    }

    /// Check that the daemon URL and any host override produce a usable
    /// status channel address.
    pub fn validate(&self) -> Result<()> {
        let origin = PageOrigin::from_url(&self.daemon.url)
            .map_err(|e| Error::config_invalid(format!("daemon.url: {}", e)))?;
        status_channel_url(&origin, self.channel_options().host_override.as_deref())
            .map_err(|e| Error::config_invalid(format!("status_channel.host_override: {}", e)))?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings Loading
// ─────────────────────────────────────────────────────────────────────────────

/// Load settings from `<config_dir>/config.toml`
///
/// Returns default settings if file doesn't exist or can't be parsed.
pub fn load_settings(config_dir: &Path) -> Settings {
    let config_path = config_dir.join(CONFIG_FILENAME);

    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

/// Create `config_dir` with a commented default `config.toml`
///
/// An existing file is left untouched.
pub fn init_config_dir(config_dir: &Path) -> Result<()> {
    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir)
            .map_err(|e| Error::config(format!("Failed to create config dir: {}", e)))?;
    }

    let config_path = config_dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        std::fs::write(&config_path, generate_default_config())
            .map_err(|e| Error::config(format!("Failed to write config.toml: {}", e)))?;
        info!("Created default config at {:?}", config_path);
    }

    Ok(())
}

/// Save settings to `<config_dir>/config.toml`
///
/// Holds an exclusive lock on the file while writing.
pub fn save_settings(config_dir: &Path, settings: &Settings) -> Result<()> {
    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir)
            .map_err(|e| Error::config(format!("Failed to create config dir: {}", e)))?;
    }

    let config_path = config_dir.join(CONFIG_FILENAME);
    let content = toml::to_string_pretty(settings)
        .map_err(|e| Error::config(format!("Failed to serialize settings: {}", e)))?;
    let full_content = format!("{}{}", generate_config_header(), content);

    let file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&config_path)
        .map_err(|e| Error::config(format!("Failed to open config.toml: {}", e)))?;

    // Blocks while another process holds the lock
    file.lock_exclusive()
        .map_err(|e| Error::config(format!("Failed to lock config.toml: {}", e)))?;

    use std::io::Write;
    let mut file = file;
    file.write_all(full_content.as_bytes())
        .map_err(|e| Error::config(format!("Failed to write config.toml: {}", e)))?;
    file.flush()
        .map_err(|e| Error::config(format!("Failed to flush config.toml: {}", e)))?;

    info!("Saved settings to {:?}", config_path);
    Ok(())
}

fn generate_config_header() -> String {
    r#"# anidl Configuration
# Generated by anidl

"#
    .to_string()
}

fn generate_default_config() -> String {
    r#"# anidl Configuration

[daemon]
url = "http://localhost:8091"   # Daemon origin; https:// selects a secure status channel

[status_channel]
# host_override = "nas.local:8091"   # Connect here instead of the daemon host
reconnect_interval_ms = 3000
max_reconnect_attempts = 10         # 0 = never retry

[ui]
# theme_file = "/path/to/theme.toml"
"#
    .to_string()
}
