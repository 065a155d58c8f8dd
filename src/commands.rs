//! Subcommand implementations.

use std::path::Path;

use anidl_app::config::{load_settings, save_settings, Settings};
use anidl_app::{StaticAppearance, Theme, ThemeStore};
use anidl_core::StatusEvent;
use anidl_daemon::api::{ApiClient, LogQuery};
use anidl_daemon::channel::{ChannelState, ShutdownReason, StaticOrigin, StatusChannelClient};
use color_eyre::eyre::{bail, Result};
use tracing::info;

fn api(settings: &Settings) -> Result<ApiClient> {
    Ok(ApiClient::new(&settings.api_base_url())?)
}

// ─────────────────────────────────────────────────────────
// Status channel
// ─────────────────────────────────────────────────────────

/// Follow the status channel until Ctrl-C or until it gives up.
pub async fn watch(settings: &Settings, json: bool) -> Result<()> {
    let origin = StaticOrigin::from_url(&settings.daemon.url)?;
    let options = settings.channel_options();
    let max_attempts = options.max_reconnect_attempts;
    let client = StatusChannelClient::websocket(&origin, options)?;
    let mut state_rx = client.subscribe_state();

    eprintln!("Connecting to {} ...", client.url());
    client.start(move |event| print_event(event, json));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping status channel");
                break;
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                match state {
                    ChannelState::Open => eprintln!("Connected."),
                    ChannelState::ClosedRetrying { attempt } => eprintln!(
                        "Connection lost, retrying ({}/{})...",
                        attempt, max_attempts
                    ),
                    ChannelState::Shutdown(ShutdownReason::RetriesExhausted) => {
                        client.stop();
                        bail!("gave up after {} reconnection attempts", max_attempts);
                    }
                    ChannelState::Shutdown(ShutdownReason::Requested) => break,
                    ChannelState::Idle | ChannelState::Connecting => {}
                }
            }
        }
    }

    client.stop();
    Ok(())
}

fn print_event(event: &StatusEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!("Failed to encode status event: {}", e),
        }
    } else {
        println!("{}", format_status(event));
    }
}

fn format_status(event: &StatusEvent) -> String {
    let when = event
        .last_check_time()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S %:z").to_string())
        .unwrap_or_else(|| event.last_check.clone());
    let error = if event.has_error { "  [error]" } else { "" };
    format!("{:<10} last check {}{}", event.status, when, error)
}

// ─────────────────────────────────────────────────────────
// HTTP API
// ─────────────────────────────────────────────────────────

pub async fn status(settings: &Settings) -> Result<()> {
    let status = api(settings)?.get_status().await?;
    println!("{}", format_status(&status));
    Ok(())
}

pub async fn config_show(settings: &Settings) -> Result<()> {
    let config = api(settings)?.get_config().await?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

pub async fn config_set_interval(settings: &Settings, minutes: i64) -> Result<()> {
    let client = api(settings)?;
    let mut config = client.get_config().await?;
    config.check_interval = minutes;
    client.update_config(&config).await?;
    println!("Check interval set to {} minutes.", minutes);
    Ok(())
}

pub async fn animes(settings: &Settings) -> Result<()> {
    let animes = api(settings)?.get_animes().await?;
    if animes.is_empty() {
        println!("No animes yet.");
        return Ok(());
    }
    for anime in animes {
        println!(
            "{:<50} {:>4} episodes  (latest #{})",
            anime.name, anime.episodes_count, anime.latest_episode_id
        );
    }
    Ok(())
}

pub async fn episodes(settings: &Settings) -> Result<()> {
    let episodes = api(settings)?.get_episodes().await?;
    if episodes.is_empty() {
        println!("No episodes downloaded yet.");
        return Ok(());
    }
    for episode in episodes {
        println!(
            "{:>8}  {}  {}",
            episode.episode_id,
            episode.download_date.as_deref().unwrap_or("-"),
            episode.episode_name
        );
    }
    Ok(())
}

pub async fn check(settings: &Settings) -> Result<()> {
    api(settings)?.trigger_check().await?;
    println!("Verification started.");
    Ok(())
}

pub async fn daemon_start(settings: &Settings) -> Result<()> {
    api(settings)?.start_daemon().await?;
    println!("Daemon started.");
    Ok(())
}

pub async fn daemon_stop(settings: &Settings) -> Result<()> {
    api(settings)?.stop_daemon().await?;
    println!("Daemon stopped.");
    Ok(())
}

pub async fn logs(settings: &Settings, lines: Option<u32>, level: Option<String>) -> Result<()> {
    let logs = api(settings)?.get_logs(&LogQuery { lines, level }).await?;
    for line in &logs.lines {
        println!("{}", line);
    }
    eprintln!("({} lines)", logs.total);
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Local settings
// ─────────────────────────────────────────────────────────

/// Persist a new daemon URL. Reads the file again so a `--url` override is
/// not written back by accident.
pub fn config_set_url(config_dir: &Path, url: &str) -> Result<()> {
    let mut settings = load_settings(config_dir);
    settings.daemon.url = url.trim().to_string();
    settings.validate()?;
    save_settings(config_dir, &settings)?;
    println!("Daemon URL set to {}.", settings.daemon.url);
    Ok(())
}

pub fn theme(settings: &Settings, config_dir: &Path, theme: Option<Theme>) -> Result<()> {
    let store = ThemeStore::open(settings.theme_path(config_dir), StaticAppearance::default());
    if let Some(theme) = theme {
        store.set(theme)?;
    }
    println!("{} (effective: {})", store.get(), store.effective());
    Ok(())
}
