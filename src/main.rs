//! anidl - command-line client for the AutoAnimeDownloader daemon
//!
//! Binary entry point. Argument parsing lives here; each subcommand is
//! implemented in [`commands`].

mod commands;

use std::path::PathBuf;

use anidl_app::config::{self, Settings};
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, Result};
use tracing::{info, warn};

/// anidl - talk to the AutoAnimeDownloader daemon
#[derive(Parser, Debug)]
#[command(name = "anidl", version)]
#[command(about = "Command-line client for the AutoAnimeDownloader daemon", long_about = None)]
struct Args {
    /// Daemon origin, overrides `[daemon] url` (e.g. http://localhost:8091)
    #[arg(long, global = true, value_name = "URL")]
    url: Option<String>,

    /// Directory holding config.toml (defaults to the platform config dir)
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow the live status channel and print each update
    Watch {
        /// Print each update as a JSON line
        #[arg(long)]
        json: bool,
    },
    /// Show the daemon status once
    Status,
    /// Show or change the daemon configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// List tracked animes
    Animes,
    /// List downloaded episodes
    Episodes,
    /// Ask the daemon to check for new episodes now
    Check,
    /// Start or stop the daemon loop
    Daemon {
        #[arg(value_enum)]
        action: DaemonAction,
    },
    /// Show the tail of the daemon log
    Logs {
        /// Number of lines (daemon default: 100)
        #[arg(long)]
        lines: Option<u32>,
        /// Only lines at this level (debug, info, warn, error)
        #[arg(long)]
        level: Option<String>,
    },
    /// Show or set the UI theme preference
    Theme {
        #[arg(value_enum)]
        theme: Option<ThemeArg>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the daemon configuration
    Show,
    /// Set the daemon's check interval in minutes
    SetInterval { minutes: i64 },
    /// Store the daemon URL in the local config.toml
    SetUrl { url: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DaemonAction {
    Start,
    Stop,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ThemeArg {
    Light,
    Dark,
    System,
}

impl From<ThemeArg> for anidl_app::Theme {
    fn from(arg: ThemeArg) -> Self {
        match arg {
            ThemeArg::Light => anidl_app::Theme::Light,
            ThemeArg::Dark => anidl_app::Theme::Dark,
            ThemeArg::System => anidl_app::Theme::System,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let log_dir = anidl_core::logging::init()?;

    let args = Args::parse();

    let config_dir = args
        .config_dir
        .clone()
        .or_else(config::default_config_dir)
        .ok_or_else(|| eyre!("could not determine a config directory, pass --config-dir"))?;

    if let Err(e) = config::init_config_dir(&config_dir) {
        warn!("Could not initialise {}: {}", config_dir.display(), e);
    }

    let mut settings: Settings = config::load_settings(&config_dir);
    if let Some(url) = &args.url {
        settings.daemon.url = url.clone();
    }
    settings.validate()?;

    info!("Daemon: {} ({:?})", settings.daemon.url, args.command);

    let result = run(args.command, &settings, &config_dir).await;
    if let Err(ref e) = result {
        tracing::error!("Command failed: {:?}", e);
        eprintln!("Logs: {}", log_dir.display());
    }
    result
}

async fn run(command: Command, settings: &Settings, config_dir: &std::path::Path) -> Result<()> {
    match command {
        Command::Watch { json } => commands::watch(settings, json).await,
        Command::Status => commands::status(settings).await,
        Command::Config(ConfigCommand::Show) => commands::config_show(settings).await,
        Command::Config(ConfigCommand::SetInterval { minutes }) => {
            commands::config_set_interval(settings, minutes).await
        }
        Command::Config(ConfigCommand::SetUrl { url }) => {
            commands::config_set_url(config_dir, &url)
        }
        Command::Animes => commands::animes(settings).await,
        Command::Episodes => commands::episodes(settings).await,
        Command::Check => commands::check(settings).await,
        Command::Daemon { action } => match action {
            DaemonAction::Start => commands::daemon_start(settings).await,
            DaemonAction::Stop => commands::daemon_stop(settings).await,
        },
        Command::Logs { lines, level } => commands::logs(settings, lines, level).await,
        Command::Theme { theme } => {
            commands::theme(settings, config_dir, theme.map(Into::into))
        }
    }
}
