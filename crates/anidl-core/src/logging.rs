//! Logging configuration using tracing
//!
//! The CLI prints to stdout, so all diagnostics go to a daily log file.

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

const LOG_FILE_PREFIX: &str = "anidl.log";

/// Filter directive variable, e.g. `ANIDL_LOG=anidl_daemon=trace`.
pub const LOG_FILTER_ENV: &str = "ANIDL_LOG";

/// Overrides the log directory.
pub const LOG_DIR_ENV: &str = "ANIDL_LOG_DIR";

const DEFAULT_FILTER: &str = "anidl=info,anidl_daemon=info,anidl_app=info,warn";

/// Install the global subscriber and return the directory logs are written to.
///
/// ```bash
/// ANIDL_LOG=debug anidl watch
/// ANIDL_LOG_DIR=/tmp/anidl anidl status
/// ```
pub fn init() -> Result<PathBuf> {
    let log_dir = log_directory(std::env::var_os(LOG_DIR_ENV).map(PathBuf::from));
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);

    tracing_subscriber::registry()
        .with(env_filter(std::env::var(LOG_FILTER_ENV).ok().as_deref()))
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_dir = %log_dir.display(),
        "anidl starting"
    );

    Ok(log_dir)
}

/// `override_dir` wins; otherwise `<data_local_dir>/anidl/logs`.
fn log_directory(override_dir: Option<PathBuf>) -> PathBuf {
    override_dir
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("anidl")
                .join("logs")
        })
}

/// An unparsable directive falls back to the default instead of failing startup.
fn env_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}
