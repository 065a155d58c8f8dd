//! Persisted UI theme preference.
//!
//! The preference is one of light, dark or "follow the system". The effective
//! theme is what a UI should actually render; it changes when the preference
//! changes, and when the system appearance changes while following it.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anidl_core::prelude::*;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Stored theme preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Theme::Light => write!(f, "light"),
            Theme::Dark => write!(f, "dark"),
            Theme::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for Theme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "system" => Ok(Theme::System),
            other => Err(Error::config_invalid(format!(
                "unknown theme '{}' (expected light, dark or system)",
                other
            ))),
        }
    }
}

/// Theme actually applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectiveTheme {
    Light,
    Dark,
}

impl std::fmt::Display for EffectiveTheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EffectiveTheme::Light => write!(f, "light"),
            EffectiveTheme::Dark => write!(f, "dark"),
        }
    }
}

/// Source of the operating system's appearance preference.
pub trait SystemAppearance: Send + Sync {
    fn prefers_dark(&self) -> bool;
}

/// Appearance that never changes. Light unless told otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticAppearance {
    pub dark: bool,
}

impl SystemAppearance for StaticAppearance {
    fn prefers_dark(&self) -> bool {
        self.dark
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ThemeFile {
    #[serde(default)]
    theme: Theme,
}

/// Theme preference backed by a small TOML file.
pub struct ThemeStore {
    path: PathBuf,
    appearance: Box<dyn SystemAppearance>,
    theme: Mutex<Theme>,
    effective_tx: watch::Sender<EffectiveTheme>,
}

impl std::fmt::Debug for ThemeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThemeStore")
            .field("path", &self.path)
            .field("theme", &self.get())
            .field("effective", &self.effective())
            .finish()
    }
}

impl ThemeStore {
    /// Load the stored preference from `path`. A missing or unreadable file
    /// means [`Theme::System`].
    pub fn open(path: impl Into<PathBuf>, appearance: impl SystemAppearance + 'static) -> Self {
        let path = path.into();
        let theme = read_theme(&path);
        let effective = resolve(theme, &appearance);
        let (effective_tx, _) = watch::channel(effective);

        debug!("Theme preference {} ({}) from {:?}", theme, effective, path);

        Self {
            path,
            appearance: Box::new(appearance),
            theme: Mutex::new(theme),
            effective_tx,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current stored preference.
    pub fn get(&self) -> Theme {
        *self.theme.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn effective(&self) -> EffectiveTheme {
        *self.effective_tx.borrow()
    }

    /// Watch the effective theme.
    pub fn subscribe(&self) -> watch::Receiver<EffectiveTheme> {
        self.effective_tx.subscribe()
    }

    /// Store `theme` and apply it.
    ///
    /// The new preference takes effect even when writing the file fails; the
    /// write error is returned.
    pub fn set(&self, theme: Theme) -> Result<()> {
        *self.theme.lock().unwrap_or_else(|e| e.into_inner()) = theme;
        self.apply(theme);
        write_theme(&self.path, theme)
    }

    /// Re-evaluate after the system appearance changed. Only has an effect
    /// while following the system.
    pub fn system_preference_changed(&self) {
        let theme = self.get();
        if theme == Theme::System {
            self.apply(theme);
        }
    }

    fn apply(&self, theme: Theme) {
        let effective = resolve(theme, self.appearance.as_ref());
        self.effective_tx.send_if_modified(|current| {
            if *current == effective {
                false
            } else {
                debug!("Effective theme: {} -> {}", current, effective);
                *current = effective;
                true
            }
        });
    }
}

fn resolve(theme: Theme, appearance: &dyn SystemAppearance) -> EffectiveTheme {
    match theme {
        Theme::Light => EffectiveTheme::Light,
        Theme::Dark => EffectiveTheme::Dark,
        Theme::System if appearance.prefers_dark() => EffectiveTheme::Dark,
        Theme::System => EffectiveTheme::Light,
    }
}

fn read_theme(path: &Path) -> Theme {
    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str::<ThemeFile>(&content) {
            Ok(file) => file.theme,
            Err(e) => {
                warn!("Failed to parse {:?}: {}", path, e);
                Theme::System
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Theme::System,
        Err(e) => {
            warn!("Failed to read {:?}: {}", path, e);
            Theme::System
        }
    }
}

fn write_theme(path: &Path, theme: Theme) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::config(format!("Failed to create {:?}: {}", parent, e)))?;
    }

    let content = toml::to_string(&ThemeFile { theme })
        .map_err(|e| Error::config(format!("Failed to serialize theme: {}", e)))?;

    let file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| Error::config(format!("Failed to open {:?}: {}", path, e)))?;
    file.lock_exclusive()
        .map_err(|e| Error::config(format!("Failed to lock {:?}: {}", path, e)))?;

    use std::io::Write;
    let mut file = file;
    file.write_all(content.as_bytes())
        .map_err(|e| Error::config(format!("Failed to write {:?}: {}", path, e)))?;

    debug!("Saved theme preference {} to {:?}", theme, path);
    Ok(())
}
