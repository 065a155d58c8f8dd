//! anidl-app - Client-side configuration and preferences
//!
//! Loads `config.toml` (daemon address, status channel tuning) and keeps the
//! persisted UI theme preference.

pub mod config;
pub mod theme;

pub use config::{load_settings, Settings};
pub use theme::{EffectiveTheme, StaticAppearance, SystemAppearance, Theme, ThemeStore};
