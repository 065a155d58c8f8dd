//! Configuration file handling for the anidl client
//!
//! Supports:
//! - `<config dir>/anidl/config.toml` - Daemon address, status channel tuning, UI

pub mod settings;
pub mod types;

pub use settings::{default_config_dir, init_config_dir, load_settings, save_settings};
pub use types::*;
