//! # anidl-core - Core Domain Types
//!
//! Foundation crate for the AutoAnimeDownloader client. Provides the status
//! event type, inbound frame decoding, error handling and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, chrono, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Events (`events`)
//! - [`StatusEvent`] - Daemon status delivered to status channel subscribers
//! - [`decode_frame()`] - Decode one inbound status channel frame
//! - [`FrameDecode`] - Status, ignored, or malformed
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Error enum grouped by layer
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use anidl_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod logging;

/// Prelude for common imports used throughout all anidl crates
pub mod prelude {
    pub use super::error::{Error, Result};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

pub use error::{Error, Result};
pub use events::{decode_frame, FrameDecode, StatusEvent, STATUS_UPDATE_TYPE};
