//! Request/response façade over the daemon's `/api/v1` HTTP endpoints.
//!
//! Independent of the status channel: nothing in [`crate::channel`] uses it.

pub mod client;
pub mod types;

pub use client::{ApiClient, API_PREFIX};
pub use types::{
    AnimeInfo, DaemonConfig, Episode, ErrorInfo, LogQuery, LogsResponse, StatusResponse,
};
