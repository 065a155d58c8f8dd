//! # anidl-daemon - Daemon Communication
//!
//! Everything that talks to the AutoAnimeDownloader daemon: the real-time
//! status channel and the request/response HTTP API.
//!
//! Depends on [`anidl_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Status Channel (`channel`)
//! - [`StatusChannelClient`] - Keeps one WebSocket open, reconnects with a
//!   bounded retry budget, and delivers each status update to a subscriber
//! - [`ChannelMachine`] - The pure connect/retry/shutdown state machine
//! - [`Connector`], [`WsConnector`] - Physical connection abstraction
//! - [`status_channel_url()`] - Derive `ws(s)://host/api/v1/ws`
//!
//! ### HTTP API (`api`)
//! - [`ApiClient`] - Status, config, animes, episodes, check, daemon
//!   start/stop and logs
//!
//! ### Testing
//! - `test_utils::MockConnector` (feature `test-helpers`) - Scripted
//!   connections for exercising the channel without a network

pub mod api;
pub mod channel;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

pub use api::{
    AnimeInfo, ApiClient, DaemonConfig, Episode, ErrorInfo, LogQuery, LogsResponse, StatusResponse,
};
pub use channel::{
    status_channel_url, AddressResolver, ChannelMachine, ChannelOptions, ChannelState,
    Connector, PageOrigin, ShutdownReason, StaticOrigin, StatusChannelClient, WsConnector,
};
