//! Real-time status channel to the daemon.
//!
//! ## Modules
//!
//! - [`address`] - Derives the `ws(s)://host/api/v1/ws` address from the origin.
//! - [`transport`] - Physical connection abstraction and the WebSocket transport.
//! - [`state`] - Pure state machine: connect, detect loss, bounded retry, shutdown.
//! - [`client`] - [`StatusChannelClient`], the async adapter that executes the
//!   machine's actions.
//!
//! ## Quick start
//!
//! ```ignore
//! use anidl_daemon::channel::{ChannelOptions, StaticOrigin, StatusChannelClient};
//!
//! let origin = StaticOrigin::from_url("http://localhost:8091")?;
//! let client = StatusChannelClient::websocket(&origin, ChannelOptions::default())?;
//!
//! client.start(|event| {
//!     tracing::info!("daemon is {} (error: {})", event.status, event.has_error);
//! });
//!
//! // ... later
//! client.stop();
//! ```

pub mod address;
pub mod client;
pub mod state;
pub mod transport;

#[cfg(test)]
mod tests;

pub use address::{
    status_channel_url, AddressResolver, PageOrigin, StaticOrigin, STATUS_CHANNEL_PATH,
};
pub use client::{ChannelOptions, StatusCallback, StatusChannelClient};
pub use state::{
    ChannelAction, ChannelInput, ChannelMachine, ChannelState, ConnectionId, ReconnectPolicy,
    ShutdownReason, TimerToken, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_INTERVAL,
};
pub use transport::{
    Connection, ConnectionControl, ConnectionDriver, Connector, ReadyState, TransportEvent,
    WsConnector,
};
